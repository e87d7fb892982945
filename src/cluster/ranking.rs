//! Deterministic rank assignment
//!
//! Every node sorts its converged snapshot by id and numbers the members
//! from 1. Nodes that saw the same snapshot therefore agree on every rank
//! without exchanging a single message.

use crate::error::RankingError;
use crate::types::{FleetSnapshot, NodeIdentity, RankedMember};

/// Bijection from member id to a rank in `1..=N`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankAssignment {
    ranked: Vec<RankedMember>,
}

impl RankAssignment {
    /// Rank a snapshot: ascending lexical id order, rank = index + 1
    pub fn from_snapshot(snapshot: &FleetSnapshot) -> Result<Self, RankingError> {
        if snapshot.is_empty() {
            return Err(RankingError::EmptySnapshot);
        }

        // FleetSnapshot iterates in ascending id order already
        let ranked = snapshot
            .members()
            .enumerate()
            .map(|(index, member)| RankedMember {
                rank: index + 1,
                id: member.id,
                address: member.address,
            })
            .collect();

        Ok(RankAssignment { ranked })
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    /// Members in rank order
    pub fn members(&self) -> &[RankedMember] {
        &self.ranked
    }

    /// Rank of an id, if present
    pub fn rank_of(&self, id: &str) -> Option<usize> {
        self.ranked
            .binary_search_by(|m| m.id.as_str().cmp(id))
            .ok()
            .map(|index| index + 1)
    }

    /// This node's entry; absence is an error, never a sentinel rank
    pub fn self_rank(&self, identity: &NodeIdentity) -> Result<RankedMember, RankingError> {
        self.rank_of(&identity.id)
            .map(|rank| self.ranked[rank - 1].clone())
            .ok_or_else(|| RankingError::SelfNotFound { id: identity.id.clone() })
    }

    /// Addresses in rank order
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.ranked.iter().map(|m| m.address.as_str())
    }
}
