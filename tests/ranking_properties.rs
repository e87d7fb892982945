//! Property tests for rank assignment
//!
//! Any two nodes that see the same snapshot must agree on every rank, and
//! ranks must form the contiguous range 1..=N.

use fleetboot::cluster::RankAssignment;
use fleetboot::types::{FleetMember, FleetSnapshot, NodeIdentity};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn members_strategy() -> impl Strategy<Value = Vec<(String, u8)>> {
    prop::collection::btree_map("i-[0-9a-f]{4,8}", any::<u8>(), 1..24)
        .prop_map(|m| m.into_iter().collect::<Vec<_>>())
}

fn snapshot_from(members: &[(String, u8)]) -> FleetSnapshot {
    FleetSnapshot::from_members(
        members
            .iter()
            .map(|(id, host)| FleetMember::new(id.clone(), format!("10.1.0.{}", host))),
    )
}

proptest! {
    #[test]
    fn prop_ranks_are_a_bijection(members in members_strategy()) {
        let snapshot = snapshot_from(&members);
        let assignment = RankAssignment::from_snapshot(&snapshot).unwrap();

        let ranks: Vec<usize> = assignment.members().iter().map(|m| m.rank).collect();
        let expected: Vec<usize> = (1..=snapshot.len()).collect();
        prop_assert_eq!(ranks, expected);

        let ids: BTreeSet<&str> = assignment.members().iter().map(|m| m.id.as_str()).collect();
        prop_assert_eq!(ids.len(), snapshot.len());
    }

    #[test]
    fn prop_input_order_does_not_matter(members in members_strategy(), seed in any::<u64>()) {
        let forward = RankAssignment::from_snapshot(&snapshot_from(&members)).unwrap();

        let mut shuffled = members.clone();
        // Deterministic rotation plus reversal stands in for a shuffle
        let pivot = (seed as usize) % shuffled.len();
        shuffled.rotate_left(pivot);
        shuffled.reverse();
        let reordered = RankAssignment::from_snapshot(&snapshot_from(&shuffled)).unwrap();

        prop_assert_eq!(forward.members(), reordered.members());
    }

    #[test]
    fn prop_every_node_finds_its_own_rank(members in members_strategy()) {
        let snapshot = snapshot_from(&members);
        let assignment = RankAssignment::from_snapshot(&snapshot).unwrap();

        for member in snapshot.members() {
            let identity = NodeIdentity {
                id: member.id.clone(),
                address: member.address.clone(),
                region: "test".to_string(),
            };
            let ranked = assignment.self_rank(&identity).unwrap();
            prop_assert_eq!(&ranked.id, &member.id);
            prop_assert_eq!(assignment.rank_of(&member.id), Some(ranked.rank));
        }
    }
}
