//! Core data types shared by every bootstrap stage

use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};

/// This process's own identity, resolved once from instance metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Instance identifier
    pub id: String,
    /// Private network address
    pub address: String,
    /// Cloud region the instance runs in
    pub region: String,
}

/// One running fleet member as reported by the inventory
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FleetMember {
    /// Instance identifier
    pub id: String,
    /// Private network address
    pub address: String,
}

impl FleetMember {
    /// Create a new fleet member
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        FleetMember {
            id: id.into(),
            address: address.into(),
        }
    }
}

/// Set of members observed at one point in time.
///
/// Members are keyed by id, so iteration is always in ascending id order
/// and duplicate ids collapse to a single entry (last one wins).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<FleetMember>", into = "Vec<FleetMember>")]
pub struct FleetSnapshot {
    members: BTreeMap<String, String>,
}

impl FleetSnapshot {
    /// Build a snapshot from any collection of members
    pub fn from_members<I: IntoIterator<Item = FleetMember>>(members: I) -> Self {
        FleetSnapshot {
            members: members.into_iter().map(|m| (m.id, m.address)).collect(),
        }
    }

    /// Number of distinct members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether the snapshot contains the given id
    pub fn contains(&self, id: &str) -> bool {
        self.members.contains_key(id)
    }

    /// Address recorded for an id
    pub fn address_of(&self, id: &str) -> Option<&str> {
        self.members.get(id).map(String::as_str)
    }

    /// Members in ascending id order
    pub fn members(&self) -> impl Iterator<Item = FleetMember> + '_ {
        self.members
            .iter()
            .map(|(id, address)| FleetMember::new(id.clone(), address.clone()))
    }

    /// Ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    /// True when both snapshots carry exactly the same id set
    pub fn same_ids(&self, other: &FleetSnapshot) -> bool {
        self.members.len() == other.members.len() && self.ids().eq(other.ids())
    }
}

impl From<Vec<FleetMember>> for FleetSnapshot {
    fn from(members: Vec<FleetMember>) -> Self {
        FleetSnapshot::from_members(members)
    }
}

impl From<FleetSnapshot> for Vec<FleetMember> {
    fn from(snapshot: FleetSnapshot) -> Self {
        snapshot.members().collect()
    }
}

/// A member together with its 1-based rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedMember {
    /// Position in the sorted snapshot plus one
    pub rank: usize,
    /// Instance identifier
    pub id: String,
    /// Private network address
    pub address: String,
}

impl fmt::Display for RankedMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.rank, self.id, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_orders_and_dedups() {
        let snapshot = FleetSnapshot::from_members(vec![
            FleetMember::new("i-c", "10.0.0.3"),
            FleetMember::new("i-a", "10.0.0.1"),
            FleetMember::new("i-c", "10.0.0.33"),
        ]);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.ids().collect::<Vec<_>>(), vec!["i-a", "i-c"]);
        assert_eq!(snapshot.address_of("i-c"), Some("10.0.0.33"));
    }

    #[test]
    fn test_snapshot_json_is_member_list() {
        let json = r#"[{"id":"i-b","address":"10.0.0.2"},{"id":"i-a","address":"10.0.0.1"}]"#;
        let snapshot: FleetSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.contains("i-a"));

        let back = serde_json::to_string(&snapshot).unwrap();
        assert!(back.starts_with(r#"[{"id":"i-a""#));
    }

    #[test]
    fn test_same_ids_ignores_addresses() {
        let a = FleetSnapshot::from_members(vec![FleetMember::new("i-a", "10.0.0.1")]);
        let b = FleetSnapshot::from_members(vec![FleetMember::new("i-a", "10.9.9.9")]);
        let c = FleetSnapshot::from_members(vec![FleetMember::new("i-b", "10.0.0.1")]);

        assert!(a.same_ids(&b));
        assert!(!a.same_ids(&c));
    }
}
