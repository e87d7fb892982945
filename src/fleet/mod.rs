//! Fleet inventory resolution
//!
//! Resolves this node's identity and the group it belongs to, then reads
//! the set of running group members from the cloud inventory. Every call
//! failure is returned as-is; retrying is the caller's business.

pub mod ec2;
pub mod metadata;
pub mod sigv4;

pub use ec2::Ec2Inventory;
pub use metadata::MetadataClient;
pub use sigv4::Credentials;

use std::path::Path;
use std::sync::Arc;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{DiscoveryError, DiscoveryResult};
use crate::types::{FleetSnapshot, NodeIdentity};

/// Source of identity and membership information
#[async_trait]
pub trait FleetInventory: Send + Sync {
    /// This node's own identity
    async fn identity(&self) -> DiscoveryResult<NodeIdentity>;

    /// Name of the group this node was tagged into
    async fn group_name(&self) -> DiscoveryResult<String>;

    /// All members of `group` currently in the running state
    async fn running_members(&self, group: &str) -> DiscoveryResult<FleetSnapshot>;
}

#[async_trait]
impl<T: FleetInventory + ?Sized> FleetInventory for Arc<T> {
    async fn identity(&self) -> DiscoveryResult<NodeIdentity> {
        (**self).identity().await
    }

    async fn group_name(&self) -> DiscoveryResult<String> {
        (**self).group_name().await
    }

    async fn running_members(&self, group: &str) -> DiscoveryResult<FleetSnapshot> {
        (**self).running_members(group).await
    }
}

/// Identity and group resolved once, plus repeatable membership reads
pub struct FleetResolver {
    inventory: Box<dyn FleetInventory>,
    identity: NodeIdentity,
    group: String,
}

impl FleetResolver {
    /// Resolve identity and group name
    pub async fn new<I: FleetInventory + 'static>(inventory: I) -> DiscoveryResult<Self> {
        let identity = inventory.identity().await?;
        let group = inventory.group_name().await?;
        info!(id = %identity.id, address = %identity.address, region = %identity.region, %group, "resolved node identity");

        Ok(FleetResolver {
            inventory: Box::new(inventory),
            identity,
            group,
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Read the current set of running members
    pub async fn snapshot(&self) -> DiscoveryResult<FleetSnapshot> {
        let snapshot = self.inventory.running_members(&self.group).await?;
        debug!(group = %self.group, members = snapshot.len(), "read fleet inventory");
        Ok(snapshot)
    }
}

/// Inventory backed by a fixed snapshot, used for offline rendering
#[derive(Debug, Clone)]
pub struct StaticInventory {
    identity: NodeIdentity,
    group: String,
    snapshot: FleetSnapshot,
}

impl StaticInventory {
    pub fn new(identity: NodeIdentity, group: impl Into<String>, snapshot: FleetSnapshot) -> Self {
        StaticInventory {
            identity,
            group: group.into(),
            snapshot,
        }
    }

    /// Load a JSON member list and pick this node out of it by id
    pub fn from_snapshot_file<P: AsRef<Path>>(path: P, self_id: &str) -> DiscoveryResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DiscoveryError::Snapshot(format!("{}: {}", path.display(), e)))?;
        let snapshot: FleetSnapshot = serde_json::from_str(&content)
            .map_err(|e| DiscoveryError::Snapshot(format!("{}: {}", path.display(), e)))?;

        // Absence of self is reported later by the rank assigner
        let address = snapshot.address_of(self_id).unwrap_or_default().to_string();
        let identity = NodeIdentity {
            id: self_id.to_string(),
            address,
            region: "local".to_string(),
        };

        Ok(Self::new(identity, "static", snapshot))
    }
}

#[async_trait]
impl FleetInventory for StaticInventory {
    async fn identity(&self) -> DiscoveryResult<NodeIdentity> {
        Ok(self.identity.clone())
    }

    async fn group_name(&self) -> DiscoveryResult<String> {
        Ok(self.group.clone())
    }

    async fn running_members(&self, _group: &str) -> DiscoveryResult<FleetSnapshot> {
        Ok(self.snapshot.clone())
    }
}
