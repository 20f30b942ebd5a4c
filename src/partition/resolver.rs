//! Partition resolver
//!
//! Computes the set of partitions a stream must be synced for. Parentless
//! streams always get the single implicit partition. Child streams resume
//! from the partitions recorded in the bookmark store; when the store holds
//! nothing (fresh run) the scheduler drives partitions live from parent
//! records instead of going through this resolver.

use super::types::Partition;
use crate::error::Result;
use crate::state::BookmarkStore;
use crate::streams::StreamDefinition;

/// Resolves the partitions to sync for a stream
#[derive(Debug, Clone)]
pub struct PartitionResolver {
    store: BookmarkStore,
}

impl PartitionResolver {
    /// Create a resolver backed by the given store
    pub fn new(store: BookmarkStore) -> Self {
        Self { store }
    }

    /// Compute the ordered partitions for a stream
    pub async fn resolve(&self, stream: &StreamDefinition) -> Result<Vec<Partition>> {
        if stream.parent.is_none() {
            return Ok(vec![Partition::root()]);
        }

        let contexts = self.store.partitions_for(stream.name).await?;
        Ok(contexts.into_iter().map(Partition::new).collect())
    }
}
