//! In-memory collaborators for tests.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::chain::ParentChain;
use crate::DaError;

/// A parent chain whose canonical block set is edited by the test.
#[derive(Debug, Clone, Default)]
pub struct MockParentChain {
    canonical: Arc<RwLock<HashSet<[u8; 32]>>>,
}

impl MockParentChain {
    /// Marks a block as canonical.
    pub fn add_block(&self, block_hash: [u8; 32]) {
        if let Ok(mut canonical) = self.canonical.write() {
            canonical.insert(block_hash);
        }
    }

    /// Removes a block from the canonical chain, as a reorg would.
    pub fn reorg_out(&self, block_hash: &[u8; 32]) {
        if let Ok(mut canonical) = self.canonical.write() {
            canonical.remove(block_hash);
        }
    }
}

#[async_trait]
impl ParentChain for MockParentChain {
    async fn is_canonical(&self, block_hash: &[u8; 32]) -> Result<bool, DaError> {
        let canonical = self
            .canonical
            .read()
            .map_err(|e| DaError::Internal(e.to_string()))?;
        Ok(canonical.contains(block_hash))
    }
}
