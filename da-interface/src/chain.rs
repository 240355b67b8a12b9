//! Parent chain facts consumed, not owned, by DA readers.

use async_trait::async_trait;

use crate::DaError;

/// A view of the parent chain used to pin reads to a specific block.
#[async_trait]
pub trait ParentChain: Send + Sync {
    /// Returns true if `block_hash` is part of the canonical chain.
    async fn is_canonical(&self, block_hash: &[u8; 32]) -> Result<bool, DaError>;

    /// Fails with [`DaError::Reorged`] unless `block_hash` is canonical.
    async fn ensure_canonical(&self, block_hash: &[u8; 32]) -> Result<(), DaError> {
        if self.is_canonical(block_hash).await? {
            Ok(())
        } else {
            Err(DaError::reorged(block_hash))
        }
    }
}
