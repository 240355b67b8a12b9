use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use sov_da_interface::unix_now;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{ExpirationPolicy, StorageService};

/// Retention settings shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetentionConfig {
    /// Whether blobs are ever pruned.
    #[serde(default = "default_enable_expiry")]
    pub enable_expiry: bool,
    /// Upper bound on how long a blob is kept after it was stored, regardless of the expiry
    /// requested by the writer.
    #[serde(default)]
    pub max_retention_secs: Option<u64>,
    /// How often the retention sweeper runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_enable_expiry() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enable_expiry: default_enable_expiry(),
            max_retention_secs: None,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl RetentionConfig {
    /// The policy these settings describe.
    pub fn policy(&self) -> ExpirationPolicy {
        match (self.enable_expiry, self.max_retention_secs) {
            (false, _) => ExpirationPolicy::KeepForever,
            (true, None) => ExpirationPolicy::DiscardAfterDataTimeout,
            (true, Some(max)) => ExpirationPolicy::DiscardAfterMaxRetention(max),
        }
    }

    /// The expiry actually applied to a blob stored at `now` with the requested `expiry`.
    pub fn effective_expiry(&self, expiry: u64, now: u64) -> u64 {
        match self.policy() {
            ExpirationPolicy::KeepForever => u64::MAX,
            ExpirationPolicy::DiscardAfterDataTimeout => expiry,
            ExpirationPolicy::DiscardAfterMaxRetention(max) => {
                expiry.min(now.saturating_add(max))
            }
        }
    }

    /// Returns true if a blob with `expiry` is no longer served at `now`.
    pub fn is_expired(&self, expiry: u64, now: u64) -> bool {
        self.enable_expiry && expiry <= now
    }
}

/// Spawns a task that prunes expired blobs every `interval` until `cancel` fires.
pub fn spawn_retention_sweeper<S>(
    store: Arc<S>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: StorageService + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Retention sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }
            match store.sweep_expired(unix_now()).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Pruned expired blobs"),
                Err(e) => warn!(error = %e, "Retention sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_retention_clamps_requested_expiry() {
        let config = RetentionConfig {
            max_retention_secs: Some(100),
            ..Default::default()
        };
        assert_eq!(config.effective_expiry(1_000, 500), 600);
        assert_eq!(config.effective_expiry(550, 500), 550);
    }

    #[test]
    fn disabled_expiry_keeps_everything() {
        let config = RetentionConfig {
            enable_expiry: false,
            ..Default::default()
        };
        assert_eq!(config.policy(), ExpirationPolicy::KeepForever);
        assert!(!config.is_expired(0, u64::MAX));
    }
}
