use serde::Deserialize;

/// Settings of the reference provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ReferenceDaConfig {
    /// Largest payload accepted by a store.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_max_message_size() -> usize {
    1024 * 1024
}

impl Default for ReferenceDaConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
        }
    }
}
