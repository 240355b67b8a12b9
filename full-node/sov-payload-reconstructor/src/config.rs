use serde::Deserialize;
use sov_external_da_adapter::ExternalProviderConfig;

/// Settings of the readers a node registers from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconstructorConfig {
    /// Largest payload an inline body may decompress to.
    #[serde(default = "default_max_decompressed_size")]
    pub max_decompressed_size: usize,
    /// External providers to read certificates with. Their header bytes must not overlap.
    #[serde(default)]
    pub external_providers: Vec<ExternalProviderConfig>,
}

fn default_max_decompressed_size() -> usize {
    16 * 1024 * 1024
}

impl Default for ReconstructorConfig {
    fn default() -> Self {
        Self {
            max_decompressed_size: default_max_decompressed_size(),
            external_providers: Vec::new(),
        }
    }
}
