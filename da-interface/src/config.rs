//! Helpers shared by the configuration structs of every crate in the workspace.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;

/// Reads toml file as a specific type.
pub fn from_toml_path<P: AsRef<Path>, R: DeserializeOwned>(path: P) -> anyhow::Result<R> {
    let mut contents = String::new();
    {
        let mut file = File::open(path)?;
        file.read_to_string(&mut contents)?;
    }
    tracing::debug!(size_in_bytes = contents.len(), "Parsing config file");

    let result: R = toml::from_str(&contents)?;

    Ok(result)
}
