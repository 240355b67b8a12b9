//! Preimages resolved while recovering payloads, kept so that replay needs no network access.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::hex_bytes::{HexBytes, HexHash};
use crate::DaError;

/// The hash function (or lookup scheme) a preimage is addressed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PreimageType {
    /// Keccak-256 preimages.
    Keccak256 = 0,
    /// SHA-256 preimages.
    Sha2_256 = 1,
    /// Blob contents addressed by their versioned hash.
    EthVersionedHash = 2,
    /// Payloads addressed by the keccak hash of an external provider certificate.
    DaCertificate = 3,
}

impl TryFrom<u8> for PreimageType {
    type Error = DaError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PreimageType::Keccak256),
            1 => Ok(PreimageType::Sha2_256),
            2 => Ok(PreimageType::EthVersionedHash),
            3 => Ok(PreimageType::DaCertificate),
            other => Err(DaError::Internal(format!("unknown preimage type {other}"))),
        }
    }
}

/// Resolves a hash to the bytes it commits to.
pub trait PreimageResolver {
    /// Returns the preimage of `hash` under `ty`.
    fn resolve(&self, ty: PreimageType, hash: &[u8; 32]) -> Result<Vec<u8>, DaError>;
}

/// A deterministic `(type, hash) -> bytes` map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PreimageEntry>", into = "Vec<PreimageEntry>")]
pub struct PreimagesMap {
    inner: BTreeMap<PreimageType, BTreeMap<[u8; 32], Vec<u8>>>,
}

impl PreimagesMap {
    /// Records a preimage. Recording the same key twice keeps the first value.
    pub fn record(&mut self, ty: PreimageType, hash: [u8; 32], preimage: Vec<u8>) {
        self.inner
            .entry(ty)
            .or_default()
            .entry(hash)
            .or_insert(preimage);
    }

    /// Looks up a preimage.
    pub fn get(&self, ty: PreimageType, hash: &[u8; 32]) -> Option<&[u8]> {
        self.inner
            .get(&ty)
            .and_then(|by_hash| by_hash.get(hash))
            .map(Vec::as_slice)
    }

    /// Moves every entry of `other` into `self`.
    pub fn merge(&mut self, other: PreimagesMap) {
        for (ty, by_hash) in other.inner {
            for (hash, preimage) in by_hash {
                self.record(ty, hash, preimage);
            }
        }
    }

    /// Total number of recorded preimages.
    pub fn len(&self) -> usize {
        self.inner.values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over all entries in a deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (PreimageType, &[u8; 32], &[u8])> {
        self.inner.iter().flat_map(|(ty, by_hash)| {
            by_hash
                .iter()
                .map(move |(hash, preimage)| (*ty, hash, preimage.as_slice()))
        })
    }
}

impl PreimageResolver for PreimagesMap {
    fn resolve(&self, ty: PreimageType, hash: &[u8; 32]) -> Result<Vec<u8>, DaError> {
        self.get(ty, hash)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| DaError::not_found(hash))
    }
}

/// Records into an optional map, so that callers that do not collect preimages pay nothing.
pub fn record_if(
    preimages: &mut Option<&mut PreimagesMap>,
    ty: PreimageType,
    hash: [u8; 32],
    preimage: &[u8],
) {
    if let Some(map) = preimages.as_deref_mut() {
        map.record(ty, hash, preimage.to_vec());
    }
}

/// The serialized form of a single map entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreimageEntry {
    /// Preimage type.
    pub preimage_type: PreimageType,
    /// The hash the preimage is addressed by.
    pub hash: HexHash,
    /// The preimage bytes.
    pub preimage: HexBytes,
}

impl From<Vec<PreimageEntry>> for PreimagesMap {
    fn from(entries: Vec<PreimageEntry>) -> Self {
        let mut map = PreimagesMap::default();
        for entry in entries {
            map.record(entry.preimage_type, entry.hash.0, entry.preimage.0);
        }
        map
    }
}

impl From<PreimagesMap> for Vec<PreimageEntry> {
    fn from(map: PreimagesMap) -> Self {
        map.inner
            .into_iter()
            .flat_map(|(ty, by_hash)| {
                by_hash.into_iter().map(move |(hash, preimage)| PreimageEntry {
                    preimage_type: ty,
                    hash: HexHash(hash),
                    preimage: HexBytes(preimage),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_recorded_value_wins() {
        let mut map = PreimagesMap::default();
        map.record(PreimageType::Keccak256, [1; 32], vec![1]);
        map.record(PreimageType::Keccak256, [1; 32], vec![2]);
        map.record(PreimageType::Sha2_256, [1; 32], vec![3]);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(PreimageType::Keccak256, &[1; 32]), Some(&[1u8][..]));
    }

    #[test]
    fn missing_preimage_resolves_to_not_found() {
        let map = PreimagesMap::default();
        assert!(matches!(
            map.resolve(PreimageType::Keccak256, &[0; 32]),
            Err(DaError::NotFound(_))
        ));
    }

    #[test]
    fn json_form_survives_transport() {
        let mut map = PreimagesMap::default();
        map.record(PreimageType::DaCertificate, [9; 32], b"payload".to_vec());
        map.record(PreimageType::Keccak256, [3; 32], vec![]);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(serde_json::from_str::<PreimagesMap>(&json).unwrap(), map);
    }
}
