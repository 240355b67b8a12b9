//! Byte containers that travel over JSON-RPC as `0x`-prefixed hex strings.

use serde::{Deserialize, Serialize};

/// A 32-byte hash encoded as a hex string optionally prefixed with `0x`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HexHash(#[serde(with = "rpc_hex")] pub [u8; 32]);

/// A byte string encoded as a hex string optionally prefixed with `0x`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HexBytes(#[serde(with = "rpc_hex")] pub Vec<u8>);

impl From<Vec<u8>> for HexBytes {
    fn from(bytes: Vec<u8>) -> Self {
        HexBytes(bytes)
    }
}

impl From<&[u8]> for HexBytes {
    fn from(bytes: &[u8]) -> Self {
        HexBytes(bytes.to_vec())
    }
}

impl From<[u8; 32]> for HexHash {
    fn from(hash: [u8; 32]) -> Self {
        HexHash(hash)
    }
}

impl AsRef<[u8]> for HexBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

mod rpc_hex {
    use core::fmt;
    use std::marker::PhantomData;

    use hex::{FromHex, ToHex};
    use serde::de::{Error, Visitor};
    use serde::{Deserializer, Serializer};

    /// Serializes `data` as a lowercase hex string prefixed with `0x`.
    pub fn serialize<S, T>(data: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: ToHex,
    {
        serializer.serialize_str(&format!("0x{}", data.encode_hex::<String>()))
    }

    /// Deserializes a hex string, with or without the `0x` prefix, into raw bytes.
    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromHex,
        <T as FromHex>::Error: fmt::Display,
    {
        struct HexStrVisitor<T>(PhantomData<T>);

        impl<'de, T> Visitor<'de> for HexStrVisitor<T>
        where
            T: FromHex,
            <T as FromHex>::Error: fmt::Display,
        {
            type Value = T;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a hex encoded string")
            }

            fn visit_str<E>(self, data: &str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                FromHex::from_hex(data.trim_start_matches("0x")).map_err(Error::custom)
            }
        }

        deserializer.deserialize_str(HexStrVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_bytes_accept_both_prefixes() {
        let bytes: HexBytes = serde_json::from_str("\"0xdeadbeef\"").unwrap();
        assert_eq!(bytes.0, vec![0xde, 0xad, 0xbe, 0xef]);
        let bytes: HexBytes = serde_json::from_str("\"DEADBEEF\"").unwrap();
        assert_eq!(serde_json::to_string(&bytes).unwrap(), "\"0xdeadbeef\"");
    }

    #[test]
    fn hex_hash_requires_32_bytes() {
        assert!(serde_json::from_str::<HexHash>("\"0x0102\"").is_err());
        let hash = HexHash([7u8; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(serde_json::from_str::<HexHash>(&json).unwrap(), hash);
    }
}
