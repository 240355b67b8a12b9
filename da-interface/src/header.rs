//! The header-byte registry. The first byte of every on-chain payload body identifies the
//! provider scheme that produced it.

use std::collections::BTreeMap;

use crate::DaError;

/// Inline, brotli compressed batch data posted directly on-chain.
pub const BROTLI_MESSAGE_HEADER_BYTE: u8 = 0x00;

/// A certificate produced by an external (opaque) provider.
pub const DA_CERTIFICATE_HEADER_FLAG: u8 = 0x01;

/// A list of blob versioned hashes.
pub const BLOB_HASHES_HEADER_FLAG: u8 = 0x50;

/// A quorum (AnyTrust) certificate.
pub const ANYTRUST_HEADER_FLAG: u8 = 0x80;

/// Set together with [`ANYTRUST_HEADER_FLAG`] when the certificate carries a version byte and its
/// data hash is a content tree hash.
pub const TREE_DAS_MESSAGE_HEADER_FLAG: u8 = 0x08;

/// The scheme a header byte belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeaderKind {
    /// [`BROTLI_MESSAGE_HEADER_BYTE`]
    InlineBrotli,
    /// [`DA_CERTIFICATE_HEADER_FLAG`]
    ExternalCertificate,
    /// [`BLOB_HASHES_HEADER_FLAG`]
    BlobHashes,
    /// [`ANYTRUST_HEADER_FLAG`], with or without the tree flag.
    AnyTrust,
}

impl HeaderKind {
    /// Classifies a header byte, returning `None` for bytes no scheme claims.
    pub fn classify(byte: u8) -> Option<Self> {
        match byte {
            BROTLI_MESSAGE_HEADER_BYTE => Some(HeaderKind::InlineBrotli),
            DA_CERTIFICATE_HEADER_FLAG => Some(HeaderKind::ExternalCertificate),
            BLOB_HASHES_HEADER_FLAG => Some(HeaderKind::BlobHashes),
            b if b == ANYTRUST_HEADER_FLAG || b == ANYTRUST_HEADER_FLAG | TREE_DAS_MESSAGE_HEADER_FLAG => {
                Some(HeaderKind::AnyTrust)
            }
            _ => None,
        }
    }

    /// The exact header bytes owned by this scheme.
    pub fn header_bytes(&self) -> &'static [u8] {
        match self {
            HeaderKind::InlineBrotli => &[BROTLI_MESSAGE_HEADER_BYTE],
            HeaderKind::ExternalCertificate => &[DA_CERTIFICATE_HEADER_FLAG],
            HeaderKind::BlobHashes => &[BLOB_HASHES_HEADER_FLAG],
            HeaderKind::AnyTrust => &[
                ANYTRUST_HEADER_FLAG,
                ANYTRUST_HEADER_FLAG | TREE_DAS_MESSAGE_HEADER_FLAG,
            ],
        }
    }
}

/// Tracks which owner claimed which header byte, rejecting overlapping claims.
#[derive(Debug, Default, Clone)]
pub struct HeaderByteClaims {
    owners: BTreeMap<u8, String>,
}

impl HeaderByteClaims {
    /// Records that `owner` claims every byte in `bytes`. Nothing is recorded if any byte is
    /// already claimed.
    pub fn claim(&mut self, owner: &str, bytes: &[u8]) -> Result<(), DaError> {
        if bytes.is_empty() {
            return Err(DaError::Internal(format!(
                "{owner} does not claim any header byte"
            )));
        }
        for byte in bytes {
            if let Some(existing) = self.owners.get(byte) {
                return Err(DaError::Internal(format!(
                    "header byte 0x{byte:02x} claimed by {owner} is already owned by {existing}"
                )));
            }
        }
        for byte in bytes {
            self.owners.insert(*byte, owner.to_string());
        }
        Ok(())
    }

    /// Returns the owner of a header byte.
    pub fn owner_of(&self, byte: u8) -> Option<&str> {
        self.owners.get(&byte).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_schemes_are_disjoint() {
        let mut claims = HeaderByteClaims::default();
        for kind in [
            HeaderKind::InlineBrotli,
            HeaderKind::ExternalCertificate,
            HeaderKind::BlobHashes,
            HeaderKind::AnyTrust,
        ] {
            claims.claim(&format!("{kind:?}"), kind.header_bytes()).unwrap();
            for byte in kind.header_bytes() {
                assert_eq!(HeaderKind::classify(*byte), Some(kind));
            }
        }
    }

    #[test]
    fn overlapping_claim_is_rejected_atomically() {
        let mut claims = HeaderByteClaims::default();
        claims.claim("anytrust", &[0x80, 0x88]).unwrap();
        assert!(claims.claim("impostor", &[0x42, 0x88]).is_err());
        assert_eq!(claims.owner_of(0x42), None);
        assert_eq!(claims.owner_of(0x88), Some("anytrust"));
    }

    #[test]
    fn unknown_byte_is_unclassified() {
        assert_eq!(HeaderKind::classify(0x42), None);
        assert_eq!(HeaderKind::classify(0x81), None);
    }
}
