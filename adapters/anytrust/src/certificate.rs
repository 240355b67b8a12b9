//! The quorum certificate posted on-chain in place of the payload.

use sov_da_interface::header::{ANYTRUST_HEADER_FLAG, TREE_DAS_MESSAGE_HEADER_FLAG};
use sov_da_interface::DaError;

use crate::bls::{BlsSignature, SIGNATURE_LEN};

/// The version written by current writers: the data hash is a content tree hash.
pub const CURRENT_CERTIFICATE_VERSION: u8 = 1;

/// A threshold-signed promise that the committee stores `data_hash` until `timeout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataAvailabilityCertificate {
    /// Hash of the keyset whose members signed.
    pub keyset_hash: [u8; 32],
    /// Content hash of the payload.
    pub data_hash: [u8; 32],
    /// Unix time until which the payload is guaranteed to be served.
    pub timeout: u64,
    /// Bit `i` is set if keyset member `i` contributed to `sig`.
    pub signers_mask: u64,
    /// Aggregate signature over [`DataAvailabilityCertificate::signable_fields`].
    pub sig: BlsSignature,
    /// 0 for legacy keccak data hashes, 1 for tree hashes.
    pub version: u8,
}

impl DataAvailabilityCertificate {
    /// The bytes every signer signs.
    pub fn signable_fields(&self) -> Vec<u8> {
        signable_fields(&self.data_hash, self.timeout, self.version)
    }

    /// Encodes the certificate, header byte first.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 32 + 32 + 8 + 1 + 8 + SIGNATURE_LEN);
        let mut flags = ANYTRUST_HEADER_FLAG;
        if self.version != 0 {
            flags |= TREE_DAS_MESSAGE_HEADER_FLAG;
        }
        out.push(flags);
        out.extend_from_slice(&self.keyset_hash);
        out.extend_from_slice(&self.data_hash);
        out.extend_from_slice(&self.timeout.to_be_bytes());
        if self.version != 0 {
            out.push(self.version);
        }
        out.extend_from_slice(&self.signers_mask.to_be_bytes());
        out.extend_from_slice(&self.sig.to_bytes());
        out
    }

    /// Parses a certificate body. The encoding must be consumed exactly.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, DaError> {
        let (&flags, mut rest) = bytes
            .split_first()
            .ok_or_else(|| malformed("empty certificate"))?;
        if flags & ANYTRUST_HEADER_FLAG == 0 {
            return Err(malformed(format!("header byte {flags:#04x} is not a certificate")));
        }
        let keyset_hash = take::<32>(&mut rest)?;
        let data_hash = take::<32>(&mut rest)?;
        let timeout = u64::from_be_bytes(take::<8>(&mut rest)?);
        let version = if flags & TREE_DAS_MESSAGE_HEADER_FLAG != 0 {
            let [version] = take::<1>(&mut rest)?;
            if version == 0 || version > CURRENT_CERTIFICATE_VERSION {
                return Err(malformed(format!("unsupported certificate version {version}")));
            }
            version
        } else {
            0
        };
        let signers_mask = u64::from_be_bytes(take::<8>(&mut rest)?);
        let sig_bytes = take::<SIGNATURE_LEN>(&mut rest)?;
        if !rest.is_empty() {
            return Err(malformed(format!(
                "{} trailing bytes after certificate",
                rest.len()
            )));
        }
        let sig = BlsSignature::from_bytes(&sig_bytes).map_err(|e| malformed(e.to_string()))?;
        Ok(Self {
            keyset_hash,
            data_hash,
            timeout,
            signers_mask,
            sig,
            version,
        })
    }
}

/// `data_hash ‖ timeout_be ‖ [version]`, the version byte only for non-legacy certificates.
pub fn signable_fields(data_hash: &[u8; 32], timeout: u64, version: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(41);
    out.extend_from_slice(data_hash);
    out.extend_from_slice(&timeout.to_be_bytes());
    if version != 0 {
        out.push(version);
    }
    out
}

fn malformed(msg: impl Into<String>) -> DaError {
    DaError::MalformedCertificate(msg.into())
}

fn take<const N: usize>(rest: &mut &[u8]) -> Result<[u8; N], DaError> {
    if rest.len() < N {
        return Err(malformed("certificate truncated"));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&rest[..N]);
    *rest = &rest[N..];
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bls::BlsPrivateKey;

    fn certificate(version: u8) -> DataAvailabilityCertificate {
        let key = BlsPrivateKey::from_seed(&[3u8; 32]).unwrap();
        let data_hash = [9u8; 32];
        DataAvailabilityCertificate {
            keyset_hash: [1u8; 32],
            data_hash,
            timeout: 1_700_000_000,
            signers_mask: 0b1,
            sig: key.sign(&signable_fields(&data_hash, 1_700_000_000, version)),
            version,
        }
    }

    #[test]
    fn header_byte_tracks_the_version() {
        let current = certificate(1).serialize();
        assert_eq!(current[0], 0x88);
        assert_eq!(current.len(), 1 + 32 + 32 + 8 + 1 + 8 + 96);
        assert_eq!(DataAvailabilityCertificate::deserialize(&current).unwrap(), certificate(1));

        let legacy = certificate(0).serialize();
        assert_eq!(legacy[0], 0x80);
        assert_eq!(DataAvailabilityCertificate::deserialize(&legacy).unwrap(), certificate(0));
    }

    #[test]
    fn unknown_versions_and_trailing_bytes_are_malformed() {
        let mut bytes = certificate(1).serialize();
        bytes[73] = 2;
        assert!(matches!(
            DataAvailabilityCertificate::deserialize(&bytes),
            Err(DaError::MalformedCertificate(_))
        ));

        let mut bytes = certificate(1).serialize();
        bytes.push(0);
        assert!(DataAvailabilityCertificate::deserialize(&bytes).is_err());
        assert!(DataAvailabilityCertificate::deserialize(&bytes[..100]).is_err());
        assert!(DataAvailabilityCertificate::deserialize(&[0x01]).is_err());
    }

    #[test]
    fn version_byte_is_signed() {
        assert_eq!(signable_fields(&[0u8; 32], 5, 0).len(), 40);
        assert_eq!(signable_fields(&[0u8; 32], 5, 1).len(), 41);
    }
}
