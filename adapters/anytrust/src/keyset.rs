//! The committee keyset registered on-chain.

use sov_da_interface::{tree, DaError, PreimagesMap};

use crate::bls::{BlsPublicKey, BlsSignature};

/// Committees are addressed by a 64 bit signer mask.
pub const MAX_KEYSET_SIZE: usize = 64;

/// A committee: its public keys in signer-bit order and how many of them are assumed honest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyset {
    /// Signatures required for a certificate to be valid.
    pub assumed_honest: u64,
    /// Public key of signer bit `i` at index `i`.
    pub pub_keys: Vec<BlsPublicKey>,
}

impl Keyset {
    /// Builds a keyset, checking `1 <= assumed_honest <= pub_keys.len() <= 64`.
    pub fn new(assumed_honest: u64, pub_keys: Vec<BlsPublicKey>) -> Result<Self, DaError> {
        if pub_keys.len() > MAX_KEYSET_SIZE {
            return Err(DaError::MalformedCertificate(format!(
                "keyset of {} keys exceeds the maximum of {MAX_KEYSET_SIZE}",
                pub_keys.len()
            )));
        }
        if assumed_honest == 0 || assumed_honest > pub_keys.len() as u64 {
            return Err(DaError::MalformedCertificate(format!(
                "assumed honest {assumed_honest} out of range for {} keys",
                pub_keys.len()
            )));
        }
        Ok(Self {
            assumed_honest,
            pub_keys,
        })
    }

    /// `assumedHonest_u64 ‖ numKeys_u64 ‖ (len_u16 ‖ pk)*`, all big-endian.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.pub_keys.len() * 50);
        out.extend_from_slice(&self.assumed_honest.to_be_bytes());
        out.extend_from_slice(&(self.pub_keys.len() as u64).to_be_bytes());
        for pk in &self.pub_keys {
            let bytes = pk.to_bytes();
            out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
            out.extend_from_slice(&bytes);
        }
        out
    }

    /// Parses the encoding produced by [`Keyset::serialize`]. Trailing bytes are rejected.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, DaError> {
        let mut rest = bytes;
        let assumed_honest = take_u64(&mut rest)?;
        let n = take_u64(&mut rest)?;
        if n > MAX_KEYSET_SIZE as u64 {
            return Err(DaError::MalformedCertificate(format!(
                "keyset claims {n} keys"
            )));
        }
        let mut pub_keys = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let len = u16::from_be_bytes(take::<2>(&mut rest)?) as usize;
            if rest.len() < len {
                return Err(truncated());
            }
            let (pk, tail) = rest.split_at(len);
            pub_keys.push(
                BlsPublicKey::from_bytes(pk)
                    .map_err(|e| DaError::MalformedCertificate(e.to_string()))?,
            );
            rest = tail;
        }
        if !rest.is_empty() {
            return Err(DaError::MalformedCertificate(format!(
                "{} trailing bytes after keyset",
                rest.len()
            )));
        }
        Self::new(assumed_honest, pub_keys)
    }

    /// The content tree hash of the serialization, which certificates commit to.
    pub fn hash(&self) -> [u8; 32] {
        tree::hash(&self.serialize())
    }

    /// Like [`Keyset::hash`], recording the tree preimages that resolve the keyset.
    pub fn record_hash(&self, preimages: &mut Option<&mut PreimagesMap>) -> [u8; 32] {
        tree::record_hash(&self.serialize(), preimages.as_deref_mut())
    }

    /// Checks that `sig` is an aggregate over `data` by the keys selected by `signers_mask`, and
    /// that at least `assumed_honest` keys signed.
    pub fn verify_signature(
        &self,
        signers_mask: u64,
        data: &[u8],
        sig: &BlsSignature,
    ) -> Result<(), DaError> {
        let n = self.pub_keys.len();
        if n < 64 && signers_mask >> n != 0 {
            return Err(DaError::VerificationFailed(format!(
                "signer mask {signers_mask:#x} selects keys outside a keyset of {n}"
            )));
        }
        let signers: Vec<&BlsPublicKey> = self
            .pub_keys
            .iter()
            .enumerate()
            .filter(|(i, _)| signers_mask & (1 << i) != 0)
            .map(|(_, pk)| pk)
            .collect();
        if (signers.len() as u64) < self.assumed_honest {
            return Err(DaError::VerificationFailed(format!(
                "{} signers, {} required",
                signers.len(),
                self.assumed_honest
            )));
        }
        if !sig.verify_aggregate(data, &signers) {
            return Err(DaError::VerificationFailed(
                "aggregate signature does not verify".to_string(),
            ));
        }
        Ok(())
    }
}

fn truncated() -> DaError {
    DaError::MalformedCertificate("keyset truncated".to_string())
}

fn take<const N: usize>(rest: &mut &[u8]) -> Result<[u8; N], DaError> {
    if rest.len() < N {
        return Err(truncated());
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&rest[..N]);
    *rest = &rest[N..];
    Ok(out)
}

fn take_u64(rest: &mut &[u8]) -> Result<u64, DaError> {
    take::<8>(rest).map(u64::from_be_bytes)
}
