//! BLS12-381 signatures in the min-pk setting: 48 byte public keys, 96 byte signatures.

use blst::min_pk::{AggregatePublicKey, AggregateSignature, PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use rand::RngCore;
use sov_da_interface::DaError;

/// Domain separation tag of every signature in the committee.
pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";
/// Size of a compressed public key.
pub const PUBLIC_KEY_LEN: usize = 48;
/// Size of a compressed signature.
pub const SIGNATURE_LEN: usize = 96;

fn bls_err(context: &str, e: BLST_ERROR) -> DaError {
    DaError::VerificationFailed(format!("{context}: {e:?}"))
}

/// A committee member's signing key.
#[derive(Clone)]
pub struct BlsPrivateKey(SecretKey);

impl BlsPrivateKey {
    /// Draws a fresh key from the thread rng.
    pub fn generate() -> Result<Self, DaError> {
        let mut ikm = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut ikm);
        Self::from_seed(&ikm)
    }

    /// Derives a key from at least 32 bytes of key material.
    pub fn from_seed(ikm: &[u8]) -> Result<Self, DaError> {
        SecretKey::key_gen(ikm, &[])
            .map(Self)
            .map_err(|e| DaError::Internal(format!("bls key generation failed: {e:?}")))
    }

    /// The matching public key.
    pub fn public_key(&self) -> BlsPublicKey {
        BlsPublicKey(self.0.sk_to_pk())
    }

    /// Signs `msg`.
    pub fn sign(&self, msg: &[u8]) -> BlsSignature {
        BlsSignature(self.0.sign(msg, DST, &[]))
    }
}

impl std::fmt::Debug for BlsPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BlsPrivateKey").field(&"<redacted>").finish()
    }
}

/// A committee member's public key.
#[derive(Clone)]
pub struct BlsPublicKey(PublicKey);

impl BlsPublicKey {
    /// Parses and subgroup-checks a compressed public key.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DaError> {
        PublicKey::key_validate(bytes)
            .map(Self)
            .map_err(|e| bls_err("invalid public key", e))
    }

    /// The compressed encoding.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.0.compress()
    }
}

impl PartialEq for BlsPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsPublicKey {}

impl std::fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlsPublicKey({})", hex::encode(self.to_bytes()))
    }
}

/// A single or aggregated signature.
#[derive(Clone)]
pub struct BlsSignature(Signature);

impl BlsSignature {
    /// Parses and subgroup-checks a compressed signature.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DaError> {
        Signature::sig_validate(bytes, true)
            .map(Self)
            .map_err(|e| bls_err("invalid signature", e))
    }

    /// The compressed encoding.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.compress()
    }

    /// Checks a signature by a single key.
    pub fn verify(&self, msg: &[u8], pk: &BlsPublicKey) -> bool {
        self.0.verify(true, msg, DST, &[], &pk.0, true) == BLST_ERROR::BLST_SUCCESS
    }

    /// Checks an aggregate of signatures by `pks`, all over the same `msg`.
    pub fn verify_aggregate(&self, msg: &[u8], pks: &[&BlsPublicKey]) -> bool {
        if pks.is_empty() {
            return false;
        }
        let pks: Vec<&PublicKey> = pks.iter().map(|pk| &pk.0).collect();
        self.0.fast_aggregate_verify(true, msg, DST, &pks) == BLST_ERROR::BLST_SUCCESS
    }
}

impl PartialEq for BlsSignature {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsSignature {}

impl std::fmt::Debug for BlsSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlsSignature({})", hex::encode(self.to_bytes()))
    }
}

/// Combines signatures over the same message into one.
pub fn aggregate_signatures(sigs: &[BlsSignature]) -> Result<BlsSignature, DaError> {
    let refs: Vec<&Signature> = sigs.iter().map(|s| &s.0).collect();
    AggregateSignature::aggregate(&refs, true)
        .map(|agg| BlsSignature(agg.to_signature()))
        .map_err(|e| bls_err("signature aggregation failed", e))
}

/// Combines public keys into the key an aggregate signature verifies against.
pub fn aggregate_public_keys(pks: &[&BlsPublicKey]) -> Result<BlsPublicKey, DaError> {
    let refs: Vec<&PublicKey> = pks.iter().map(|pk| &pk.0).collect();
    AggregatePublicKey::aggregate(&refs, true)
        .map(|agg| BlsPublicKey(agg.to_public_key()))
        .map_err(|e| bls_err("public key aggregation failed", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_verifies_against_signers_only() {
        let keys: Vec<_> = (0..3).map(|_| BlsPrivateKey::generate().unwrap()).collect();
        let pks: Vec<_> = keys.iter().map(|k| k.public_key()).collect();
        let msg = b"data hash and timeout";

        let sigs: Vec<_> = keys[..2].iter().map(|k| k.sign(msg)).collect();
        let agg = aggregate_signatures(&sigs).unwrap();

        assert!(agg.verify_aggregate(msg, &[&pks[0], &pks[1]]));
        assert!(!agg.verify_aggregate(msg, &[&pks[0], &pks[2]]));
        assert!(!agg.verify_aggregate(b"other", &[&pks[0], &pks[1]]));

        let agg_pk = aggregate_public_keys(&[&pks[0], &pks[1]]).unwrap();
        assert!(agg.verify(msg, &agg_pk));
    }

    #[test]
    fn keys_and_signatures_survive_compression() {
        let key = BlsPrivateKey::from_seed(&[7u8; 32]).unwrap();
        let pk = key.public_key();
        let sig = key.sign(b"msg");
        assert_eq!(BlsPublicKey::from_bytes(&pk.to_bytes()).unwrap(), pk);
        assert_eq!(BlsSignature::from_bytes(&sig.to_bytes()).unwrap(), sig);
        assert!(BlsPublicKey::from_bytes(&[0u8; 3]).is_err());
    }

    #[test]
    fn short_seed_is_rejected() {
        assert!(BlsPrivateKey::from_seed(&[1u8; 8]).is_err());
    }
}
