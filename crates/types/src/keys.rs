//! Cryptographic key material.
//!
//! Two key families per node:
//!
//! - **BLS12-381** (`min_sig` parameterization: 96-byte G2 public keys,
//!   48-byte G1 signatures) for committee votes. Signatures aggregate, which
//!   is what makes [`StepVotes`](crate::StepVotes) compact.
//! - **Ed25519** for the wire envelope. Every gossiped consensus message is
//!   signed by the sender's Edwards key.
//!
//! Key types store compressed bytes and parse on use; this keeps them `Copy`,
//! hashable and directly serializable.

use blst::min_sig::{AggregateSignature, PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

/// Compressed BLS public key size (G2).
pub const BLS_PUBLIC_KEY_SIZE: usize = 96;
/// Compressed BLS signature size (G1).
pub const BLS_SIGNATURE_SIZE: usize = 48;
/// Ed25519 public key size.
pub const ED_PUBLIC_KEY_SIZE: usize = 32;
/// Ed25519 signature size.
pub const ED_SIGNATURE_SIZE: usize = 64;

/// Domain separation tag for BLS signatures (min_sig ciphersuite).
const DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_NUL_";

/// Abbreviated hex Debug for fixed-size byte newtypes.
macro_rules! fmt_abbrev {
    () => {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(
                f,
                "{:02x}{:02x}{:02x}{:02x}..",
                self.0[0], self.0[1], self.0[2], self.0[3]
            )
        }
    };
}

/// Errors from signature operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Bytes do not decode to a curve point.
    #[error("invalid BLS public key")]
    InvalidBlsPublicKey,
    /// Bytes do not decode to a signature point.
    #[error("invalid BLS signature")]
    InvalidBlsSignature,
    /// Signature does not verify against the key and message.
    #[error("BLS verification failed")]
    BlsVerification,
    /// Ed25519 key bytes are not a valid curve point.
    #[error("invalid Ed25519 public key")]
    InvalidEdPublicKey,
    /// Ed25519 signature does not verify.
    #[error("Ed25519 verification failed")]
    EdVerification,
    /// Aggregation over an empty or inconsistent input.
    #[error("BLS aggregation failed")]
    Aggregation,
}

// ═══════════════════════════════════════════════════════════════════════════
// BLS
// ═══════════════════════════════════════════════════════════════════════════

/// A compressed BLS public key (96 bytes, G2).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlsPublicKey([u8; BLS_PUBLIC_KEY_SIZE]);

impl BlsPublicKey {
    /// Wrap compressed key bytes without validating the point.
    pub const fn from_bytes(bytes: [u8; BLS_PUBLIC_KEY_SIZE]) -> Self {
        BlsPublicKey(bytes)
    }

    /// Compressed key bytes.
    pub fn as_bytes(&self) -> &[u8; BLS_PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Decode and validate the curve point.
    fn parse(&self) -> Result<PublicKey, SignatureError> {
        PublicKey::from_bytes(&self.0).map_err(|_| SignatureError::InvalidBlsPublicKey)
    }

    /// Verify a single signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &BlsSignature) -> Result<(), SignatureError> {
        let pk = self.parse()?;
        let sig = signature.parse()?;
        match sig.verify(true, message, DST, &[], &pk, true) {
            BLST_ERROR::BLST_SUCCESS => Ok(()),
            _ => Err(SignatureError::BlsVerification),
        }
    }

    /// Base58 form used in logs and reputation reports.
    pub fn to_base58(&self) -> String {
        crate::base58::base58_encode(&self.0)
    }
}

impl std::fmt::Debug for BlsPublicKey {
    fmt_abbrev!();
}

/// A compressed BLS signature (48 bytes, G1).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlsSignature([u8; BLS_SIGNATURE_SIZE]);

impl BlsSignature {
    /// Wrap compressed signature bytes without validating the point.
    pub const fn from_bytes(bytes: [u8; BLS_SIGNATURE_SIZE]) -> Self {
        BlsSignature(bytes)
    }

    /// Compressed signature bytes.
    pub fn as_bytes(&self) -> &[u8; BLS_SIGNATURE_SIZE] {
        &self.0
    }

    fn parse(&self) -> Result<Signature, SignatureError> {
        Signature::from_bytes(&self.0).map_err(|_| SignatureError::InvalidBlsSignature)
    }

    /// Verify this as an aggregate signature: all `signers` signed `message`.
    pub fn verify_aggregate(
        &self,
        message: &[u8],
        signers: &[BlsPublicKey],
    ) -> Result<(), SignatureError> {
        if signers.is_empty() {
            return Err(SignatureError::Aggregation);
        }
        let keys = signers
            .iter()
            .map(|k| k.parse())
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&PublicKey> = keys.iter().collect();
        let sig = self.parse()?;
        match sig.fast_aggregate_verify(true, message, DST, &refs) {
            BLST_ERROR::BLST_SUCCESS => Ok(()),
            _ => Err(SignatureError::BlsVerification),
        }
    }
}

impl std::fmt::Debug for BlsSignature {
    fmt_abbrev!();
}

/// Incrementally aggregated BLS signature.
///
/// Reduction and agreement accumulators fold each accepted vote in as it
/// arrives rather than batching at quorum time.
#[derive(Debug, Clone, Default)]
pub struct BlsAggregate {
    current: Option<BlsSignature>,
}

impl BlsAggregate {
    /// Empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one signature into the aggregate.
    pub fn add(&mut self, signature: &BlsSignature) -> Result<(), SignatureError> {
        let incoming = signature.parse()?;
        let combined = match &self.current {
            None => incoming,
            Some(existing) => {
                let mut agg = AggregateSignature::from_signature(&existing.parse()?);
                agg.add_signature(&incoming, true)
                    .map_err(|_| SignatureError::Aggregation)?;
                agg.to_signature()
            }
        };
        self.current = Some(BlsSignature(combined.to_bytes()));
        Ok(())
    }

    /// The aggregate so far, if any signature was added.
    pub fn signature(&self) -> Option<BlsSignature> {
        self.current
    }

    /// True if nothing has been aggregated yet.
    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

/// A BLS signing keypair.
#[derive(Clone)]
pub struct BlsKeyPair {
    secret: SecretKey,
    public: BlsPublicKey,
}

impl BlsKeyPair {
    /// Derive a keypair from 32 bytes of input key material.
    pub fn from_ikm(ikm: &[u8; 32]) -> Self {
        // key_gen only fails for ikm shorter than 32 bytes.
        let secret = SecretKey::key_gen(ikm, &[]).expect("ikm is 32 bytes");
        let public = BlsPublicKey(secret.sk_to_pk().to_bytes());
        Self { secret, public }
    }

    /// Generate a keypair from the given randomness source.
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let mut ikm = [0u8; 32];
        rng.fill_bytes(&mut ikm);
        let pair = Self::from_ikm(&ikm);
        ikm.zeroize();
        pair
    }

    /// Sign `message`.
    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        BlsSignature(self.secret.sign(message, DST, &[]).to_bytes())
    }

    /// The public half.
    pub fn public_key(&self) -> BlsPublicKey {
        self.public
    }
}

impl std::fmt::Debug for BlsKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlsKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Ed25519
// ═══════════════════════════════════════════════════════════════════════════

/// An Ed25519 public key (32 bytes). Identifies the sender of a wire message.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdPublicKey([u8; ED_PUBLIC_KEY_SIZE]);

impl EdPublicKey {
    /// Wrap key bytes without validating the point.
    pub const fn from_bytes(bytes: [u8; ED_PUBLIC_KEY_SIZE]) -> Self {
        EdPublicKey(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; ED_PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Verify an envelope signature.
    pub fn verify(&self, message: &[u8], signature: &EdSignature) -> Result<(), SignatureError> {
        let key = VerifyingKey::from_bytes(&self.0)
            .map_err(|_| SignatureError::InvalidEdPublicKey)?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        key.verify(message, &sig)
            .map_err(|_| SignatureError::EdVerification)
    }

    /// Base58 form used in logs and reputation reports.
    pub fn to_base58(&self) -> String {
        crate::base58::base58_encode(&self.0)
    }
}

impl std::fmt::Debug for EdPublicKey {
    fmt_abbrev!();
}

/// An Ed25519 signature (64 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EdSignature([u8; ED_SIGNATURE_SIZE]);

impl EdSignature {
    /// Wrap signature bytes.
    pub const fn from_bytes(bytes: [u8; ED_SIGNATURE_SIZE]) -> Self {
        EdSignature(bytes)
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; ED_SIGNATURE_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for EdSignature {
    fmt_abbrev!();
}

/// An Ed25519 signing keypair.
#[derive(Clone)]
pub struct EdKeyPair {
    signing: SigningKey,
    public: EdPublicKey,
}

impl EdKeyPair {
    /// Build a keypair from a 32-byte secret.
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(secret);
        let public = EdPublicKey(signing.verifying_key().to_bytes());
        Self { signing, public }
    }

    /// Generate a keypair from the given randomness source.
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        let pair = Self::from_secret(&secret);
        secret.zeroize();
        pair
    }

    /// Sign `message`.
    pub fn sign(&self, message: &[u8]) -> EdSignature {
        EdSignature(self.signing.sign(message).to_bytes())
    }

    /// The public half.
    pub fn public_key(&self) -> EdPublicKey {
        self.public
    }
}

impl std::fmt::Debug for EdKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Node identity
// ═══════════════════════════════════════════════════════════════════════════

/// The full key material of a consensus participant.
#[derive(Debug, Clone)]
pub struct ConsensusKeys {
    /// Committee voting key.
    pub bls: BlsKeyPair,
    /// Wire envelope key.
    pub ed: EdKeyPair,
}

impl ConsensusKeys {
    /// Generate both keypairs from the given randomness source.
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        Self {
            bls: BlsKeyPair::generate(rng),
            ed: EdKeyPair::generate(rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn bls_sign_verify() {
        let pair = BlsKeyPair::generate(&mut rng());
        let sig = pair.sign(b"vote");
        assert!(pair.public_key().verify(b"vote", &sig).is_ok());
        assert_eq!(
            pair.public_key().verify(b"other", &sig),
            Err(SignatureError::BlsVerification)
        );
    }

    #[test]
    fn bls_keys_are_deterministic_per_ikm() {
        let a = BlsKeyPair::from_ikm(&[9u8; 32]);
        let b = BlsKeyPair::from_ikm(&[9u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn bls_aggregate_verifies_against_all_signers() {
        let mut r = rng();
        let pairs: Vec<BlsKeyPair> = (0..4).map(|_| BlsKeyPair::generate(&mut r)).collect();
        let msg = b"step vote";

        let mut agg = BlsAggregate::new();
        for pair in &pairs {
            agg.add(&pair.sign(msg)).unwrap();
        }

        let signers: Vec<BlsPublicKey> = pairs.iter().map(|p| p.public_key()).collect();
        let sig = agg.signature().unwrap();
        assert!(sig.verify_aggregate(msg, &signers).is_ok());

        // Dropping one signer from the key set must break verification.
        assert!(sig.verify_aggregate(msg, &signers[1..]).is_err());
    }

    #[test]
    fn ed_sign_verify() {
        let pair = EdKeyPair::generate(&mut rng());
        let sig = pair.sign(b"envelope");
        assert!(pair.public_key().verify(b"envelope", &sig).is_ok());
        assert_eq!(
            pair.public_key().verify(b"tampered", &sig),
            Err(SignatureError::EdVerification)
        );
    }

    #[test]
    fn aggregate_rejects_empty_signer_set() {
        let pair = BlsKeyPair::generate(&mut rng());
        let sig = pair.sign(b"m");
        assert_eq!(
            sig.verify_aggregate(b"m", &[]),
            Err(SignatureError::Aggregation)
        );
    }
}
