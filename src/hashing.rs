/**
 * Salted Digest Engine
 * One-way hashing of feature vectors with fresh random salt,
 * constant-time digest comparison and scoped wiping of secrets
 */

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{try_with_capacity, NeuroLockError, Result};
use crate::features::{FeatureVector, FEATURE_WIDTH};

/// One-way hash primitive used to bind a feature vector to its salt.
pub trait DigestAlgorithm: Send + Sync {
    fn name(&self) -> &'static str;

    fn output_len(&self) -> usize;

    fn hash(&self, input: &[u8]) -> Result<Vec<u8>>;
}

pub struct Sha256Digest;

impl DigestAlgorithm for Sha256Digest {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn output_len(&self) -> usize {
        32
    }

    fn hash(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut hasher = Sha256::new();
        hasher.update(input);
        Ok(hasher.finalize().to_vec())
    }
}

/// Configuration-time selector for the digest algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithmKind {
    Sha256,
}

impl DigestAlgorithmKind {
    pub fn build(self) -> Arc<dyn DigestAlgorithm> {
        match self {
            DigestAlgorithmKind::Sha256 => Arc::new(Sha256Digest),
        }
    }
}

impl FromStr for DigestAlgorithmKind {
    type Err = NeuroLockError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(DigestAlgorithmKind::Sha256),
            other => Err(NeuroLockError::Config(format!(
                "unsupported digest algorithm '{}'",
                other
            ))),
        }
    }
}

/// `digest = H(serialize(feature_vector) || salt)`. Both buffers are wiped
/// when the value is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SaltedDigest {
    digest: Vec<u8>,
    salt: Vec<u8>,
}

impl SaltedDigest {
    /// Reassemble a digest read back from storage.
    pub fn from_parts(digest: Vec<u8>, salt: Vec<u8>) -> Self {
        Self { digest, salt }
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn to_hex(&self) -> String {
        digest_to_hex(&self.digest)
    }
}

impl fmt::Debug for SaltedDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaltedDigest")
            .field("digest_len", &self.digest.len())
            .field("salt_len", &self.salt.len())
            .finish()
    }
}

/// Fill `length` bytes from the OS random source. A short or failed read is
/// an error, never a partial fill.
pub fn generate_salt(length: usize) -> Result<Vec<u8>> {
    if length == 0 {
        return Err(NeuroLockError::InvalidInput(
            "salt length must be non-zero".to_string(),
        ));
    }
    debug!("Generating {}-byte random salt", length);

    let mut salt = try_with_capacity(length)?;
    salt.resize(length, 0u8);
    if SystemRandom::new().fill(&mut salt).is_err() {
        salt.zeroize();
        return Err(NeuroLockError::EntropyUnavailable);
    }
    Ok(salt)
}

/// Hash the canonical serialization of `features` followed by `salt` in a
/// single pass.
pub fn digest(
    algorithm: &dyn DigestAlgorithm,
    features: &FeatureVector,
    salt: &[u8],
) -> Result<SaltedDigest> {
    if salt.is_empty() {
        return Err(NeuroLockError::InvalidInput("salt is empty".to_string()));
    }

    let mut input = Zeroizing::new(try_with_capacity::<u8>(
        features.len() * FEATURE_WIDTH + salt.len(),
    )?);
    features.write_le_bytes(&mut input);
    input.extend_from_slice(salt);

    let output = Zeroizing::new(algorithm.hash(&input)?);
    if output.len() != algorithm.output_len() {
        return Err(NeuroLockError::CryptoFailure(format!(
            "{} produced {} bytes, expected {}",
            algorithm.name(),
            output.len(),
            algorithm.output_len()
        )));
    }

    debug!("{} digest complete ({} bytes)", algorithm.name(), output.len());
    Ok(SaltedDigest {
        digest: output.to_vec(),
        salt: salt.to_vec(),
    })
}

/// Fresh salt plus digest in one step.
pub fn digest_with_fresh_salt(
    algorithm: &dyn DigestAlgorithm,
    features: &FeatureVector,
    salt_length: usize,
) -> Result<SaltedDigest> {
    let salt = Zeroizing::new(generate_salt(salt_length)?);
    digest(algorithm, features, &salt)
}

/// Constant-time equality. Every byte is visited regardless of where the
/// first difference lies; only a length mismatch returns early.
pub fn digest_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    std::hint::black_box(diff) == 0
}

/// Bitwise Hamming distance between two equal-length digests.
///
/// Not used by the authentication decision, which matches on cosine
/// similarity over plaintext features.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> Result<u32> {
    if a.len() != b.len() {
        return Err(NeuroLockError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum())
}

pub fn digest_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
