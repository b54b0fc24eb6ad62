/**
 * Template Record
 * Enrolment (multi-trial averaging + salted digest) and the
 * similarity-based authentication decision
 */

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{NeuroLockError, Result};
use crate::features::{self, FeatureVector, MentalTask};
use crate::hashing::{self, DigestAlgorithm, SaltedDigest};
use crate::similarity::{similarity, NORM_EPSILON};

pub const TEMPLATE_FORMAT_VERSION: u32 = 1;

/// Owner ids occupy a 64-byte null-padded block; one byte is kept for the
/// terminator.
pub const MAX_OWNER_ID_LEN: usize = 63;

#[derive(Clone)]
pub struct Template {
    pub owner_id: String,
    pub task_type: MentalTask,
    pub feature_vector: FeatureVector,
    pub digest: SaltedDigest,
    pub created_at: i64,
    pub last_used: i64,
    pub format_version: u32,
}

impl Template {
    pub fn touch(&mut self) {
        self.last_used = features::now_secs();
    }

    /// Recompute the digest over the stored vector and salt and compare it
    /// against the stored digest in constant time.
    pub fn verify_digest(&self, algorithm: &dyn DigestAlgorithm) -> Result<bool> {
        let recomputed = hashing::digest(algorithm, &self.feature_vector, self.digest.salt())?;
        Ok(hashing::digest_equal(
            recomputed.digest(),
            self.digest.digest(),
        ))
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("owner_id", &self.owner_id)
            .field("task_type", &self.task_type)
            .field("feature_vector", &self.feature_vector)
            .field("digest", &self.digest)
            .field("created_at", &self.created_at)
            .field("last_used", &self.last_used)
            .field("format_version", &self.format_version)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResult {
    pub authenticated: bool,
    pub similarity_score: f32,
    pub decided_at: i64,
    pub attempts: u32,
}

pub fn validate_owner_id(owner_id: &str) -> Result<()> {
    if owner_id.is_empty() {
        return Err(NeuroLockError::InvalidInput(
            "owner id is empty".to_string(),
        ));
    }
    if owner_id.len() > MAX_OWNER_ID_LEN {
        return Err(NeuroLockError::InvalidInput(format!(
            "owner id longer than {} bytes",
            MAX_OWNER_ID_LEN
        )));
    }
    if owner_id.starts_with('.')
        || !owner_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
    {
        return Err(NeuroLockError::InvalidInput(format!(
            "owner id '{}' contains unsupported characters",
            owner_id
        )));
    }
    Ok(())
}

/// Capture timestamp (ms) carried by a template's averaged vector. Only
/// `created_at` is persisted, so the vector's stamp is derived from it.
pub(crate) fn capture_stamp(created_at: i64) -> u64 {
    (created_at.max(0) as u64).saturating_mul(1000)
}

/// Average the enrolment trials into one representative vector and bind it
/// to a freshly salted digest. Pure apart from reading the clock and the
/// OS random source.
pub fn build_template(
    owner_id: &str,
    trials: &[FeatureVector],
    task: MentalTask,
    algorithm: &dyn DigestAlgorithm,
    salt_length: usize,
) -> Result<Template> {
    validate_owner_id(owner_id)?;
    for (index, trial) in trials.iter().enumerate() {
        if trial.values().iter().any(|v| !v.is_finite()) {
            return Err(NeuroLockError::InvalidInput(format!(
                "trial {} contains a non-finite value",
                index
            )));
        }
    }

    let now = features::now_secs();
    let averaged = features::average(trials, task, capture_stamp(now))?;

    // A template no candidate can ever be compared against is refused here
    // rather than at every later authentication.
    let norm = averaged
        .values()
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt();
    if norm < NORM_EPSILON {
        return Err(NeuroLockError::InvalidInput(format!(
            "averaged vector norm {:e} is below {:e}",
            norm, NORM_EPSILON
        )));
    }
    let digest = hashing::digest_with_fresh_salt(algorithm, &averaged, salt_length)?;

    info!(
        "Template built for {} from {} trials ({} features)",
        owner_id,
        trials.len(),
        averaged.len()
    );

    Ok(Template {
        owner_id: owner_id.to_string(),
        task_type: task,
        feature_vector: averaged,
        digest,
        created_at: now,
        last_used: now,
        format_version: TEMPLATE_FORMAT_VERSION,
    })
}

/// Compare a fresh vector against the stored template. A score below the
/// threshold is a normal `authenticated: false` result; a vector that
/// cannot be compared is an error.
pub fn authenticate(candidate: &FeatureVector, stored: &Template, threshold: f32) -> Result<AuthResult> {
    if candidate.task() != stored.task_type {
        warn!(
            "Candidate task {} differs from enrolled task {} for {}",
            candidate.task(),
            stored.task_type,
            stored.owner_id
        );
    }

    let score = similarity(candidate.values(), stored.feature_vector.values())?;
    let authenticated = score >= threshold;

    if authenticated {
        info!(
            "Authentication successful for {} (similarity: {:.3})",
            stored.owner_id, score
        );
    } else {
        warn!(
            "Authentication failed for {} (similarity: {:.3} < {:.3})",
            stored.owner_id, score, threshold
        );
    }

    Ok(AuthResult {
        authenticated,
        similarity_score: score,
        decided_at: features::now_secs(),
        attempts: 1,
    })
}
