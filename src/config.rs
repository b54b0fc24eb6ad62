/**
 * Configuration
 * Read-only settings for enrolment, hashing, matching and storage
 */

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{NeuroLockError, Result};
use crate::hashing::DigestAlgorithmKind;

/// 8 channels x 5 frequency bands.
pub const DEFAULT_FEATURE_DIMENSION: usize = 40;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;
pub const DEFAULT_SALT_LENGTH: usize = 32;
pub const MIN_SALT_LENGTH: usize = 16;
pub const DEFAULT_ENROLMENT_TRIALS: usize = 3;
pub const DEFAULT_MAX_AUTH_ATTEMPTS: usize = 3;
pub const DEFAULT_CAPTURE_SECONDS: u64 = 5;
pub const DEFAULT_TEMPLATE_DIR: &str = "./templates";
pub const DEFAULT_TEMPLATE_EXTENSION: &str = ".nlt";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct Config {
    pub feature_dimension: usize,
    pub similarity_threshold: f32,
    pub salt_length: usize,
    pub digest_algorithm: DigestAlgorithmKind,
    pub enrolment_trials: usize,
    pub max_auth_attempts: usize,
    pub capture_duration: Duration,
    pub template_dir: PathBuf,
    pub template_extension: String,
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feature_dimension: DEFAULT_FEATURE_DIMENSION,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            salt_length: DEFAULT_SALT_LENGTH,
            digest_algorithm: DigestAlgorithmKind::Sha256,
            enrolment_trials: DEFAULT_ENROLMENT_TRIALS,
            max_auth_attempts: DEFAULT_MAX_AUTH_ATTEMPTS,
            capture_duration: Duration::from_secs(DEFAULT_CAPTURE_SECONDS),
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            template_extension: DEFAULT_TEMPLATE_EXTENSION.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by `NEUROLOCK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] but reading from an arbitrary source, so
    /// tests don't have to mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("NEUROLOCK_FEATURE_DIMENSION") {
            config.feature_dimension = parse_value("NEUROLOCK_FEATURE_DIMENSION", &v)?;
        }
        if let Some(v) = lookup("NEUROLOCK_SIMILARITY_THRESHOLD") {
            config.similarity_threshold = parse_value("NEUROLOCK_SIMILARITY_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("NEUROLOCK_SALT_LENGTH") {
            config.salt_length = parse_value("NEUROLOCK_SALT_LENGTH", &v)?;
        }
        if let Some(v) = lookup("NEUROLOCK_DIGEST_ALGORITHM") {
            config.digest_algorithm = v.parse()?;
        }
        if let Some(v) = lookup("NEUROLOCK_ENROLMENT_TRIALS") {
            config.enrolment_trials = parse_value("NEUROLOCK_ENROLMENT_TRIALS", &v)?;
        }
        if let Some(v) = lookup("NEUROLOCK_MAX_AUTH_ATTEMPTS") {
            config.max_auth_attempts = parse_value("NEUROLOCK_MAX_AUTH_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("NEUROLOCK_CAPTURE_SECONDS") {
            let secs: u64 = parse_value("NEUROLOCK_CAPTURE_SECONDS", &v)?;
            config.capture_duration = Duration::from_secs(secs);
        }
        if let Some(v) = lookup("NEUROLOCK_TEMPLATE_DIR") {
            config.template_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("NEUROLOCK_TEMPLATE_EXTENSION") {
            config.template_extension = v;
        }
        if let Some(v) = lookup("NEUROLOCK_BIND_ADDR") {
            config.bind_addr = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feature_dimension == 0 {
            return Err(NeuroLockError::Config(
                "feature dimension must be non-zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(NeuroLockError::Config(format!(
                "similarity threshold {} outside [0, 1]",
                self.similarity_threshold
            )));
        }
        if self.salt_length < MIN_SALT_LENGTH {
            return Err(NeuroLockError::Config(format!(
                "salt length {} below minimum {}",
                self.salt_length, MIN_SALT_LENGTH
            )));
        }
        if self.enrolment_trials == 0 {
            return Err(NeuroLockError::Config(
                "at least one enrolment trial is required".to_string(),
            ));
        }
        if self.max_auth_attempts == 0 {
            return Err(NeuroLockError::Config(
                "at least one authentication attempt is required".to_string(),
            ));
        }
        if !self.template_extension.starts_with('.') || self.template_extension.contains('/') {
            return Err(NeuroLockError::Config(format!(
                "template extension '{}' must look like '.ext'",
                self.template_extension
            )));
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| NeuroLockError::Config(format!("{}: cannot parse '{}'", key, raw)))
}
