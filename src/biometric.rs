/**
 * Biometric Service
 * Enrols, authenticates and deletes brainprint templates
 * (feature vectors never leave this process except as a salted record)
 */

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{NeuroLockError, Result};
use crate::features::{FeatureVector, MentalTask};
use crate::hashing::DigestAlgorithm;
use crate::store::TemplateStore;
use crate::template::{self, validate_owner_id, AuthResult, Template};

#[derive(Debug, Clone, Serialize)]
pub struct EnrolmentReceipt {
    pub owner_id: String,
    pub task: MentalTask,
    pub created_at: i64,
    pub digest: String,
}

pub struct BiometricService {
    config: Config,
    store: TemplateStore,
    algorithm: Arc<dyn DigestAlgorithm>,
    /// One lock per owner id; held across every read-modify-write of that
    /// owner's record.
    owner_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BiometricService {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let store = TemplateStore::from_config(&config);
        let algorithm = config.digest_algorithm.build();
        Ok(Self::with_parts(config, store, algorithm))
    }

    pub fn with_parts(
        config: Config,
        store: TemplateStore,
        algorithm: Arc<dyn DigestAlgorithm>,
    ) -> Self {
        Self {
            config,
            store,
            algorithm,
            owner_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Build and persist a template from exactly `enrolment_trials` vectors.
    /// An existing template must be deleted first.
    pub fn enroll(
        &self,
        owner_id: &str,
        trials: &[FeatureVector],
        task: MentalTask,
    ) -> Result<EnrolmentReceipt> {
        info!("Enrolment request: owner_id={}, trials={}", owner_id, trials.len());

        let lock = self.owner_lock(owner_id)?;
        let _guard = lock.lock();
        if self.store.exists(owner_id)? {
            warn!("Enrolment refused: {} already enrolled", owner_id);
            return Err(NeuroLockError::AlreadyExists(owner_id.to_string()));
        }
        if trials.len() != self.config.enrolment_trials {
            return Err(NeuroLockError::InvalidInput(format!(
                "expected {} enrolment trials, got {}",
                self.config.enrolment_trials,
                trials.len()
            )));
        }
        for trial in trials {
            self.check_dimension(trial)?;
        }

        // Dropped (and wiped) on any failure below; nothing reaches disk
        // unless save succeeds.
        let template = template::build_template(
            owner_id,
            trials,
            task,
            self.algorithm.as_ref(),
            self.config.salt_length,
        )?;
        self.store.save(&template)?;

        Ok(EnrolmentReceipt {
            owner_id: template.owner_id.clone(),
            task: template.task_type,
            created_at: template.created_at,
            digest: template.digest.to_hex(),
        })
    }

    /// Load a template and confirm its digest still covers the stored vector.
    pub fn load_verified(&self, owner_id: &str) -> Result<Template> {
        let template = self.store.load(owner_id)?;
        if template.digest.digest().len() != self.algorithm.output_len() {
            return Err(NeuroLockError::CorruptRecord(format!(
                "digest for '{}' has {} bytes, {} expects {}",
                owner_id,
                template.digest.digest().len(),
                self.algorithm.name(),
                self.algorithm.output_len()
            )));
        }
        if !template.verify_digest(self.algorithm.as_ref())? {
            error!("Digest mismatch for {}: template was modified", owner_id);
            return Err(NeuroLockError::CorruptRecord(format!(
                "digest mismatch for '{}'",
                owner_id
            )));
        }
        Ok(template)
    }

    /// Decide whether `candidate` matches the stored template. On success the
    /// template's `last_used` is refreshed.
    pub fn authenticate(&self, owner_id: &str, candidate: &FeatureVector) -> Result<AuthResult> {
        info!("Authentication request: owner_id={}", owner_id);
        let lock = self.owner_lock(owner_id)?;
        let _guard = lock.lock();

        let stored = self.load_verified(owner_id)?;
        self.decide(stored, candidate)
    }

    /// Like [`authenticate`](Self::authenticate), for a candidate whose task
    /// is unknown: it is taken to be the enrolled task.
    pub fn authenticate_untagged(
        &self,
        owner_id: &str,
        mut candidate: FeatureVector,
    ) -> Result<AuthResult> {
        info!("Authentication request: owner_id={} (task unspecified)", owner_id);
        let lock = self.owner_lock(owner_id)?;
        let _guard = lock.lock();

        let stored = self.load_verified(owner_id)?;
        candidate.set_task(stored.task_type);
        self.decide(stored, &candidate)
    }

    pub fn delete(&self, owner_id: &str) -> Result<()> {
        info!("Delete request: owner_id={}", owner_id);
        let lock = self.owner_lock(owner_id)?;
        let _guard = lock.lock();
        self.store.delete(owner_id)
    }

    pub fn exists(&self, owner_id: &str) -> Result<bool> {
        self.store.exists(owner_id)
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.store.list()
    }

    /// Caller holds the owner's lock.
    fn decide(&self, mut stored: Template, candidate: &FeatureVector) -> Result<AuthResult> {
        self.check_dimension(candidate)?;

        let result = template::authenticate(candidate, &stored, self.config.similarity_threshold)?;
        if result.authenticated {
            stored.touch();
            if let Err(e) = self.store.save(&stored) {
                // The decision stands; only the timestamp is lost.
                warn!("Failed to record last_used for {}: {}", stored.owner_id, e);
            }
        }
        Ok(result)
    }

    fn owner_lock(&self, owner_id: &str) -> Result<Arc<Mutex<()>>> {
        validate_owner_id(owner_id)?;
        Ok(self
            .owner_locks
            .lock()
            .entry(owner_id.to_string())
            .or_default()
            .clone())
    }

    fn check_dimension(&self, vector: &FeatureVector) -> Result<()> {
        if vector.len() != self.config.feature_dimension {
            return Err(NeuroLockError::DimensionMismatch {
                expected: self.config.feature_dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}
