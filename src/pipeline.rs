/**
 * Enrolment & Authentication Pipelines
 * Drive an external capture session and feature extractor through
 * the biometric service
 */

use std::time::Duration;

use tracing::{debug, info};

use crate::biometric::{BiometricService, EnrolmentReceipt};
use crate::error::{NeuroLockError, Result};
use crate::features::{FeatureVector, MentalTask, RawSample};
use crate::template::AuthResult;

/// Handle to one connected recording device. Device state lives in the
/// handle, so independent sessions never share it.
pub trait CaptureSession {
    fn device_name(&self) -> &str;

    fn record(&mut self, duration: Duration, task: MentalTask) -> Result<RawSample>;
}

/// Maps a raw recording to a fixed-length feature vector.
pub trait FeatureExtractor {
    fn extract(&self, sample: &RawSample) -> Result<FeatureVector>;
}

fn capture_features(
    session: &mut dyn CaptureSession,
    extractor: &dyn FeatureExtractor,
    duration: Duration,
    task: MentalTask,
) -> Result<FeatureVector> {
    let sample = session.record(duration, task)?;
    debug!(
        "Captured {} samples x {} channels from {}",
        sample.num_samples(),
        sample.num_channels,
        session.device_name()
    );
    extractor.extract(&sample)
    // `sample` is wiped here, whether extraction succeeded or not.
}

pub struct EnrolmentPipeline<'a> {
    service: &'a BiometricService,
}

impl<'a> EnrolmentPipeline<'a> {
    pub fn new(service: &'a BiometricService) -> Self {
        Self { service }
    }

    /// Record `enrolment_trials` samples, extract each, and enrol the
    /// resulting vectors. Every intermediate buffer is owned by this call and
    /// wiped exactly once on any exit.
    pub fn run(
        &self,
        session: &mut dyn CaptureSession,
        extractor: &dyn FeatureExtractor,
        owner_id: &str,
        task: MentalTask,
    ) -> Result<EnrolmentReceipt> {
        if self.service.exists(owner_id)? {
            return Err(NeuroLockError::AlreadyExists(owner_id.to_string()));
        }

        let config = self.service.config();
        let mut trials = Vec::with_capacity(config.enrolment_trials);
        for index in 0..config.enrolment_trials {
            info!(
                "Enrolment trial {}/{} for {}",
                index + 1,
                config.enrolment_trials,
                owner_id
            );
            trials.push(capture_features(
                session,
                extractor,
                config.capture_duration,
                task,
            )?);
        }

        self.service.enroll(owner_id, &trials, task)
    }
}

pub struct AuthenticationPipeline<'a> {
    service: &'a BiometricService,
}

impl<'a> AuthenticationPipeline<'a> {
    pub fn new(service: &'a BiometricService) -> Self {
        Self { service }
    }

    /// Up to `max_auth_attempts` captures, stopping at the first match.
    /// Processing failures abort immediately instead of counting as a
    /// denied attempt.
    pub fn run(
        &self,
        session: &mut dyn CaptureSession,
        extractor: &dyn FeatureExtractor,
        owner_id: &str,
    ) -> Result<AuthResult> {
        let task = self.service.load_verified(owner_id)?.task_type;
        let config = self.service.config();

        let mut last = None;
        for attempt in 1..=config.max_auth_attempts {
            let candidate = capture_features(session, extractor, config.capture_duration, task)?;
            let mut result = self.service.authenticate(owner_id, &candidate)?;
            result.attempts = attempt as u32;
            if result.authenticated {
                return Ok(result);
            }
            last = Some(result);
        }

        last.ok_or_else(|| {
            NeuroLockError::InvalidInput("no authentication attempts configured".to_string())
        })
    }
}
