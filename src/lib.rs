/**
 * NeuroLock TEE
 * Brainprint template enrolment, salted storage and similarity-based
 * authentication
 */

pub mod api;
pub mod biometric;
pub mod config;
pub mod error;
pub mod features;
pub mod hashing;
pub mod pipeline;
pub mod similarity;
pub mod store;
pub mod template;

pub use biometric::{BiometricService, EnrolmentReceipt};
pub use config::Config;
pub use error::{NeuroLockError, Result};
pub use features::{FeatureVector, MentalTask, RawSample};
pub use hashing::{DigestAlgorithm, SaltedDigest, Sha256Digest};
pub use pipeline::{AuthenticationPipeline, CaptureSession, EnrolmentPipeline, FeatureExtractor};
pub use store::TemplateStore;
pub use template::{AuthResult, Template};
