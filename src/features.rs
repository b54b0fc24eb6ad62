/**
 * Feature Types
 * Mental tasks, feature vectors and raw sample buffers exchanged with
 * the (external) capture and extraction stages
 */

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{try_with_capacity, NeuroLockError, Result};

/// Bytes per feature value in the canonical encoding.
pub const FEATURE_WIDTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum MentalTask {
    EyesClosedRest = 0,
    EyesOpenRest = 1,
    MentalArithmetic = 2,
    MotorImagery = 3,
    VisualImagery = 4,
}

impl MentalTask {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl Default for MentalTask {
    fn default() -> Self {
        MentalTask::EyesClosedRest
    }
}

impl TryFrom<u32> for MentalTask {
    type Error = NeuroLockError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(MentalTask::EyesClosedRest),
            1 => Ok(MentalTask::EyesOpenRest),
            2 => Ok(MentalTask::MentalArithmetic),
            3 => Ok(MentalTask::MotorImagery),
            4 => Ok(MentalTask::VisualImagery),
            other => Err(NeuroLockError::InvalidInput(format!(
                "unknown mental task {}",
                other
            ))),
        }
    }
}

impl fmt::Display for MentalTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MentalTask::EyesClosedRest => "eyes_closed_rest",
            MentalTask::EyesOpenRest => "eyes_open_rest",
            MentalTask::MentalArithmetic => "mental_arithmetic",
            MentalTask::MotorImagery => "motor_imagery",
            MentalTask::VisualImagery => "visual_imagery",
        };
        f.write_str(name)
    }
}

/// Fixed-length numeric summary of one processed sample. The values are
/// wiped when the vector is dropped.
#[derive(Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f32>,
    task: MentalTask,
    captured_at_ms: u64,
}

impl FeatureVector {
    pub fn new(values: Vec<f32>, task: MentalTask, captured_at_ms: u64) -> Self {
        Self {
            values,
            task,
            captured_at_ms,
        }
    }

    /// Vector stamped with the current wall clock.
    pub fn captured_now(values: Vec<f32>, task: MentalTask) -> Self {
        Self::new(values, task, now_millis())
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn task(&self) -> MentalTask {
        self.task
    }

    pub fn captured_at_ms(&self) -> u64 {
        self.captured_at_ms
    }

    /// Re-tag the vector, e.g. when the caller did not say which task it was
    /// captured under.
    pub fn set_task(&mut self, task: MentalTask) {
        self.task = task;
    }

    /// Canonical serialization: every value as 4-byte little-endian IEEE-754,
    /// in vector order. The caller owns (and must wipe) the returned buffer.
    pub fn write_le_bytes(&self, out: &mut Vec<u8>) {
        for value in &self.values {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }

    /// Inverse of [`FeatureVector::write_le_bytes`].
    pub fn from_le_bytes(bytes: &[u8], task: MentalTask, captured_at_ms: u64) -> Result<Self> {
        if bytes.len() % FEATURE_WIDTH != 0 {
            return Err(NeuroLockError::InvalidInput(format!(
                "{} bytes is not a whole number of features",
                bytes.len()
            )));
        }
        let mut values = try_with_capacity(bytes.len() / FEATURE_WIDTH)?;
        for chunk in bytes.chunks_exact(FEATURE_WIDTH) {
            values.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        Ok(Self::new(values, task, captured_at_ms))
    }
}

impl Drop for FeatureVector {
    fn drop(&mut self) {
        self.values.zeroize();
    }
}

impl fmt::Debug for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureVector")
            .field("len", &self.values.len())
            .field("task", &self.task)
            .field("captured_at_ms", &self.captured_at_ms)
            .finish_non_exhaustive()
    }
}

/// Raw multi-channel recording as produced by a capture session,
/// channel-major. Wiped on drop.
pub struct RawSample {
    pub data: Vec<f32>,
    pub num_channels: usize,
    pub sampling_rate: f32,
    pub timestamp_ms: u64,
    pub task: MentalTask,
}

impl RawSample {
    pub fn num_samples(&self) -> usize {
        if self.num_channels == 0 {
            0
        } else {
            self.data.len() / self.num_channels
        }
    }
}

impl Drop for RawSample {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

/// Element-wise arithmetic mean of the trial vectors.
///
/// Sums are accumulated in `f64`, so averaging N copies of one vector gives
/// that vector back bit for bit. No outlier rejection is performed.
pub fn average(
    trials: &[FeatureVector],
    task: MentalTask,
    captured_at_ms: u64,
) -> Result<FeatureVector> {
    let first = trials
        .first()
        .ok_or_else(|| NeuroLockError::InvalidInput("empty trial set".to_string()))?;
    let dimension = first.len();
    if dimension == 0 {
        return Err(NeuroLockError::InvalidInput(
            "trial vectors are empty".to_string(),
        ));
    }

    for (index, trial) in trials.iter().enumerate().skip(1) {
        if trial.len() != dimension {
            return Err(NeuroLockError::InvalidInput(format!(
                "trial {} has {} features, expected {}",
                index,
                trial.len(),
                dimension
            )));
        }
    }

    let count = trials.len() as f64;
    let mut values = try_with_capacity(dimension)?;
    for position in 0..dimension {
        let sum: f64 = trials
            .iter()
            .map(|trial| f64::from(trial.values[position]))
            .sum();
        values.push((sum / count) as f32);
    }

    Ok(FeatureVector::new(values, task, captured_at_ms))
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
