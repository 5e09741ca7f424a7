//! The estimation service seen from the tuner: three calls and one response shape.
//!
//! ```text
//! GET /start_estimation   → acknowledgement (body ignored)
//! GET /estimate_pitch     → {"estimated_pitch": <Hz, 0 = silence>, "decibels": <dB>}
//! GET /stop_estimation    → acknowledgement (body ignored)
//! ```

use crate::error::{Result, TunerError};
use serde::{Deserialize, Serialize};

pub const START_PATH: &str = "/start_estimation";
pub const ESTIMATE_PATH: &str = "/estimate_pitch";
pub const STOP_PATH: &str = "/stop_estimation";

/// One `/estimate_pitch` response.
///
/// A missing or null `estimated_pitch` means silence, same as 0.
/// A missing or null `decibels` means the service had no level to report.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EstimateReading {
    #[serde(default)]
    pub estimated_pitch: Option<f64>,
    #[serde(default)]
    pub decibels: Option<f64>,
}

impl EstimateReading {
    pub fn new(pitch_hz: f64, decibels: f64) -> Self {
        Self {
            estimated_pitch: Some(pitch_hz),
            decibels: Some(decibels),
        }
    }

    pub fn silence(decibels: f64) -> Self {
        Self {
            estimated_pitch: Some(0.0),
            decibels: Some(decibels),
        }
    }

    /// Estimated pitch in Hz, 0.0 for silence.
    pub fn pitch_hz(&self) -> f64 {
        self.estimated_pitch.unwrap_or(0.0)
    }

    pub fn is_silent(&self) -> bool {
        self.pitch_hz() == 0.0
    }

    /// Parse and validate a response body. Anything that is not a JSON object
    /// with numeric fields, or that carries a negative or non-finite pitch,
    /// is malformed.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let reading: EstimateReading = serde_json::from_slice(body)
            .map_err(|e| TunerError::MalformedResponse(e.to_string()))?;
        reading.validate()?;
        Ok(reading)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(hz) = self.estimated_pitch {
            if !hz.is_finite() || hz < 0.0 {
                return Err(TunerError::MalformedResponse(format!(
                    "estimated_pitch out of range: {}",
                    hz
                )));
            }
        }
        if let Some(db) = self.decibels {
            if !db.is_finite() {
                return Err(TunerError::MalformedResponse(format!(
                    "decibels out of range: {}",
                    db
                )));
            }
        }
        Ok(())
    }
}

/// Remote (or simulated) pitch estimator.
///
/// Calls may block; the tuner only makes them from worker threads.
pub trait EstimationService: Send + Sync {
    /// Tell the service a session has begun.
    fn start_session(&self) -> Result<()>;

    /// Fetch the latest estimate.
    fn estimate(&self) -> Result<EstimateReading>;

    /// Tell the service the session has ended.
    fn stop_session(&self) -> Result<()>;
}
