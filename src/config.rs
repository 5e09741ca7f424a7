//! Tuner configuration.
//!
//! Stored as JSON; every field has a default so a partial file is fine.
//! Command-line flags are applied on top in `main`.

use crate::error::{Result, TunerError};
use crate::evaluator::Evaluator;
use crate::types::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Whether polling waits for the `/start_estimation` acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartOrdering {
    /// First tick is scheduled once the start call resolves (either way)
    AwaitAck,
    /// Start call runs detached, ticking begins immediately
    FireAndForget,
}

impl fmt::Display for StartOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartOrdering::AwaitAck => f.write_str("await-ack"),
            StartOrdering::FireAndForget => f.write_str("fire-and-forget"),
        }
    }
}

impl FromStr for StartOrdering {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s.trim().to_ascii_lowercase().as_str() {
            "await-ack" | "await" => Ok(StartOrdering::AwaitAck),
            "fire-and-forget" | "immediate" => Ok(StartOrdering::FireAndForget),
            other => Err(format!(
                "unknown start ordering {:?} (expected await-ack or fire-and-forget)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Base URL of the estimation service
    pub server_url: String,
    pub poll_interval_ms: u64,
    pub tolerance_hz: f64,
    /// Coarser "close enough" band; None disables the amber state
    pub close_band_hz: Option<f64>,
    /// Width the frame's indicator offset is expressed in (100 = percent)
    pub view_width: f64,
    pub start_ordering: StartOrdering,
    /// Send /start_estimation and /stop_estimation around a session
    pub notify_session: bool,
    /// Socket read/write timeout for each request; None waits indefinitely
    pub request_timeout_ms: Option<u64>,
    /// Ticks are skipped while this many fetches are still outstanding
    pub max_in_flight: usize,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            tolerance_hz: DEFAULT_TOLERANCE_HZ,
            close_band_hz: Some(DEFAULT_CLOSE_BAND_HZ),
            view_width: 100.0,
            start_ordering: StartOrdering::AwaitAck,
            notify_session: true,
            request_timeout_ms: None,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl TunerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: TunerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    /// Rejects values the controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |what: &str| Err(TunerError::InvalidConfig(what.to_string()));
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be > 0");
        }
        if !(self.tolerance_hz.is_finite() && self.tolerance_hz >= 0.0) {
            return invalid("tolerance_hz must be a non-negative number");
        }
        if let Some(band) = self.close_band_hz {
            if !(band.is_finite() && band >= 0.0) {
                return invalid("close_band_hz must be a non-negative number");
            }
        }
        if self.max_in_flight == 0 {
            return invalid("max_in_flight must be > 0");
        }
        if !(self.view_width.is_finite() && self.view_width > 0.0) {
            return invalid("view_width must be > 0");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.tolerance_hz, self.close_band_hz, self.view_width)
    }
}
