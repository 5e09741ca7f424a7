use crate::catalog::{Catalog, Instrument};
use crate::error::TunerError;
use crate::estimation::EstimateReading;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ─── Catalog entries ────────────────────────────────────────────────────────

/// One selectable string: a display label and its open-string frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringOption {
    pub label: String,
    /// Open-string frequency in Hz
    pub frequency: f64,
}

impl StringOption {
    pub fn new(label: impl Into<String>, frequency: f64) -> Self {
        Self {
            label: label.into(),
            frequency,
        }
    }
}

impl fmt::Display for StringOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {:.2} Hz", self.label, self.frequency)
    }
}

// ─── Evaluation ─────────────────────────────────────────────────────────────

/// Tuning accuracy of one reading against the target.
/// Serializes as plain strings ("Silent", "InTune", "OutOfTune").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Classification {
    /// No signal (estimated pitch is 0 or absent)
    Silent,
    /// Within the tolerance of the target
    InTune,
    OutOfTune,
}

/// Indicator colour derived from the classification and the close band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IndicatorColor {
    Gray,
    Green,
    /// Out of tune, but inside the coarser "close enough" band
    Amber,
    Red,
}

/// Everything the indicator needs to draw one reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub classification: Classification,
    pub color: IndicatorColor,
    /// estimated - target, Hz. None when silent.
    pub difference_hz: Option<f64>,
    /// Marker position along the view, 0..width for ±500 Hz. None when silent.
    pub offset: Option<f64>,
    /// Ordered interval between the centre line and the marker. None when silent.
    pub span: Option<(f64, f64)>,
}

impl Evaluation {
    pub fn silent() -> Self {
        Self {
            classification: Classification::Silent,
            color: IndicatorColor::Gray,
            difference_hz: None,
            offset: None,
            span: None,
        }
    }
}

// ─── Published snapshot ─────────────────────────────────────────────────────

/// Complete display state at a moment in time.
/// Produced by the controller after every change, consumed by displays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunerFrame {
    pub timestamp_us: u64,
    pub estimating: bool,
    pub auto_mode: bool,
    pub instrument: String,
    pub target_pitch_hz: f64,
    /// Catalog label the target came from; None for a custom pitch
    pub target_label: Option<String>,
    /// None = silence, or no data while stopped
    pub estimated_pitch_hz: Option<f64>,
    pub decibels: Option<f64>,
    /// None while stopped
    pub evaluation: Option<Evaluation>,
}

impl fmt::Display for TunerFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let est = match self.estimated_pitch_hz {
            Some(hz) => format!("{:.2}", hz),
            None => "-".to_string(),
        };
        let db = match self.decibels {
            Some(db) => format!("{:.2}", db),
            None => "-".to_string(),
        };
        let cls = match self.evaluation.map(|e| e.classification) {
            Some(Classification::Silent) => "silent",
            Some(Classification::InTune) => "in-tune",
            Some(Classification::OutOfTune) => "out",
            None => "---",
        };
        write!(
            f,
            "t={:>10}µs  target={:.2}Hz [{}]  est={}Hz  dB={}  {}{}",
            self.timestamp_us,
            self.target_pitch_hz,
            self.target_label.as_deref().unwrap_or("custom"),
            est,
            db,
            cls,
            if self.auto_mode { "  AUTO" } else { "" },
        )
    }
}

// ─── Controller messages ────────────────────────────────────────────────────

/// Everything the controller reacts to: user commands and fetch results.
#[derive(Debug)]
pub enum ControlEvent {
    Start,
    Stop,
    SetAutoMode(bool),
    /// 0-based catalog index
    SelectString(usize),
    SelectStringLabel(String),
    /// Raw user text, validated by the controller
    SetCustomPitch(String),
    SetInstrument(Instrument),
    SetCatalog(Catalog),
    /// Re-publish the current frame
    Refresh,
    /// Result of one poll tick, tagged with the session that dispatched it
    Estimate {
        session: u64,
        result: Result<EstimateReading, TunerError>,
    },
    Shutdown,
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for frame timestamps.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

/// Poll cadence of the estimation endpoint.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
/// Maximum |estimated - target| still considered in tune.
pub const DEFAULT_TOLERANCE_HZ: f64 = 3.0;
/// Coarser "close enough" band.
pub const DEFAULT_CLOSE_BAND_HZ: f64 = 10.0;
/// Estimate fetches allowed to be outstanding at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;
/// Half-width of the indicator window: ±500 Hz maps onto the full view.
pub const OFFSET_WINDOW_HZ: f64 = 500.0;
