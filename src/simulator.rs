use crate::error::Result;
use crate::estimation::{EstimateReading, EstimationService};
use crate::types::*;
use log::info;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Length of one string's segment in the demo script.
const SEGMENT_MS: u64 = 5000;
/// Silence at the start of each segment, before the string is plucked.
const GAP_MS: u64 = 1000;
/// Initial detune as a fraction of the string frequency.
const DETUNE: f64 = 0.04;
/// Seconds for the detune to decay by 1/e (the player tightening the peg).
const SETTLE_S: f64 = 0.9;
const SILENCE_DB: f64 = -70.0;

/// Stands in for the estimation service so the tuner runs with no backend.
///
/// Plays a script over the catalog: for each string a short silence, then a
/// pluck that starts sharp or flat (alternating) and settles onto the string
/// frequency with a little vibrato, loudness decaying as it rings. The script
/// loops. Optional latency jitter makes responses finish out of order, like a
/// busy backend would.
pub struct SimulatedEstimator {
    strings: Vec<StringOption>,
    clock: Mutex<SessionClock>,
    requests: AtomicU64,
    max_latency: Duration,
}

impl SimulatedEstimator {
    pub fn new(strings: Vec<StringOption>) -> Self {
        Self {
            strings,
            clock: Mutex::new(SessionClock::new()),
            requests: AtomicU64::new(0),
            max_latency: Duration::ZERO,
        }
    }

    /// Each request sleeps a deterministic 0..=`max` before answering.
    pub fn with_latency_jitter(mut self, max: Duration) -> Self {
        self.max_latency = max;
        self
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// What the script reports `elapsed` into a session.
    pub fn reading_at(&self, elapsed: Duration) -> EstimateReading {
        if self.strings.is_empty() {
            return EstimateReading::silence(SILENCE_DB);
        }
        let ms = elapsed.as_millis() as u64;
        let segment = (ms / SEGMENT_MS) as usize;
        let within = ms % SEGMENT_MS;
        if within < GAP_MS {
            return EstimateReading::silence(SILENCE_DB);
        }

        let target = self.strings[segment % self.strings.len()].frequency;
        let t = (within - GAP_MS) as f64 / 1000.0;
        let sign = if segment % 2 == 0 { 1.0 } else { -1.0 };
        let detune = sign * DETUNE * target * (-t / SETTLE_S).exp();
        let vibrato = 0.3 * (2.0 * PI * 5.0 * t).sin();
        let decibels = -18.0 - 3.0 * t;
        EstimateReading::new((target + detune + vibrato).max(1.0), decibels)
    }

    fn latency_for(&self, request: u64) -> Duration {
        if self.max_latency.is_zero() {
            return Duration::ZERO;
        }
        // 0..=10 tenths, scrambled so consecutive requests differ
        let tenths = (request * 7 + 3) % 11;
        self.max_latency * tenths as u32 / 10
    }

    fn elapsed(&self) -> Duration {
        let clock = self.clock.lock().unwrap_or_else(|p| p.into_inner());
        Duration::from_micros(clock.now_us())
    }
}

impl EstimationService for SimulatedEstimator {
    fn start_session(&self) -> Result<()> {
        let mut clock = self.clock.lock().unwrap_or_else(|p| p.into_inner());
        *clock = SessionClock::new();
        info!("Simulator: session started ({} strings in script)", self.strings.len());
        Ok(())
    }

    fn estimate(&self) -> Result<EstimateReading> {
        let n = self.requests.fetch_add(1, Ordering::Relaxed);
        let reading = self.reading_at(self.elapsed());
        let delay = self.latency_for(n);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok(reading)
    }

    fn stop_session(&self) -> Result<()> {
        info!("Simulator: session stopped after {} requests", self.requests());
        Ok(())
    }
}
