use crate::catalog::{Catalog, Instrument};
use crate::config::{StartOrdering, TunerConfig};
use crate::error::{Result, TunerError};
use crate::estimation::{EstimateReading, EstimationService};
use crate::evaluator::Evaluator;
use crate::matcher::find_closest;
use crate::poll_loop::{self, PollHandle, PollOptions};
use crate::types::*;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, info, trace, warn};
use std::sync::Arc;

/// Mutable tuner state. Only the controller thread touches it.
pub struct TunerState {
    pub target_pitch: f64,
    pub target_label: Option<String>,
    /// Last estimate in Hz, 0.0 = silence
    pub estimated_pitch: f64,
    pub decibels: Option<f64>,
    /// False while stopped: readouts show "no data" rather than silence
    pub has_reading: bool,
    pub auto_mode: bool,
    /// Active poll loop; present exactly while estimating
    poll: Option<PollHandle>,
}

impl TunerState {
    fn new() -> Self {
        Self {
            target_pitch: 0.0,
            target_label: None,
            estimated_pitch: 0.0,
            decibels: None,
            has_reading: false,
            auto_mode: false,
            poll: None,
        }
    }

    pub fn is_estimating(&self) -> bool {
        self.poll.is_some()
    }

    fn clear_readings(&mut self) {
        self.estimated_pitch = 0.0;
        self.decibels = None;
        self.has_reading = false;
    }
}

/// The tuner's single point of control.
///
/// Receives `ControlEvent`s (user commands and poll results) on one channel,
/// applies them to `TunerState` in arrival order, and publishes a
/// `TunerFrame` to every consumer after each change.
///
/// # Session tagging
///
/// Each `start()` opens a new session id and the poll loop tags every result
/// with it. A result is applied only if the tuner is still estimating *and*
/// the tag matches the current session, so responses that land after `stop()`
/// (or after a stop/start cycle) are dropped.
///
/// # Auto mode
///
/// With auto mode on, every non-silent reading first retargets to the closest
/// catalog string, then the frame is evaluated against that new target.
/// Manual selection and custom pitches are refused while it is on.
pub struct TunerController {
    config: TunerConfig,
    evaluator: Evaluator,
    catalog: Catalog,
    service: Arc<dyn EstimationService>,
    /// Handed to poll loops so results come back through `run()`
    event_tx: Sender<ControlEvent>,
    frame_txs: Vec<Sender<TunerFrame>>,
    clock: SessionClock,
    state: TunerState,
    session: u64,
    applied: u64,
    missed: u64,
    discarded: u64,
}

impl TunerController {
    pub fn new(
        config: TunerConfig,
        catalog: Catalog,
        service: Arc<dyn EstimationService>,
        event_tx: Sender<ControlEvent>,
        frame_txs: Vec<Sender<TunerFrame>>,
    ) -> Self {
        let mut state = TunerState::new();
        if let Some(first) = catalog.get(0) {
            state.target_pitch = first.frequency;
            state.target_label = Some(first.label.clone());
        }
        Self {
            evaluator: config.evaluator(),
            config,
            catalog,
            service,
            event_tx,
            frame_txs,
            clock: SessionClock::new(),
            state,
            session: 0,
            applied: 0,
            missed: 0,
            discarded: 0,
        }
    }

    pub fn with_auto_mode(mut self, enabled: bool) -> Self {
        self.state.auto_mode = enabled;
        self
    }

    pub fn state(&self) -> &TunerState {
        &self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn is_estimating(&self) -> bool {
        self.state.is_estimating()
    }

    /// Id of the current (or most recent) estimation session.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// (applied, missed, discarded) estimate counts since creation.
    pub fn counters(&self) -> (u64, u64, u64) {
        (self.applied, self.missed, self.discarded)
    }

    /// Process events until `Shutdown` or until every sender is gone.
    pub fn run(&mut self, events: &Receiver<ControlEvent>) {
        info!(
            "Tuner controller running ({} catalog, tolerance {} Hz, {} start)",
            self.catalog.name, self.config.tolerance_hz, self.config.start_ordering
        );
        self.publish();

        for event in events.iter() {
            if !self.handle(event) {
                break;
            }
        }

        self.stop();
        info!(
            "Tuner controller shutting down ({} applied, {} missed, {} discarded)",
            self.applied, self.missed, self.discarded
        );
    }

    /// Apply one event. Returns false on `Shutdown`.
    pub fn handle(&mut self, event: ControlEvent) -> bool {
        let outcome = match event {
            ControlEvent::Start => self.start(),
            ControlEvent::Stop => {
                self.stop();
                Ok(())
            }
            ControlEvent::SetAutoMode(on) => {
                self.set_auto_mode(on);
                Ok(())
            }
            ControlEvent::SelectString(index) => self.select_string(index),
            ControlEvent::SelectStringLabel(label) => self.select_string_label(&label),
            ControlEvent::SetCustomPitch(input) => self.set_custom_pitch(&input),
            ControlEvent::SetInstrument(instrument) => {
                self.set_instrument(instrument);
                Ok(())
            }
            ControlEvent::SetCatalog(catalog) => {
                self.set_catalog(catalog);
                Ok(())
            }
            ControlEvent::Refresh => {
                self.publish();
                Ok(())
            }
            ControlEvent::Estimate { session, result } => {
                self.apply_estimate(session, result);
                Ok(())
            }
            ControlEvent::Shutdown => return false,
        };
        // User input errors leave state as it was; nothing to surface
        if let Err(e) = outcome {
            warn!("Ignored: {}", e);
        }
        true
    }

    // ─── Poll loop lifecycle ────────────────────────────────────────────

    /// Begin estimating. No-op if already running.
    pub fn start(&mut self) -> Result<()> {
        if self.state.is_estimating() {
            debug!("start: already estimating (session {})", self.session);
            return Ok(());
        }

        self.session += 1;
        let await_ack =
            self.config.notify_session && self.config.start_ordering == StartOrdering::AwaitAck;
        if self.config.notify_session && !await_ack {
            poll_loop::notify_start(&self.service);
        }

        let handle = poll_loop::spawn(
            self.service.clone(),
            self.event_tx.clone(),
            self.session,
            PollOptions {
                interval: self.config.poll_interval(),
                await_start_ack: await_ack,
                max_in_flight: self.config.max_in_flight,
            },
        )?;
        self.state.poll = Some(handle);
        self.state.clear_readings();
        info!("Estimation started (session {})", self.session);
        self.publish();
        Ok(())
    }

    /// Stop estimating. No-op if not running.
    pub fn stop(&mut self) {
        let Some(handle) = self.state.poll.take() else {
            debug!("stop: not estimating");
            return;
        };
        handle.cancel();
        if self.config.notify_session {
            poll_loop::notify_stop(&self.service);
        }
        self.state.clear_readings();
        info!("Estimation stopped (session {})", self.session);
        self.publish();
    }

    /// Apply one poll result if it belongs to the live session.
    /// Returns true if state changed.
    pub fn apply_estimate(&mut self, session: u64, result: Result<EstimateReading>) -> bool {
        if !self.state.is_estimating() || session != self.session {
            self.discarded += 1;
            trace!(
                "Discarding estimate from session {} (current {}, estimating: {})",
                session,
                self.session,
                self.state.is_estimating()
            );
            return false;
        }

        let reading = match result.and_then(|r| r.validate().map(|()| r)) {
            Ok(r) => r,
            Err(e) => {
                self.missed += 1;
                debug!("Missed tick: {}", e);
                return false;
            }
        };

        let pitch = reading.pitch_hz();
        self.state.estimated_pitch = pitch;
        self.state.decibels = reading.decibels;
        self.state.has_reading = true;

        if self.state.auto_mode && pitch > 0.0 {
            self.auto_match(pitch);
        }

        self.applied += 1;
        if self.applied % 100 == 0 {
            debug!(
                "{} estimates applied ({} missed, {} discarded)",
                self.applied, self.missed, self.discarded
            );
        }
        self.publish();
        true
    }

    fn auto_match(&mut self, pitch: f64) {
        match find_closest(pitch, &self.catalog.strings) {
            Ok(best) => {
                if best.frequency != self.state.target_pitch
                    || self.state.target_label.as_deref() != Some(best.label.as_str())
                {
                    debug!("Auto: {:.2} Hz → {}", pitch, best);
                }
                self.state.target_pitch = best.frequency;
                self.state.target_label = Some(best.label.clone());
            }
            Err(TunerError::NoMatch) => {
                debug!("Auto: empty catalog, target unchanged");
            }
            Err(e) => warn!("Auto: {}", e),
        }
    }

    // ─── Target selection ───────────────────────────────────────────────

    pub fn set_auto_mode(&mut self, enabled: bool) {
        if self.state.auto_mode != enabled {
            info!("Auto mode {}", if enabled { "ON" } else { "OFF" });
        }
        self.state.auto_mode = enabled;
        self.publish();
    }

    /// Target the catalog string at `index` (0-based).
    pub fn select_string(&mut self, index: usize) -> Result<()> {
        if self.state.auto_mode {
            return Err(TunerError::AutoModeActive);
        }
        let option = self
            .catalog
            .get(index)
            .cloned()
            .ok_or_else(|| TunerError::UnknownString(format!("#{}", index + 1)))?;
        self.set_target(option);
        Ok(())
    }

    pub fn select_string_label(&mut self, label: &str) -> Result<()> {
        if self.state.auto_mode {
            return Err(TunerError::AutoModeActive);
        }
        let option = self
            .catalog
            .find_label(label)
            .cloned()
            .ok_or_else(|| TunerError::UnknownString(label.to_string()))?;
        self.set_target(option);
        Ok(())
    }

    /// Target an arbitrary frequency typed by the user. Anything that is
    /// not a finite, non-negative number is refused and the target kept.
    pub fn set_custom_pitch(&mut self, input: &str) -> Result<()> {
        if self.state.auto_mode {
            return Err(TunerError::AutoModeActive);
        }
        let hz = parse_pitch(input)?;
        self.state.target_pitch = hz;
        self.state.target_label = None;
        info!("Target: {:.2} Hz (custom)", hz);
        self.publish();
        Ok(())
    }

    pub fn set_instrument(&mut self, instrument: Instrument) {
        self.set_catalog(instrument.catalog());
    }

    /// Swap the catalog. Outside auto mode the target moves to its first string.
    pub fn set_catalog(&mut self, catalog: Catalog) {
        info!("Catalog: {} ({} strings)", catalog.name, catalog.len());
        self.catalog = catalog;
        if !self.state.auto_mode {
            if let Some(first) = self.catalog.get(0).cloned() {
                self.set_target(first);
                return;
            }
        }
        self.publish();
    }

    fn set_target(&mut self, option: StringOption) {
        info!("Target: {}", option);
        self.state.target_pitch = option.frequency;
        self.state.target_label = Some(option.label);
        self.publish();
    }

    // ─── Output ─────────────────────────────────────────────────────────

    /// Snapshot of what the displays should show right now.
    pub fn frame(&self) -> TunerFrame {
        let estimating = self.state.is_estimating();
        let live = estimating && self.state.has_reading;
        let estimated = self.state.estimated_pitch;
        TunerFrame {
            timestamp_us: self.clock.now_us(),
            estimating,
            auto_mode: self.state.auto_mode,
            instrument: self.catalog.name.clone(),
            target_pitch_hz: self.state.target_pitch,
            target_label: self.state.target_label.clone(),
            estimated_pitch_hz: if live && estimated > 0.0 {
                Some(estimated)
            } else {
                None
            },
            decibels: if live { self.state.decibels } else { None },
            evaluation: if live {
                Some(self.evaluator.evaluate(estimated, self.state.target_pitch))
            } else {
                None
            },
        }
    }

    fn publish(&self) {
        let frame = self.frame();
        trace!("{}", frame);
        for tx in &self.frame_txs {
            let _ = tx.send(frame.clone());
        }
    }
}

/// Parse user-entered pitch text.
pub fn parse_pitch(input: &str) -> Result<f64> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_suffix("Hz")
        .or_else(|| trimmed.strip_suffix("hz"))
        .unwrap_or(trimmed)
        .trim();
    match trimmed.parse::<f64>() {
        Ok(hz) if hz.is_finite() && hz >= 0.0 => Ok(hz),
        _ => Err(TunerError::InvalidPitch(input.to_string())),
    }
}
