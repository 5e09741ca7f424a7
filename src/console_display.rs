use crate::evaluator::{deviation_span, visual_offset};
use crate::types::*;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Character width of the tuning meter.
const METER_WIDTH: usize = 51;

/// Renders a live dashboard of the tuner state.
pub struct ConsoleDisplay {
    rx: Receiver<TunerFrame>,
    update_hz: u32,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<TunerFrame>, update_hz: u32) -> Self {
        Self { rx, update_hz }
    }

    pub fn run(&self) {
        let mut stdout = io::stdout();
        self.run_with(|frame| {
            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H");
            print!("{}", render(frame));
            let _ = stdout.flush();
        });
    }

    /// Throttled draw loop. Frames arriving faster than the refresh rate are
    /// coalesced: the newest one is held and drawn once the interval has
    /// passed, so the last state is always shown. Frames that stop the
    /// session are drawn immediately.
    pub fn run_with<F: FnMut(&TunerFrame)>(&self, mut draw: F) {
        let min_interval = if self.update_hz == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis((1000 / self.update_hz as u64).max(1))
        };
        let mut last_draw: Option<Instant> = None;
        let mut pending: Option<TunerFrame> = None;

        loop {
            let frame = match pending.take() {
                Some(held) => {
                    let wait = last_draw
                        .map(|t| min_interval.saturating_sub(t.elapsed()))
                        .unwrap_or(Duration::ZERO);
                    match self.rx.recv_timeout(wait) {
                        // Newer state supersedes the held frame
                        Ok(frame) => frame,
                        Err(RecvTimeoutError::Timeout) => {
                            last_draw = Some(Instant::now());
                            draw(&held);
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            draw(&held);
                            return;
                        }
                    }
                }
                None => match self.rx.recv() {
                    Ok(frame) => frame,
                    Err(_) => return,
                },
            };

            let due = last_draw.is_none_or(|t| t.elapsed() >= min_interval);
            if due || !frame.estimating {
                last_draw = Some(Instant::now());
                draw(&frame);
            } else {
                pending = Some(frame);
            }
        }
    }
}

/// The full dashboard for one frame.
pub fn render(frame: &TunerFrame) -> String {
    let mut out = String::new();
    let line = |out: &mut String, text: String| {
        out.push_str(&format!("║  {:<56}║\n", text));
    };

    out.push_str("╔══════════════════════════════════════════════════════════╗\n");
    line(&mut out, format!("STRING TUNER · {}", frame.instrument));
    out.push_str("╠══════════════════════════════════════════════════════════╣\n");

    let target = match &frame.target_label {
        Some(label) => format!("Target Pitch: {:.2} Hz ({})", frame.target_pitch_hz, label),
        None => format!("Target Pitch: {:.2} Hz (custom)", frame.target_pitch_hz),
    };
    line(&mut out, target);
    line(&mut out, format!("Estimated Pitch: {}", hz_label(frame.estimated_pitch_hz)));
    line(&mut out, format!("Decibel Rating: {}", db_label(frame.decibels)));
    line(&mut out, String::new());

    match frame.evaluation {
        Some(ev) => {
            line(&mut out, format!("{}  {}", color_block(ev.color), status_text(&ev)));
            let (marker, span) = match ev.difference_hz {
                Some(_) => {
                    let est = frame.estimated_pitch_hz.unwrap_or(0.0);
                    let w = (METER_WIDTH - 1) as f64;
                    let offset = visual_offset(est, frame.target_pitch_hz, w);
                    (Some(offset), Some(deviation_span(offset, w)))
                }
                None => (None, None),
            };
            line(&mut out, make_meter(marker, span, METER_WIDTH));
        }
        None if frame.estimating => {
            line(&mut out, "-- (waiting for data)".to_string());
            line(&mut out, make_meter(None, None, METER_WIDTH));
        }
        None => {
            line(&mut out, "-- (stopped)".to_string());
            line(&mut out, make_meter(None, None, METER_WIDTH));
        }
    }

    line(&mut out, String::new());
    let mode = if frame.auto_mode { "AUTO" } else { "manual" };
    let run = if frame.estimating { "estimating" } else { "idle" };
    line(&mut out, format!("Mode: {:<8} State: {}", mode, run));
    out.push_str("╚══════════════════════════════════════════════════════════╝\n");
    out.push_str("start | stop | auto on|off | string <n|label> | custom <hz>\n");
    out.push_str("instrument <name> | status | quit\n> ");
    out
}

fn hz_label(hz: Option<f64>) -> String {
    match hz {
        Some(hz) => format!("{:.2} Hz", hz),
        None => "-".to_string(),
    }
}

fn db_label(db: Option<f64>) -> String {
    match db {
        Some(db) => format!("{:.2} dB", db),
        None => "-".to_string(),
    }
}

fn status_text(ev: &Evaluation) -> String {
    match (ev.classification, ev.difference_hz) {
        (Classification::Silent, _) => "no signal".to_string(),
        (Classification::InTune, Some(d)) => format!("IN TUNE ({:+.2} Hz)", d),
        (Classification::OutOfTune, Some(d)) if d > 0.0 => format!("sharp by {:.2} Hz", d),
        (Classification::OutOfTune, Some(d)) => format!("flat by {:.2} Hz", -d),
        (_, None) => "-".to_string(),
    }
}

fn color_block(color: IndicatorColor) -> &'static str {
    match color {
        IndicatorColor::Gray => "\x1b[90m■\x1b[0m",
        IndicatorColor::Green => "\x1b[32m■\x1b[0m",
        IndicatorColor::Amber => "\x1b[33m■\x1b[0m",
        IndicatorColor::Red => "\x1b[31m■\x1b[0m",
    }
}

/// `[·····│·····]` with the deviation shaded and the marker drawn.
/// A marker beyond the window is pinned to the edge as an arrow.
fn make_meter(marker: Option<f64>, span: Option<(f64, f64)>, width: usize) -> String {
    let centre = width / 2;
    let mut cells: Vec<char> = (0..width)
        .map(|i| if i == centre { '│' } else { '·' })
        .collect();

    if let Some((start, end)) = span {
        let lo = start.round().max(0.0) as usize;
        let hi = (end.round().max(0.0) as usize).min(width - 1);
        for cell in cells.iter_mut().take(hi + 1).skip(lo) {
            if *cell == '·' {
                *cell = '░';
            }
        }
    }

    if let Some(pos) = marker {
        let last = (width - 1) as f64;
        if pos < 0.0 {
            cells[0] = '◀';
        } else if pos > last {
            cells[width - 1] = '▶';
        } else {
            cells[pos.round() as usize] = '▼';
        }
    }

    format!("[{}]", cells.into_iter().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::thread;

    fn frame(est: Option<f64>, evaluation: Option<Evaluation>) -> TunerFrame {
        TunerFrame {
            timestamp_us: 0,
            estimating: evaluation.is_some(),
            auto_mode: false,
            instrument: "guitar".into(),
            target_pitch_hz: 110.0,
            target_label: Some("A".into()),
            estimated_pitch_hz: est,
            decibels: est.map(|_| -20.0),
            evaluation,
        }
    }

    #[test]
    fn test_meter_centre_marker() {
        let m = make_meter(Some(25.0), Some((25.0, 25.0)), 51);
        assert_eq!(m.chars().nth(26), Some('▼'));
        assert_eq!(m.chars().count(), 53);
    }

    #[test]
    fn test_meter_overflow_pins_to_edge() {
        assert_eq!(make_meter(Some(-3.0), None, 11).chars().nth(1), Some('◀'));
        assert_eq!(make_meter(Some(99.0), None, 11).chars().nth(11), Some('▶'));
    }

    #[test]
    fn test_meter_shades_span() {
        let m: Vec<char> = make_meter(Some(2.0), Some((2.0, 5.0)), 11).chars().collect();
        // m[0] is '[', cell i is m[i + 1]
        assert_eq!(m[3], '▼');
        assert_eq!(m[4], '░');
        assert_eq!(m[6], '│');
        assert_eq!(m[8], '·');
    }

    #[test]
    fn test_render_idle_shows_dashes() {
        let out = render(&frame(None, None));
        assert!(out.contains("Estimated Pitch: -"));
        assert!(out.contains("Decibel Rating: -"));
        assert!(out.contains("Target Pitch: 110.00 Hz (A)"));
    }

    #[test]
    fn test_render_started_without_reading_is_waiting() {
        let mut f = frame(None, None);
        f.estimating = true;
        let out = render(&f);
        assert!(out.contains("waiting for data"));
        assert!(!out.contains("stopped"));
        assert!(render(&frame(None, None)).contains("-- (stopped)"));
    }

    #[test]
    fn test_throttle_draws_latest_held_frame() {
        let (tx, rx) = unbounded();
        let live = |auto_mode: bool| {
            let ev = crate::evaluator::Evaluator::default().evaluate(110.0, 110.0);
            let mut f = frame(Some(110.0), Some(ev));
            f.auto_mode = auto_mode;
            f
        };
        tx.send(live(false)).unwrap();
        tx.send(live(false)).unwrap();
        // A user change right after a reading, with no poll frame behind it
        tx.send(live(true)).unwrap();
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(400));
            drop(tx);
        });

        let mut drawn = Vec::new();
        ConsoleDisplay::new(rx, 10).run_with(|f| drawn.push((Instant::now(), f.auto_mode)));
        sender.join().unwrap();

        assert_eq!(drawn.len(), 2, "first frame drawn, the rest coalesced");
        assert!(!drawn[0].1);
        assert!(drawn[1].1, "the newest frame is the one shown");
        // Drawn after the interval, not held until the channel closed
        assert!(drawn[1].0.duration_since(drawn[0].0) < Duration::from_millis(300));
    }

    #[test]
    fn test_throttle_never_holds_stop_frames() {
        let (tx, rx) = unbounded();
        let ev = crate::evaluator::Evaluator::default().evaluate(110.0, 110.0);
        tx.send(frame(Some(110.0), Some(ev))).unwrap();
        tx.send(frame(None, None)).unwrap();
        drop(tx);
        let mut drawn = Vec::new();
        ConsoleDisplay::new(rx, 1).run_with(|f| drawn.push(f.estimating));
        assert_eq!(drawn, vec![true, false]);
    }

    #[test]
    fn test_render_flat_reading() {
        let ev = crate::evaluator::Evaluator::default().evaluate(104.0, 110.0);
        let out = render(&frame(Some(104.0), Some(ev)));
        assert!(out.contains("Estimated Pitch: 104.00 Hz"));
        assert!(out.contains("flat by 6.00 Hz"));
    }
}
