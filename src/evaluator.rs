//! Tuning evaluation: turns one (estimated, target) pair into display facts.
//!
//! All functions here are pure. Rendering belongs to the callers.

use crate::types::*;

/// Signed difference in Hz, positive when the string is sharp.
pub fn difference(estimated_hz: f64, target_hz: f64) -> f64 {
    estimated_hz - target_hz
}

/// Silent when nothing was heard, otherwise in/out of tune against `tolerance_hz`.
/// The tolerance boundary itself counts as in tune.
pub fn classify(estimated_hz: f64, target_hz: f64, tolerance_hz: f64) -> Classification {
    if estimated_hz == 0.0 {
        return Classification::Silent;
    }
    if difference(estimated_hz, target_hz).abs() <= tolerance_hz {
        Classification::InTune
    } else {
        Classification::OutOfTune
    }
}

/// Linear map of the difference onto a view of `width`:
/// -500 Hz → 0, equal pitches → width/2, +500 Hz → width.
///
/// Differences beyond ±500 Hz land outside `[0, width]`. That is left to the
/// renderer; a marker past the edge is the expected picture for a wildly
/// wrong string.
pub fn visual_offset(estimated_hz: f64, target_hz: f64, width: f64) -> f64 {
    (difference(estimated_hz, target_hz) + OFFSET_WINDOW_HZ) / (2.0 * OFFSET_WINDOW_HZ) * width
}

/// Ordered (start, end) between the centre line and `offset`.
pub fn deviation_span(offset: f64, width: f64) -> (f64, f64) {
    let centre = width / 2.0;
    if offset < centre {
        (offset, centre)
    } else {
        (centre, offset)
    }
}

/// Evaluation parameters. `close_band_hz` enables the amber "close enough"
/// colour for out-of-tune readings within that band.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    pub tolerance_hz: f64,
    pub close_band_hz: Option<f64>,
    pub view_width: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            tolerance_hz: DEFAULT_TOLERANCE_HZ,
            close_band_hz: Some(DEFAULT_CLOSE_BAND_HZ),
            view_width: 100.0,
        }
    }
}

impl Evaluator {
    pub fn new(tolerance_hz: f64, close_band_hz: Option<f64>, view_width: f64) -> Self {
        Self {
            tolerance_hz,
            close_band_hz,
            view_width,
        }
    }

    pub fn classify(&self, estimated_hz: f64, target_hz: f64) -> Classification {
        classify(estimated_hz, target_hz, self.tolerance_hz)
    }

    pub fn color(&self, estimated_hz: f64, target_hz: f64) -> IndicatorColor {
        match self.classify(estimated_hz, target_hz) {
            Classification::Silent => IndicatorColor::Gray,
            Classification::InTune => IndicatorColor::Green,
            Classification::OutOfTune => match self.close_band_hz {
                Some(band) if difference(estimated_hz, target_hz).abs() <= band => {
                    IndicatorColor::Amber
                }
                _ => IndicatorColor::Red,
            },
        }
    }

    pub fn evaluate(&self, estimated_hz: f64, target_hz: f64) -> Evaluation {
        let classification = self.classify(estimated_hz, target_hz);
        if classification == Classification::Silent {
            return Evaluation::silent();
        }
        let offset = visual_offset(estimated_hz, target_hz, self.view_width);
        Evaluation {
            classification,
            color: self.color(estimated_hz, target_hz),
            difference_hz: Some(difference(estimated_hz, target_hz)),
            offset: Some(offset),
            span: Some(deviation_span(offset, self.view_width)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_pitch_is_silent_for_any_target() {
        for target in [0.0, 82.41, 110.0, 440.0, 10_000.0] {
            assert_eq!(classify(0.0, target, 3.0), Classification::Silent);
        }
    }

    #[test]
    fn test_tolerance_boundary_is_in_tune() {
        assert_eq!(classify(113.0, 110.0, 3.0), Classification::InTune);
        assert_eq!(classify(107.0, 110.0, 3.0), Classification::InTune);
        assert_eq!(classify(113.5, 110.0, 3.0), Classification::OutOfTune);
        assert_eq!(classify(106.0, 110.0, 3.0), Classification::OutOfTune);
    }

    #[test]
    fn test_wider_tolerance() {
        assert_eq!(classify(119.0, 110.0, 10.0), Classification::InTune);
        assert_eq!(classify(121.0, 110.0, 10.0), Classification::OutOfTune);
    }

    #[test]
    fn test_offset_centre_is_exact() {
        for (target, width) in [(82.41, 800.0), (440.0, 100.0), (0.5, 37.0)] {
            assert_eq!(visual_offset(target, target, width), width / 2.0);
        }
    }

    #[test]
    fn test_offset_window_edges_and_overflow() {
        assert_relative_eq!(visual_offset(100.0, 600.0, 800.0), 0.0);
        assert_relative_eq!(visual_offset(600.0, 100.0, 800.0), 800.0);
        // Beyond the window: not clamped
        assert!(visual_offset(1200.0, 100.0, 800.0) > 800.0);
        assert!(visual_offset(10.0, 900.0, 800.0) < 0.0);
    }

    #[test]
    fn test_offset_is_monotonic_and_linear() {
        let w = 100.0;
        let a = visual_offset(100.0, 110.0, w);
        let b = visual_offset(105.0, 110.0, w);
        let c = visual_offset(110.0, 110.0, w);
        assert!(a < b && b < c);
        assert_relative_eq!(b - a, c - b, epsilon = 1e-12);
        // 1 Hz = width / 1000
        assert_relative_eq!(visual_offset(111.0, 110.0, w) - c, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_span_is_ordered() {
        assert_eq!(deviation_span(30.0, 100.0), (30.0, 50.0));
        assert_eq!(deviation_span(80.0, 100.0), (50.0, 80.0));
        assert_eq!(deviation_span(50.0, 100.0), (50.0, 50.0));
    }

    #[test]
    fn test_colors() {
        let ev = Evaluator::default();
        assert_eq!(ev.color(0.0, 110.0), IndicatorColor::Gray);
        assert_eq!(ev.color(111.0, 110.0), IndicatorColor::Green);
        assert_eq!(ev.color(117.0, 110.0), IndicatorColor::Amber);
        assert_eq!(ev.color(130.0, 110.0), IndicatorColor::Red);

        let no_band = Evaluator::new(3.0, None, 100.0);
        assert_eq!(no_band.color(117.0, 110.0), IndicatorColor::Red);
    }

    #[test]
    fn test_evaluate_silent_has_no_geometry() {
        let e = Evaluator::default().evaluate(0.0, 110.0);
        assert_eq!(e, Evaluation::silent());
    }

    #[test]
    fn test_evaluate_out_of_tune() {
        let e = Evaluator::new(3.0, Some(10.0), 1000.0).evaluate(100.0, 110.0);
        assert_eq!(e.classification, Classification::OutOfTune);
        assert_eq!(e.color, IndicatorColor::Amber);
        assert_relative_eq!(e.difference_hz.unwrap(), -10.0);
        assert_relative_eq!(e.offset.unwrap(), 490.0);
        let (start, end) = e.span.unwrap();
        assert_relative_eq!(start, 490.0);
        assert_relative_eq!(end, 500.0);
    }
}
