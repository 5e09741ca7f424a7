//! Auto-mode nearest-string matching.

use crate::error::{Result, TunerError};
use crate::types::StringOption;

/// Catalog entry whose frequency is closest to `estimated_hz`.
///
/// Ties resolve to the earliest entry in catalog order. An empty catalog is
/// `NoMatch`; callers leave the target alone in that case.
pub fn find_closest(estimated_hz: f64, catalog: &[StringOption]) -> Result<&StringOption> {
    let mut best: Option<(&StringOption, f64)> = None;
    for option in catalog {
        let distance = (estimated_hz - option.frequency).abs();
        match best {
            Some((_, min)) if distance >= min => {}
            _ => best = Some((option, distance)),
        }
    }
    best.map(|(option, _)| option).ok_or(TunerError::NoMatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_strings() -> Vec<StringOption> {
        vec![
            StringOption::new("E", 82.41),
            StringOption::new("A", 110.00),
            StringOption::new("D", 146.83),
        ]
    }

    #[test]
    fn test_picks_nearest() {
        let cat = three_strings();
        let best = find_closest(100.0, &cat).unwrap();
        assert_eq!(best.label, "A");
        assert_eq!(best.frequency, 110.00);
    }

    #[test]
    fn test_below_and_above_catalog_range() {
        let cat = three_strings();
        assert_eq!(find_closest(20.0, &cat).unwrap().label, "E");
        assert_eq!(find_closest(5000.0, &cat).unwrap().label, "D");
    }

    #[test]
    fn test_tie_goes_to_first_entry() {
        let cat = vec![
            StringOption::new("low", 100.0),
            StringOption::new("high", 120.0),
        ];
        assert_eq!(find_closest(110.0, &cat).unwrap().label, "low");

        let reversed: Vec<_> = cat.into_iter().rev().collect();
        assert_eq!(find_closest(110.0, &reversed).unwrap().label, "high");
    }

    #[test]
    fn test_duplicate_frequencies_pick_first() {
        let cat = vec![
            StringOption::new("G (4th)", 196.0),
            StringOption::new("G (banjo 3rd)", 196.0),
        ];
        assert_eq!(find_closest(197.0, &cat).unwrap().label, "G (4th)");
    }

    #[test]
    fn test_reordering_keeps_winner() {
        let cat = three_strings();
        let mut shuffled = cat.clone();
        shuffled.swap(0, 2);
        shuffled.swap(1, 2);
        for hz in [50.0, 96.0, 100.0, 130.0, 200.0] {
            assert_eq!(
                find_closest(hz, &cat).unwrap().frequency,
                find_closest(hz, &shuffled).unwrap().frequency,
                "winner changed under reordering at {} Hz",
                hz
            );
        }
    }

    #[test]
    fn test_empty_catalog_is_no_match() {
        assert!(matches!(find_closest(110.0, &[]), Err(TunerError::NoMatch)));
    }
}
