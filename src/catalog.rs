//! String catalogs: the selectable strings per instrument.
//!
//! The built-in tables list strings in the order the instrument's dropdown
//! shows them. A catalog can also be loaded from JSON, either a bare array of
//! `{"label", "frequency"}` entries or `{"name", "strings": [...]}`.

use crate::error::{Result, TunerError};
use crate::types::StringOption;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub name: String,
    pub strings: Vec<StringOption>,
}

impl Catalog {
    pub fn new(name: impl Into<String>, strings: Vec<StringOption>) -> Self {
        Self {
            name: name.into(),
            strings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn get(&self, index: usize) -> Option<&StringOption> {
        self.strings.get(index)
    }

    /// First entry whose label matches, ignoring case.
    pub fn find_label(&self, label: &str) -> Option<&StringOption> {
        self.strings
            .iter()
            .find(|s| s.label.eq_ignore_ascii_case(label))
    }

    /// Every string needs a positive, finite frequency: 0 Hz means silence
    /// and could never be matched against.
    pub fn validate(&self) -> Result<()> {
        for s in &self.strings {
            if !(s.frequency.is_finite() && s.frequency > 0.0) {
                return Err(TunerError::InvalidConfig(format!(
                    "catalog {:?}: string {:?} has frequency {}",
                    self.name, s.label, s.frequency
                )));
            }
        }
        Ok(())
    }

    /// Load from a JSON file. Accepts a full catalog object or a bare array,
    /// in which case the file stem becomes the name.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let catalog = match serde_json::from_str::<Catalog>(&data) {
            Ok(c) => c,
            Err(_) => {
                let strings: Vec<StringOption> = serde_json::from_str(&data)?;
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "custom".to_string());
                Catalog::new(name, strings)
            }
        };
        catalog.validate()?;
        info!(
            "Loaded catalog {:?} ({} strings) from {:?}",
            catalog.name,
            catalog.len(),
            path
        );
        Ok(catalog)
    }
}

/// Instruments with a built-in catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instrument {
    Guitar,
    Banjo,
    Ukulele,
    Violin,
}

impl Instrument {
    pub const ALL: [Instrument; 4] = [
        Instrument::Guitar,
        Instrument::Banjo,
        Instrument::Ukulele,
        Instrument::Violin,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Instrument::Guitar => "guitar",
            Instrument::Banjo => "banjo",
            Instrument::Ukulele => "ukulele",
            Instrument::Violin => "violin",
        }
    }

    pub fn catalog(&self) -> Catalog {
        match self {
            Instrument::Guitar => guitar_standard(),
            Instrument::Banjo => banjo_open_g(),
            Instrument::Ukulele => ukulele_standard(),
            Instrument::Violin => violin_standard(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Instrument {
    type Err = TunerError;

    fn from_str(s: &str) -> Result<Self> {
        Instrument::ALL
            .into_iter()
            .find(|i| i.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TunerError::UnknownInstrument(s.to_string()))
    }
}

/// Standard guitar tuning, low E to high E.
pub fn guitar_standard() -> Catalog {
    Catalog::new(
        "guitar",
        vec![
            StringOption::new("E", 82.41),
            StringOption::new("A", 110.00),
            StringOption::new("D", 146.83),
            StringOption::new("G", 196.00),
            StringOption::new("B", 246.94),
            StringOption::new("E", 329.63),
        ],
    )
}

/// 5-string banjo, open G, 1st string first.
pub fn banjo_open_g() -> Catalog {
    Catalog::new(
        "banjo",
        vec![
            StringOption::new("D", 294.0),
            StringOption::new("B", 248.0),
            StringOption::new("G", 196.0),
            StringOption::new("D", 147.0),
            StringOption::new("G", 98.0),
        ],
    )
}

/// Re-entrant GCEA; the G is the high G4.
pub fn ukulele_standard() -> Catalog {
    Catalog::new(
        "ukulele",
        vec![
            StringOption::new("A", 440.0),
            StringOption::new("E", 329.63),
            StringOption::new("C", 261.63),
            StringOption::new("G", 392.0),
        ],
    )
}

pub fn violin_standard() -> Catalog {
    Catalog::new(
        "violin",
        vec![
            StringOption::new("G", 196.0),
            StringOption::new("D", 293.66),
            StringOption::new("A", 440.0),
            StringOption::new("E", 659.25),
        ],
    )
}
