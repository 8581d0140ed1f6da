//! Sampling frequency of the input series.
//!
//! The user picks a unit and, for some units, a sub-parameter. The pair is
//! folded into one canonical token (`"W-3"`, `"2H"`, `"15min"`, `"M"`) and
//! into the seasonal period the decomposition algorithms need.

use std::fmt;

pub const FREQUENCY_UNITS: [&str; 9] = ["min", "H", "D", "B", "W", "M", "3M", "6M", "12M"];

pub const WEEK_DAYS: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frequency {
    Minutes(u32),
    Hours(u32),
    Daily,
    BusinessDaily,
    /// Weekly, anchored on the given end-of-week day token.
    Weekly(String),
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl Frequency {
    /// Builds a frequency from a unit already checked against [`FREQUENCY_UNITS`].
    /// The `step` is used for `min` and `H`, `end_of_week` for `W`.
    pub fn from_unit(unit: &str, step: u32, end_of_week: &str) -> Option<Self> {
        Some(match unit {
            "min" => Frequency::Minutes(step),
            "H" => Frequency::Hours(step),
            "D" => Frequency::Daily,
            "B" => Frequency::BusinessDaily,
            "W" => Frequency::Weekly(end_of_week.to_string()),
            "M" => Frequency::Monthly,
            "3M" => Frequency::Quarterly,
            "6M" => Frequency::SemiAnnual,
            "12M" => Frequency::Annual,
            _ => return None,
        })
    }

    /// Canonical frequency token.
    pub fn token(&self) -> String {
        match self {
            Frequency::Minutes(step) => format!("{step}min"),
            Frequency::Hours(step) => format!("{step}H"),
            Frequency::Daily => "D".into(),
            Frequency::BusinessDaily => "B".into(),
            Frequency::Weekly(day) => format!("W-{day}"),
            Frequency::Monthly => "M".into(),
            Frequency::Quarterly => "3M".into(),
            Frequency::SemiAnnual => "6M".into(),
            Frequency::Annual => "12M".into(),
        }
    }

    /// Observations per natural seasonal cycle: a day for sub-daily data, a
    /// week for daily data, a year for everything coarser.
    pub fn seasonal_period(&self) -> usize {
        match self {
            Frequency::Minutes(step) => (24 * 60 / (*step).max(1)) as usize,
            Frequency::Hours(step) => (24 / (*step).max(1)) as usize,
            Frequency::Daily => 7,
            Frequency::BusinessDaily => 5,
            Frequency::Weekly(_) => 52,
            Frequency::Monthly => 12,
            Frequency::Quarterly => 4,
            Frequency::SemiAnnual => 2,
            Frequency::Annual => 1,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}
