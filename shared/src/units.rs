use std::fmt;

use serde::{Deserialize, Serialize};

pub const KM_TO_MI: f64 = 0.621371;
pub const M_TO_FT: f64 = 3.28084;
pub const ZERO_PACE: &str = "0:00";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

impl UnitSystem {
    pub fn distance_unit(self) -> &'static str {
        match self {
            UnitSystem::Metric => "KM",
            UnitSystem::Imperial => "MI",
        }
    }

    pub fn pace_unit(self) -> &'static str {
        match self {
            UnitSystem::Metric => "MIN/KM",
            UnitSystem::Imperial => "MIN/MI",
        }
    }
}

pub fn km_to_mi(km: f64) -> f64 {
    km * KM_TO_MI
}

pub fn m_to_ft(m: f64) -> f64 {
    m * M_TO_FT
}

/// Distance with two decimals followed by the unit label.
pub fn format_distance(km: f64, system: UnitSystem) -> String {
    let value = match system {
        UnitSystem::Metric => km,
        UnitSystem::Imperial => km_to_mi(km),
    };
    format!("{value:.2} {}", system.distance_unit())
}

pub fn format_elevation(m: f64, system: UnitSystem) -> String {
    match system {
        UnitSystem::Metric => format!("{} M", m.round()),
        UnitSystem::Imperial => format!("{} FT", m_to_ft(m).round()),
    }
}

/// Pace given in seconds per km, rendered per km or per mile.
pub fn format_pace(seconds_per_km: Option<f64>, system: UnitSystem) -> String {
    let Some(seconds) = seconds_per_km.filter(|s| s.is_finite() && *s > 0.0) else {
        return ZERO_PACE.to_string();
    };
    let seconds = match system {
        UnitSystem::Metric => seconds,
        UnitSystem::Imperial => seconds / KM_TO_MI,
    };
    MinutesSeconds(seconds).to_string()
}

/// `h:mm:ss` above an hour, `m:ss` below.
pub fn format_elapsed(seconds: u64) -> String {
    let hrs = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hrs > 0 {
        format!("{hrs}:{mins:02}:{secs:02}")
    } else {
        format!("{mins}:{secs:02}")
    }
}

pub(crate) fn write_minutes_seconds(f: &mut fmt::Formatter<'_>, seconds: f64) -> fmt::Result {
    // round the total first so 59.6s carries into the next minute
    let total = seconds.max(0.0).round() as u64;
    write!(f, "{}:{:02}", total / 60, total % 60)
}

struct MinutesSeconds(f64);

impl fmt::Display for MinutesSeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_minutes_seconds(f, self.0)
    }
}
