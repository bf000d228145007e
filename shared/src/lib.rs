use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod units;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Finite and inside the WGS84 degree ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Moderate,
    Hard,
}

/// A planned route a runner can follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub path: Vec<Coordinate>,
    /// Always stored in km.
    pub distance_km: f64,
    /// Always stored in meters.
    #[serde(default)]
    pub elevation_gain_m: f64,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationStep {
    pub instruction: String,
    pub location: Coordinate,
    pub distance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub id: String,
    pub location: Coordinate,
    pub label: String,
}

/// Average pace in minutes per kilometre.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pace(pub f64);

impl Pace {
    /// `None` when no distance has been covered yet.
    pub fn from_elapsed(elapsed_seconds: u64, distance_km: f64) -> Option<Self> {
        if distance_km <= 0.0 || !distance_km.is_finite() {
            return None;
        }
        let minutes = elapsed_seconds as f64 / 60.0;
        Some(Self(minutes / distance_km))
    }

    pub fn minutes_per_km(self) -> f64 {
        self.0
    }

    pub fn seconds_per_km(self) -> f64 {
        self.0 * 60.0
    }
}

impl fmt::Display for Pace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        units::write_minutes_seconds(f, self.seconds_per_km())
    }
}

/// Renders an optional pace, using `0:00` when there is none.
pub fn display_pace(pace: Option<Pace>) -> String {
    pace.map(|p| p.to_string())
        .unwrap_or_else(|| units::ZERO_PACE.to_string())
}

/// A finished run, produced once at the end of a live session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub route_id: String,
    pub route_name: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: u64,
    pub distance_km: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_pace: Option<Pace>,
    pub recorded_path: Vec<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coaching_tips: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    /// Always stored in km.
    pub total_distance_km: f64,
    pub total_runs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub unit_system: units::UnitSystem,
    #[serde(default)]
    pub stats: ProfileStats,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            id: "user_1".into(),
            username: "RunnerOne".into(),
            unit_system: units::UnitSystem::Metric,
            stats: ProfileStats::default(),
        }
    }
}

impl ProfileStats {
    /// Totals over the whole run history.
    pub fn from_runs(runs: &[RunRecord]) -> Self {
        Self {
            total_distance_km: runs.iter().map(|r| r.distance_km).sum(),
            total_runs: runs.len() as u32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}
