use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use shared::{
    display_pace, units, ApiError, Coordinate, Difficulty, NavigationStep, Pace, PointOfInterest,
    ProfileStats, Route, RunRecord, UserProfile,
};

/// One reading delivered by the position source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub coordinate: Coordinate,
    /// Radius of the 68% confidence circle, in metres.
    pub accuracy_m: f64,
    pub timestamp: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(coordinate: Coordinate, accuracy_m: f64) -> Self {
        Self {
            coordinate,
            accuracy_m,
            timestamp: Utc::now(),
        }
    }
}
