//! Adapters for the external services the tracker depends on.
//!
//! Each service sits behind a narrow async trait so sessions, the route
//! planner and the recording pipeline can run against the real HTTP
//! clients or against the fixed in-memory providers in [`fixed`].

pub mod fixed;
pub mod gemini;
pub mod osrm;
pub mod overpass;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Coordinate, NavigationStep, Pace, PointOfInterest};

pub use fixed::{FixedDirections, FixedPois, FixedText, Offline};
pub use gemini::GeminiClient;
pub use osrm::OsrmClient;
pub use overpass::OverpassClient;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error("no route between the requested points: {0}")]
    NoRoute(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("provider unavailable")]
    Unavailable,
}

/// Turn-by-turn directions and path snapping.
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    /// Ordered instructions for following `waypoints`.
    async fn steps(&self, waypoints: &[Coordinate]) -> Result<Vec<NavigationStep>, ProviderError>;

    /// Path along the walking network from `from` to `to`, inclusive.
    async fn snap(&self, from: Coordinate, to: Coordinate)
        -> Result<Vec<Coordinate>, ProviderError>;
}

/// Lookup of tagged places around a point.
#[async_trait]
pub trait PoiProvider: Send + Sync {
    async fn nearby(
        &self,
        center: Coordinate,
        radius_m: f64,
        category: &str,
    ) -> Result<Vec<PointOfInterest>, ProviderError>;
}

/// Facts about a finished run handed to the text generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub route_name: String,
    pub distance_km: f64,
    pub duration_seconds: u64,
    pub average_pace: Option<Pace>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDescriptionRequest {
    pub name: String,
    pub distance_km: f64,
    pub elevation_gain_m: f64,
    pub tags: Vec<String>,
}

/// Natural-language generation for coaching tips and route blurbs.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn coaching_tips(&self, summary: &RunSummary) -> Result<String, ProviderError>;

    async fn route_description(
        &self,
        request: &RouteDescriptionRequest,
    ) -> Result<String, ProviderError>;
}
