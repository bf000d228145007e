use async_trait::async_trait;

use super::{
    DirectionsProvider, PoiProvider, ProviderError, RouteDescriptionRequest, RunSummary,
    TextGenerator,
};
use crate::models::{Coordinate, NavigationStep, PointOfInterest};

/// Returns the same steps for every request and snaps in straight lines.
#[derive(Debug, Clone, Default)]
pub struct FixedDirections {
    steps: Vec<NavigationStep>,
}

impl FixedDirections {
    pub fn new(steps: Vec<NavigationStep>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl DirectionsProvider for FixedDirections {
    async fn steps(&self, _waypoints: &[Coordinate]) -> Result<Vec<NavigationStep>, ProviderError> {
        Ok(self.steps.clone())
    }

    async fn snap(
        &self,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<Vec<Coordinate>, ProviderError> {
        Ok(vec![from, to])
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixedPois {
    points: Vec<PointOfInterest>,
}

impl FixedPois {
    pub fn new(points: Vec<PointOfInterest>) -> Self {
        Self { points }
    }
}

#[async_trait]
impl PoiProvider for FixedPois {
    async fn nearby(
        &self,
        _center: Coordinate,
        _radius_m: f64,
        _category: &str,
    ) -> Result<Vec<PointOfInterest>, ProviderError> {
        Ok(self.points.clone())
    }
}

#[derive(Debug, Clone)]
pub struct FixedText {
    pub tips: String,
    pub description: String,
}

impl FixedText {
    pub fn new(tips: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            tips: tips.into(),
            description: description.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for FixedText {
    async fn coaching_tips(&self, _summary: &RunSummary) -> Result<String, ProviderError> {
        Ok(self.tips.clone())
    }

    async fn route_description(
        &self,
        _request: &RouteDescriptionRequest,
    ) -> Result<String, ProviderError> {
        Ok(self.description.clone())
    }
}

/// Every call fails, as when the device has no connectivity.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

#[async_trait]
impl DirectionsProvider for Offline {
    async fn steps(&self, _waypoints: &[Coordinate]) -> Result<Vec<NavigationStep>, ProviderError> {
        Err(ProviderError::Unavailable)
    }

    async fn snap(
        &self,
        _from: Coordinate,
        _to: Coordinate,
    ) -> Result<Vec<Coordinate>, ProviderError> {
        Err(ProviderError::Unavailable)
    }
}

#[async_trait]
impl PoiProvider for Offline {
    async fn nearby(
        &self,
        _center: Coordinate,
        _radius_m: f64,
        _category: &str,
    ) -> Result<Vec<PointOfInterest>, ProviderError> {
        Err(ProviderError::Unavailable)
    }
}

#[async_trait]
impl TextGenerator for Offline {
    async fn coaching_tips(&self, _summary: &RunSummary) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable)
    }

    async fn route_description(
        &self,
        _request: &RouteDescriptionRequest,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable)
    }
}
