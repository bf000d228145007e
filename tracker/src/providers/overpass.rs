use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use super::{PoiProvider, ProviderError};
use crate::{
    config::ProviderConfig,
    models::{Coordinate, PointOfInterest},
};

/// Client for the Overpass API, looking up OSM nodes by `amenity` tag.
#[derive(Debug, Clone)]
pub struct OverpassClient {
    http: reqwest::Client,
    url: String,
}

impl OverpassClient {
    pub fn new(http: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            http,
            url: config.overpass_url.clone(),
        }
    }
}

#[async_trait]
impl PoiProvider for OverpassClient {
    async fn nearby(
        &self,
        center: Coordinate,
        radius_m: f64,
        category: &str,
    ) -> Result<Vec<PointOfInterest>, ProviderError> {
        let query = build_query(center, radius_m, category)?;
        tracing::debug!("Overpass query: {}", query);

        let response: OverpassResponse = self
            .http
            .get(&self.url)
            .query(&[("data", query.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let points = into_points(response, category);
        tracing::info!(
            "Found {} '{}' points within {:.0} m",
            points.len(),
            category,
            radius_m
        );
        Ok(points)
    }
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: u64,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

fn build_query(center: Coordinate, radius_m: f64, category: &str) -> Result<String, ProviderError> {
    // the category lands inside a quoted Overpass string
    if category.is_empty() || !category.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ProviderError::InvalidRequest(format!(
            "unsupported category {category:?}"
        )));
    }
    Ok(format!(
        "[out:json][timeout:25];node(around:{:.0},{},{})[\"amenity\"=\"{}\"];out body;",
        radius_m, center.lat, center.lon, category
    ))
}

fn into_points(response: OverpassResponse, category: &str) -> Vec<PointOfInterest> {
    response
        .elements
        .into_iter()
        .filter_map(|element| {
            let (lat, lon) = (element.lat?, element.lon?);
            let label = element
                .tags
                .get("name")
                .cloned()
                .unwrap_or_else(|| category.replace('_', " "));
            Some(PointOfInterest {
                id: format!("{}/{}", element.kind, element.id),
                location: Coordinate { lat, lon },
                label,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_targets_amenity_around_center() {
        let query = build_query(Coordinate { lat: 37.7749, lon: -122.4194 }, 1000.0, "cafe").unwrap();
        assert_eq!(
            query,
            "[out:json][timeout:25];node(around:1000,37.7749,-122.4194)[\"amenity\"=\"cafe\"];out body;"
        );
    }

    #[test]
    fn rejects_categories_that_would_break_the_query() {
        for category in ["cafe\"];", ""] {
            assert!(matches!(
                build_query(Coordinate { lat: 0.0, lon: 0.0 }, 100.0, category),
                Err(ProviderError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn parses_named_and_unnamed_nodes() {
        let response: OverpassResponse = serde_json::from_str(
            r#"{"elements": [
                {"type": "node", "id": 42, "lat": 37.78, "lon": -122.41, "tags": {"amenity": "cafe", "name": "Harbor Coffee"}},
                {"type": "node", "id": 43, "lat": 37.79, "lon": -122.40, "tags": {"amenity": "drinking_water"}},
                {"type": "way", "id": 44}
            ]}"#,
        )
        .unwrap();
        let points = into_points(response, "drinking_water");
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].id, "node/42");
        assert_eq!(points[0].label, "Harbor Coffee");
        assert_eq!(points[1].label, "drinking water");
    }
}
