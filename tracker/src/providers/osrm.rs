use async_trait::async_trait;
use serde::Deserialize;

use super::{DirectionsProvider, ProviderError};
use crate::{
    config::ProviderConfig,
    models::{Coordinate, NavigationStep},
};

/// The public OSRM server rejects long coordinate lists, so planned paths
/// are thinned to this many waypoints before asking for directions.
const MAX_WAYPOINTS: usize = 25;

/// Client for the OSRM `route` service.
#[derive(Debug, Clone)]
pub struct OsrmClient {
    http: reqwest::Client,
    base_url: String,
    profile: String,
}

impl OsrmClient {
    pub fn new(http: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            http,
            base_url: config.osrm_base_url.trim_end_matches('/').to_string(),
            profile: config.osrm_profile.clone(),
        }
    }

    async fn route(&self, waypoints: &[Coordinate], steps: bool) -> Result<OsrmRoute, ProviderError> {
        let coords = waypoints
            .iter()
            .map(|c| format!("{},{}", c.lon, c.lat))
            .collect::<Vec<_>>()
            .join(";");
        let url = format!("{}/route/v1/{}/{}", self.base_url, self.profile, coords);

        tracing::debug!("OSRM request with {} waypoints", waypoints.len());
        let response: OsrmResponse = self
            .http
            .get(&url)
            .query(&[
                ("overview", "full"),
                ("geometries", "geojson"),
                ("steps", if steps { "true" } else { "false" }),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        first_route(response)
    }
}

#[async_trait]
impl DirectionsProvider for OsrmClient {
    async fn steps(&self, waypoints: &[Coordinate]) -> Result<Vec<NavigationStep>, ProviderError> {
        let waypoints = thin_waypoints(waypoints, MAX_WAYPOINTS);
        if waypoints.len() < 2 {
            return Ok(Vec::new());
        }
        let route = self.route(&waypoints, true).await?;
        Ok(navigation_steps(&route))
    }

    async fn snap(
        &self,
        from: Coordinate,
        to: Coordinate,
    ) -> Result<Vec<Coordinate>, ProviderError> {
        let route = self.route(&[from, to], false).await?;
        let geometry = route
            .geometry
            .ok_or_else(|| ProviderError::InvalidResponse("route without geometry".into()))?;
        Ok(geometry
            .coordinates
            .into_iter()
            .map(|[lon, lat]| Coordinate { lat, lon })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    #[serde(default)]
    geometry: Option<OsrmGeometry>,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    #[serde(default)]
    steps: Vec<OsrmStep>,
}

#[derive(Debug, Deserialize)]
struct OsrmStep {
    distance: f64,
    #[serde(default)]
    name: String,
    maneuver: OsrmManeuver,
}

#[derive(Debug, Deserialize)]
struct OsrmManeuver {
    location: [f64; 2],
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    modifier: Option<String>,
}

fn first_route(response: OsrmResponse) -> Result<OsrmRoute, ProviderError> {
    if response.code != "Ok" {
        let message = response.message.unwrap_or(response.code);
        return Err(ProviderError::NoRoute(message));
    }
    response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::NoRoute("empty route list".into()))
}

/// Flattens legs into one instruction list. Depart/arrive maneuvers at
/// intermediate waypoints are dropped since those waypoints are only
/// samples of the planned path.
fn navigation_steps(route: &OsrmRoute) -> Vec<NavigationStep> {
    let last_leg = route.legs.len().saturating_sub(1);
    route
        .legs
        .iter()
        .enumerate()
        .flat_map(|(leg_idx, leg)| {
            leg.steps.iter().filter(move |step| {
                match step.maneuver.kind.as_str() {
                    "depart" => leg_idx == 0,
                    "arrive" => leg_idx == last_leg,
                    _ => true,
                }
            })
        })
        .map(|step| NavigationStep {
            instruction: instruction_text(
                &step.maneuver.kind,
                step.maneuver.modifier.as_deref(),
                &step.name,
            ),
            location: Coordinate {
                lat: step.maneuver.location[1],
                lon: step.maneuver.location[0],
            },
            distance_m: step.distance,
        })
        .collect()
}

fn instruction_text(kind: &str, modifier: Option<&str>, name: &str) -> String {
    let onto = |text: &str| {
        if name.is_empty() {
            text.to_string()
        } else {
            format!("{text} onto {name}")
        }
    };

    match kind {
        "depart" => {
            if name.is_empty() {
                "Head out".to_string()
            } else {
                format!("Head out on {name}")
            }
        }
        "arrive" => "You have arrived at the end of the route".to_string(),
        "roundabout" | "rotary" => onto("Enter the roundabout"),
        _ => onto(turn_phrase(modifier)),
    }
}

fn turn_phrase(modifier: Option<&str>) -> &'static str {
    match modifier {
        Some("uturn") => "Make a U-turn",
        Some("sharp right") => "Turn sharp right",
        Some("right") => "Turn right",
        Some("slight right") => "Keep slightly right",
        Some("sharp left") => "Turn sharp left",
        Some("left") => "Turn left",
        Some("slight left") => "Keep slightly left",
        _ => "Continue straight",
    }
}

/// Evenly spaced subset of `path` that always keeps both endpoints.
fn thin_waypoints(path: &[Coordinate], max: usize) -> Vec<Coordinate> {
    if path.len() <= max || max < 2 {
        return path.to_vec();
    }
    let last = path.len() - 1;
    (0..max)
        .map(|i| path[i * last / (max - 1)])
        .collect()
}
