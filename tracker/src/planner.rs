//! Interactive route drafting: clicked points are snapped onto the walking
//! network one segment at a time, then the draft is turned into a [`Route`].

use chrono::{DateTime, Utc};

use crate::{
    geo::{haversine_m, path_length_km},
    models::{Coordinate, Difficulty, Route},
    providers::{DirectionsProvider, RouteDescriptionRequest, TextGenerator},
};

/// Elevation estimate used until a terrain source is wired in.
pub const ELEVATION_GAIN_M_PER_KM: f64 = 15.0;

/// Description when the text generator fails.
pub const FALLBACK_DESCRIPTION: &str = "A custom route perfect for all skill levels.";
/// Description when the text generator answers with nothing.
pub const EMPTY_DESCRIPTION: &str = "A great path for your next run.";

/// Snapped points closer than this to the previous path end are duplicates.
const JOIN_TOLERANCE_M: f64 = 1.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlannerError {
    #[error("route name is required")]
    MissingName,
    #[error("route needs at least two points")]
    EmptyRoute,
    #[error("invalid coordinate {0:?}")]
    InvalidPoint(Coordinate),
    #[error("closing a loop needs at least one segment")]
    LoopTooShort,
}

/// One leg of the draft, from the previous path end to a clicked point.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSegment {
    pub target: Coordinate,
    /// Points after the previous path end, ending near `target`.
    pub points: Vec<Coordinate>,
    /// `false` when the directions provider failed and the leg is a
    /// straight line.
    pub snapped: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RouteDraft {
    start: Option<Coordinate>,
    segments: Vec<RouteSegment>,
    /// Identity of the route being edited, kept through `finalize`.
    editing: Option<(String, DateTime<Utc>)>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteDetails {
    pub name: String,
    pub description: Option<String>,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
}

impl RouteDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a draft from an existing path, one straight segment per point.
    pub fn from_path(path: &[Coordinate]) -> Self {
        let mut draft = Self::new();
        let mut points = path.iter().copied();
        draft.start = points.next();
        draft.segments = points
            .map(|point| RouteSegment {
                target: point,
                points: vec![point],
                snapped: false,
            })
            .collect();
        draft
    }

    /// Reopens a saved route. Finalizing keeps its id and creation time so
    /// saving replaces the stored route.
    pub fn edit(route: &Route) -> Self {
        Self {
            editing: Some((route.id.clone(), route.created_at)),
            ..Self::from_path(&route.path)
        }
    }

    pub fn editing(&self) -> Option<&str> {
        self.editing.as_ref().map(|(id, _)| id.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none()
    }

    pub fn segments(&self) -> &[RouteSegment] {
        &self.segments
    }

    /// The start point followed by every clicked point.
    pub fn waypoints(&self) -> Vec<Coordinate> {
        self.start
            .into_iter()
            .chain(self.segments.iter().map(|s| s.target))
            .collect()
    }

    pub fn path(&self) -> Vec<Coordinate> {
        self.start
            .into_iter()
            .chain(self.segments.iter().flat_map(|s| s.points.iter().copied()))
            .collect()
    }

    pub fn distance_km(&self) -> f64 {
        path_length_km(&self.path())
    }

    fn last_point(&self) -> Option<Coordinate> {
        self.segments
            .last()
            .and_then(|s| s.points.last().copied())
            .or(self.start)
    }

    /// Appends `point`. The first point only sets the start; later points
    /// are snapped from the current path end.
    pub async fn add_point(
        &mut self,
        router: &dyn DirectionsProvider,
        point: Coordinate,
    ) -> Result<(), PlannerError> {
        if !point.is_valid() {
            return Err(PlannerError::InvalidPoint(point));
        }
        let Some(from) = self.last_point() else {
            self.start = Some(point);
            return Ok(());
        };
        let segment = snap_segment(router, from, point).await;
        self.segments.push(segment);
        Ok(())
    }

    /// Routes back to the start point.
    pub async fn close_loop(&mut self, router: &dyn DirectionsProvider) -> Result<(), PlannerError> {
        let (Some(start), Some(from)) = (self.start, self.last_point()) else {
            return Err(PlannerError::LoopTooShort);
        };
        if self.segments.is_empty() {
            return Err(PlannerError::LoopTooShort);
        }
        let segment = snap_segment(router, from, start).await;
        self.segments.push(segment);
        Ok(())
    }

    /// Removes the last segment, or the start point once no segment is left.
    pub fn undo(&mut self) {
        if self.segments.pop().is_none() {
            self.start = None;
        }
    }

    /// Drops every point. An edited route keeps its identity.
    pub fn clear(&mut self) {
        self.start = None;
        self.segments.clear();
    }

    /// Turns the draft into a route. A missing description is generated,
    /// with a fixed fallback when generation fails or comes back empty.
    pub async fn finalize(
        &self,
        details: RouteDetails,
        describer: &dyn TextGenerator,
    ) -> Result<Route, PlannerError> {
        let name = details.name.trim().to_string();
        if name.is_empty() {
            return Err(PlannerError::MissingName);
        }
        let path = self.path();
        if path.len() < 2 {
            return Err(PlannerError::EmptyRoute);
        }

        let exact_km = path_length_km(&path);
        let elevation_gain_m = (exact_km * ELEVATION_GAIN_M_PER_KM).round();

        let description = match details.description.filter(|d| !d.trim().is_empty()) {
            Some(description) => description,
            None => {
                let request = RouteDescriptionRequest {
                    name: name.clone(),
                    distance_km: exact_km,
                    elevation_gain_m,
                    tags: details.tags.clone(),
                };
                match describer.route_description(&request).await {
                    Ok(text) if text.trim().is_empty() => EMPTY_DESCRIPTION.to_string(),
                    Ok(text) => text.trim().to_string(),
                    Err(err) => {
                        tracing::warn!("Route description unavailable: {}", err);
                        FALLBACK_DESCRIPTION.to_string()
                    }
                }
            }
        };

        let (id, created_at) = self
            .editing
            .clone()
            .unwrap_or_else(|| (uuid::Uuid::new_v4().to_string(), Utc::now()));
        let route = Route {
            id,
            name,
            description,
            path,
            distance_km: round_2(exact_km),
            elevation_gain_m,
            difficulty: details.difficulty,
            tags: details.tags,
            created_at,
        };
        tracing::info!(
            "Planned route {} ({:.2} km, {} points)",
            route.name,
            route.distance_km,
            route.path.len()
        );
        Ok(route)
    }
}

async fn snap_segment(
    router: &dyn DirectionsProvider,
    from: Coordinate,
    to: Coordinate,
) -> RouteSegment {
    match router.snap(from, to).await {
        Ok(mut points) if !points.is_empty() => {
            if haversine_m(points[0], from) < JOIN_TOLERANCE_M {
                points.remove(0);
            }
            if points.is_empty() {
                points.push(to);
            }
            RouteSegment {
                target: to,
                points,
                snapped: true,
            }
        }
        Ok(_) => straight_segment(to),
        Err(err) => {
            tracing::warn!("Snapping failed, using a straight segment: {}", err);
            straight_segment(to)
        }
    }
}

fn straight_segment(to: Coordinate) -> RouteSegment {
    RouteSegment {
        target: to,
        points: vec![to],
        snapped: false,
    }
}

fn round_2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
