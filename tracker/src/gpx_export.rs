use std::{io::Read, time::SystemTime};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use geo_types::Point;
use gpx::{Gpx, GpxVersion, Metadata, Time, Track, TrackSegment, Waypoint};
use time::OffsetDateTime;

use crate::models::{Coordinate, RunRecord};

const CREATOR: &str = "stride";

#[derive(Debug, thiserror::Error)]
pub enum GpxError {
    #[error("failed to build GPX document: {0}")]
    Write(#[source] gpx::errors::GpxError),
    #[error("failed to read GPX document: {0}")]
    Read(#[source] gpx::errors::GpxError),
    #[error("GPX document has no track, route or waypoint coordinates")]
    Empty,
}

/// GPX 1.1 document with one track holding the recorded path.
///
/// The recorded path keeps coordinates only, so point times are spread
/// evenly over the run duration starting at `started_at`.
pub fn run_to_gpx_bytes(record: &RunRecord) -> Result<Vec<u8>, GpxError> {
    let mut gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(CREATOR.into()),
        metadata: Some(Metadata {
            name: Some(record.route_name.clone()),
            time: Some(gpx_time(record.started_at)),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mut track = Track {
        name: Some(record.route_name.clone()),
        ..Default::default()
    };

    let count = record.recorded_path.len();
    let mut segment = TrackSegment::new();
    for (index, coord) in record.recorded_path.iter().enumerate() {
        let mut waypoint = to_waypoint(coord);
        let offset_ms = if count > 1 {
            record.duration_seconds as i64 * 1_000 * index as i64 / (count as i64 - 1)
        } else {
            0
        };
        waypoint.time = Some(gpx_time(record.started_at + Duration::milliseconds(offset_ms)));
        segment.points.push(waypoint);
    }
    track.segments.push(segment);
    gpx.tracks.push(track);

    let mut buffer = Vec::new();
    gpx::write(&gpx, &mut buffer).map_err(GpxError::Write)?;
    Ok(buffer)
}

pub fn encode_run_as_gpx(record: &RunRecord) -> Result<String, GpxError> {
    Ok(BASE64.encode(run_to_gpx_bytes(record)?))
}

/// Coordinates of the first non-empty track, falling back to the first
/// route and then to the waypoints.
pub fn read_path<R: Read>(reader: R) -> Result<Vec<Coordinate>, GpxError> {
    let gpx = gpx::read(reader).map_err(GpxError::Read)?;

    let from_tracks = gpx
        .tracks
        .iter()
        .map(|track| {
            track
                .segments
                .iter()
                .flat_map(|segment| segment.points.iter())
                .map(from_waypoint)
                .collect::<Vec<_>>()
        })
        .find(|points| !points.is_empty());
    let from_routes = || {
        gpx.routes
            .iter()
            .map(|route| route.points.iter().map(from_waypoint).collect::<Vec<_>>())
            .find(|points| !points.is_empty())
    };
    let from_waypoints = || {
        let points: Vec<_> = gpx.waypoints.iter().map(from_waypoint).collect();
        (!points.is_empty()).then_some(points)
    };

    from_tracks
        .or_else(from_routes)
        .or_else(from_waypoints)
        .ok_or(GpxError::Empty)
}

fn gpx_time(at: DateTime<Utc>) -> Time {
    let at: SystemTime = at.into();
    let at: OffsetDateTime = at.into();
    Time::from(at)
}

fn to_waypoint(coord: &Coordinate) -> Waypoint {
    Waypoint::new(Point::new(coord.lon, coord.lat))
}

fn from_waypoint(waypoint: &Waypoint) -> Coordinate {
    let point = waypoint.point();
    Coordinate::new(point.y(), point.x())
}
