use crate::models::Coordinate;

pub const EARTH_RADIUS_KM: f64 = 6_371.0;
const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;

pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let sin_dlat = (dlat / 2.0).sin();
    let sin_dlon = (dlon / 2.0).sin();

    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    // clamp guards asin against rounding just above 1.0 for antipodes
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    haversine_km(a, b) * 1000.0
}

pub fn path_length_km(path: &[Coordinate]) -> f64 {
    path.windows(2).map(|w| haversine_km(w[0], w[1])).sum()
}

/// Smallest great-circle distance from `point` to any vertex of `path`.
pub fn min_vertex_distance_m(point: Coordinate, path: &[Coordinate]) -> Option<f64> {
    path.iter()
        .map(|vertex| haversine_m(point, *vertex))
        .min_by(f64::total_cmp)
}

/// Distance to the nearest point on any segment of `path`.
///
/// Segments are projected onto a local equirectangular plane centred on
/// `point`, which is accurate to well under a metre at running scales.
pub fn distance_to_path_m(point: Coordinate, path: &[Coordinate]) -> Option<f64> {
    match path {
        [] => None,
        [only] => Some(haversine_m(point, *only)),
        _ => path
            .windows(2)
            .map(|w| distance_to_segment_m(point, w[0], w[1]))
            .min_by(f64::total_cmp),
    }
}

fn distance_to_segment_m(point: Coordinate, a: Coordinate, b: Coordinate) -> f64 {
    let (ax, ay) = project(point, a);
    let (bx, by) = project(point, b);
    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;

    let t = if len_sq <= f64::EPSILON {
        0.0
    } else {
        (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0)
    };

    let cx = ax + t * dx;
    let cy = ay + t * dy;
    (cx * cx + cy * cy).sqrt()
}

/// Metres east/north of `origin`.
fn project(origin: Coordinate, c: Coordinate) -> (f64, f64) {
    let x = (c.lon - origin.lon).to_radians() * origin.lat.to_radians().cos() * EARTH_RADIUS_M;
    let y = (c.lat - origin.lat).to_radians() * EARTH_RADIUS_M;
    (x, y)
}
