//! Geometry primitives on the WGS-84 sphere
//!
//! Polygon membership uses even-odd ray casting with longitude as x and
//! latitude as y. An edge counts as a crossing when exactly one endpoint lies
//! strictly north of the point and the point lies strictly west of the edge at
//! the point's latitude. Points on southern and western edges are therefore
//! inside, points on northern and eastern edges outside, and vertices follow
//! the same rule.

use crate::domain::error::GeometryError;
use crate::domain::types::{Coordinate, Geofence};

/// Mean Earth radius in metres
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[inline]
fn check_finite(p: Coordinate) -> Result<(), GeometryError> {
    if p.lat.is_finite() && p.lon.is_finite() {
        Ok(())
    } else {
        Err(GeometryError::NonFiniteCoordinate { lat: p.lat, lon: p.lon })
    }
}

/// Wrap a longitude difference into [-180, 180]
#[inline]
fn wrap_lon_delta(delta: f64) -> f64 {
    let wrapped = (delta + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid maps +180 to -180; keep the sign of the input for symmetry
    if wrapped == -180.0 && delta > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Great-circle distance in metres
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> Result<f64, GeometryError> {
    check_finite(a)?;
    check_finite(b)?;

    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = wrap_lon_delta(b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat * 0.5).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon * 0.5).sin().powi(2);
    // Rounding near the poles and antipodes can push h just outside [0, 1]
    let h = h.clamp(0.0, 1.0);
    let distance = 2.0 * EARTH_RADIUS_M * h.sqrt().asin();

    if distance.is_finite() {
        Ok(distance)
    } else {
        Err(GeometryError::NonFiniteDistance)
    }
}

/// True when `p` is within `radius_m` of `center`
pub fn point_in_circle(p: Coordinate, center: Coordinate, radius_m: f64) -> Result<bool, GeometryError> {
    Ok(haversine_distance(p, center)? <= radius_m)
}

/// Even-odd ray casting over a closed vertex loop
pub fn point_in_polygon(p: Coordinate, vertices: &[Coordinate]) -> Result<bool, GeometryError> {
    check_finite(p)?;
    let (x, y) = (p.lon, p.lat);
    let mut inside = false;

    let mut j = vertices.len().wrapping_sub(1);
    for (i, vi) in vertices.iter().enumerate() {
        let vj = vertices[j];
        check_finite(*vi)?;
        let (xi, yi) = (vi.lon, vi.lat);
        let (xj, yj) = (vj.lon, vj.lat);

        if (yi > y) != (yj > y) {
            let x_cross = xi + (y - yi) * (xj - xi) / (yj - yi);
            if x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    Ok(inside)
}

/// Distance in metres from `p` to the segment `a`-`b`
///
/// Uses a local equirectangular projection centred on `p`, which is accurate
/// for the edge lengths geofences use.
fn distance_to_segment(p: Coordinate, a: Coordinate, b: Coordinate) -> f64 {
    let k = EARTH_RADIUS_M.to_radians();
    let cos_lat = p.lat.to_radians().cos();
    let project = |c: Coordinate| (wrap_lon_delta(c.lon - p.lon) * cos_lat * k, (c.lat - p.lat) * k);

    let (ax, ay) = project(a);
    let (bx, by) = project(b);
    let (dx, dy) = (bx - ax, by - ay);
    let len_sq = dx * dx + dy * dy;

    let t = if len_sq > 0.0 { (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0) } else { 0.0 };
    let (cx, cy) = (ax + t * dx, ay + t * dy);
    (cx * cx + cy * cy).sqrt()
}

/// Signed distance to the geofence boundary in metres (positive = inside)
///
/// Informational only; membership is always decided by the containment tests.
pub fn distance_to_boundary(p: Coordinate, fence: &Geofence) -> Result<f64, GeometryError> {
    match fence {
        Geofence::Circle { center, radius_m, .. } => Ok(radius_m - haversine_distance(p, *center)?),
        Geofence::Polygon { vertices, .. } => {
            let inside = point_in_polygon(p, vertices)?;
            let mut min = f64::INFINITY;
            let mut j = vertices.len().wrapping_sub(1);
            for (i, vi) in vertices.iter().enumerate() {
                min = min.min(distance_to_segment(p, vertices[j], *vi));
                j = i;
            }
            if !min.is_finite() {
                return Err(GeometryError::NonFiniteDistance);
            }
            Ok(if inside { min } else { -min })
        }
    }
}

/// Membership test for any geofence variant
pub fn contains(fence: &Geofence, p: Coordinate) -> Result<bool, GeometryError> {
    match fence {
        Geofence::Circle { center, radius_m, .. } => point_in_circle(p, *center, *radius_m),
        Geofence::Polygon { vertices, .. } => point_in_polygon(p, vertices),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Metres per degree of latitude on the model sphere
    const M_PER_DEG: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

    fn c(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon)
    }

    fn unit_square() -> Vec<Coordinate> {
        vec![c(0.0, 0.0), c(0.0, 1.0), c(1.0, 1.0), c(1.0, 0.0)]
    }

    #[test]
    fn test_haversine_identical_points() {
        assert_eq!(haversine_distance(c(51.5, -0.12), c(51.5, -0.12)).unwrap(), 0.0);
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = c(48.8566, 2.3522);
        let b = c(40.7128, -74.0060);
        let ab = haversine_distance(a, b).unwrap();
        let ba = haversine_distance(b, a).unwrap();
        assert!((ab - ba).abs() < 1e-6);
        // Paris to New York is roughly 5837 km
        assert!((ab / 1000.0 - 5837.0).abs() < 10.0);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_distance(c(0.0, 0.0), c(1.0, 0.0)).unwrap();
        assert!((d - M_PER_DEG).abs() < 1e-6);
    }

    #[test]
    fn test_haversine_antimeridian() {
        let d = haversine_distance(c(0.0, 179.9), c(0.0, -179.9)).unwrap();
        assert!((d - 0.2 * M_PER_DEG).abs() < 1.0);
    }

    #[test]
    fn test_haversine_poles() {
        let d = haversine_distance(c(90.0, 0.0), c(90.0, 123.0)).unwrap();
        assert!(d.abs() < 1e-6);
        let d = haversine_distance(c(90.0, 0.0), c(-90.0, 0.0)).unwrap();
        assert!((d - EARTH_RADIUS_M * std::f64::consts::PI).abs() < 1e-3);
    }

    #[test]
    fn test_haversine_rejects_nan() {
        assert!(haversine_distance(c(f64::NAN, 0.0), c(0.0, 0.0)).is_err());
    }

    #[test]
    fn test_circle_center_inside() {
        for &(lat, lon) in &[(0.0, 0.0), (89.9, 10.0), (-45.0, 179.99), (12.3, -77.7)] {
            assert!(point_in_circle(c(lat, lon), c(lat, lon), 0.5).unwrap());
        }
    }

    #[test]
    fn test_circle_radius_boundary() {
        let center = c(0.0, 0.0);
        assert!(point_in_circle(c(80.0 / M_PER_DEG, 0.0), center, 100.0).unwrap());
        assert!(!point_in_circle(c(150.0 / M_PER_DEG, 0.0), center, 100.0).unwrap());
    }

    #[test]
    fn test_polygon_square_membership() {
        let square = unit_square();
        assert!(point_in_polygon(c(0.5, 0.5), &square).unwrap());
        assert!(!point_in_polygon(c(2.0, 2.0), &square).unwrap());
    }

    #[test]
    fn test_polygon_edge_tie_break() {
        let square = unit_square();
        // Southern and western edges are inside
        assert!(point_in_polygon(c(0.0, 0.5), &square).unwrap());
        assert!(point_in_polygon(c(0.5, 0.0), &square).unwrap());
        // Northern and eastern edges are outside
        assert!(!point_in_polygon(c(1.0, 0.5), &square).unwrap());
        assert!(!point_in_polygon(c(0.5, 1.0), &square).unwrap());
        // Vertices follow the same rule
        assert!(point_in_polygon(c(0.0, 0.0), &square).unwrap());
        assert!(!point_in_polygon(c(1.0, 1.0), &square).unwrap());
    }

    #[test]
    fn test_polygon_outside_bbox_never_inside() {
        let polygons = vec![
            unit_square(),
            vec![c(10.0, 10.0), c(12.0, 15.0), c(8.0, 14.0)],
            vec![c(-5.0, -5.0), c(-5.0, 5.0), c(0.0, 0.0), c(5.0, 5.0), c(5.0, -5.0)],
        ];
        for poly in &polygons {
            let max_lat = poly.iter().map(|v| v.lat).fold(f64::MIN, f64::max);
            let max_lon = poly.iter().map(|v| v.lon).fold(f64::MIN, f64::max);
            let min_lat = poly.iter().map(|v| v.lat).fold(f64::MAX, f64::min);
            let min_lon = poly.iter().map(|v| v.lon).fold(f64::MAX, f64::min);
            for p in [
                c(max_lat + 0.1, min_lon),
                c(min_lat - 0.1, max_lon),
                c(min_lat, max_lon + 0.1),
                c(max_lat, min_lon - 0.1),
            ] {
                assert!(!point_in_polygon(p, poly).unwrap(), "{} reported inside", p);
            }
        }
    }

    #[test]
    fn test_polygon_concave_notch() {
        // Arrow shape with a notch pointing into the polygon at (0,0)
        let arrow = vec![c(-5.0, -5.0), c(-5.0, 5.0), c(0.0, 0.0), c(5.0, 5.0), c(5.0, -5.0)];
        assert!(point_in_polygon(c(0.0, -2.0), &arrow).unwrap());
        assert!(!point_in_polygon(c(0.0, 3.0), &arrow).unwrap());
    }

    #[test]
    fn test_distance_to_boundary_circle_signed() {
        let fence = Geofence::circle("a", "A", c(0.0, 0.0), 100.0);
        let inside = distance_to_boundary(c(80.0 / M_PER_DEG, 0.0), &fence).unwrap();
        let outside = distance_to_boundary(c(150.0 / M_PER_DEG, 0.0), &fence).unwrap();
        assert!((inside - 20.0).abs() < 1e-6);
        assert!((outside + 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_to_boundary_polygon() {
        let fence = Geofence::polygon("sq", "Square", unit_square());
        let inside = distance_to_boundary(c(0.5, 0.1), &fence).unwrap();
        // Nearest edge is the western one, 0.1 degree of longitude at lat 0.5
        let expected = 0.1 * M_PER_DEG * 0.5f64.to_radians().cos();
        assert!((inside - expected).abs() < 1.0);

        let outside = distance_to_boundary(c(0.5, 1.2), &fence).unwrap();
        assert!(outside < 0.0);
    }
}
