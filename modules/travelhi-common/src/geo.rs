use std::f64::consts::PI;

use crate::error::TravelError;

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Largest radius accepted by proximity queries.
pub const MAX_RADIUS_METERS: f64 = 50_000.0;

pub const DEFAULT_RADIUS_METERS: f64 = 5_000.0;

/// Haversine distance between two lat/lng points in meters.
pub fn haversine_distance_meters(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let to_rad = |deg: f64| deg * PI / 180.0;

    let dlat = to_rad(lat2 - lat1);
    let dlng = to_rad(lng2 - lng1);

    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlng / 2.0).sin().powi(2);

    // Rounding can push `a` a hair above 1.0 for antipodal points.
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_METERS * c
}

pub fn is_valid_lat(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
}

pub fn is_valid_lng(lng: f64) -> bool {
    (-180.0..=180.0).contains(&lng)
}

/// Reject coordinates outside [-90,90] x [-180,180]. NaN fails both checks.
pub fn validate_coordinates(lat: f64, lng: f64) -> Result<(), TravelError> {
    if is_valid_lat(lat) && is_valid_lng(lng) {
        Ok(())
    } else {
        Err(TravelError::validation(
            "Invalid coordinates. Latitude must be between -90 and 90, longitude between -180 and 180.",
        ))
    }
}

/// Radius must be strictly positive and at most [`MAX_RADIUS_METERS`].
pub fn validate_radius(radius_meters: f64) -> Result<(), TravelError> {
    if radius_meters > 0.0 && radius_meters <= MAX_RADIUS_METERS {
        Ok(())
    } else {
        Err(TravelError::validation(format!(
            "Radius must be greater than 0 and at most {MAX_RADIUS_METERS} meters."
        )))
    }
}

/// Lat/lng box that fully contains the circle of `radius_meters` around the
/// center. Used as a cheap index-friendly prefilter before the exact
/// haversine check. Longitude bounds open to the full range near the poles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn around(lat: f64, lng: f64, radius_meters: f64) -> Self {
        let dlat = (radius_meters / EARTH_RADIUS_METERS) * 180.0 / PI + 1e-9;
        let min_lat = (lat - dlat).max(-90.0);
        let max_lat = (lat + dlat).min(90.0);

        // Widest longitude reach of the circle is asin(sin(r/R) / cos(lat)),
        // attained poleward of the center. Both half-widths are padded by a
        // hair so rounding never cuts off the boundary.
        let ratio = (radius_meters / EARTH_RADIUS_METERS).sin() / (lat * PI / 180.0).cos();
        let opens = min_lat <= -90.0 || max_lat >= 90.0 || ratio.is_nan() || ratio >= 1.0;
        let (min_lng, max_lng) = if opens {
            (-180.0, 180.0)
        } else {
            let dlng = ratio.asin() * 180.0 / PI + 1e-9;
            if lng - dlng < -180.0 || lng + dlng > 180.0 {
                (-180.0, 180.0)
            } else {
                (lng - dlng, lng + dlng)
            }
        };

        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KRAKOW: (f64, f64) = (50.0614, 19.9366);
    const WARSAW: (f64, f64) = (52.2297, 21.0122);

    #[test]
    fn krakow_to_warsaw() {
        let d = haversine_distance_meters(KRAKOW.0, KRAKOW.1, WARSAW.0, WARSAW.1);
        assert!((d - 252_000.0).abs() < 5_000.0, "Expected ~252km, got {d}m");
    }

    #[test]
    fn zero_distance_to_self() {
        assert_eq!(haversine_distance_meters(KRAKOW.0, KRAKOW.1, KRAKOW.0, KRAKOW.1), 0.0);
    }

    #[test]
    fn antipodes_do_not_nan() {
        let d = haversine_distance_meters(0.0, 0.0, 0.0, 180.0);
        assert!((d - PI * EARTH_RADIUS_METERS).abs() < 1.0);
    }

    #[test]
    fn coordinate_bounds_are_inclusive() {
        assert!(validate_coordinates(90.0, 180.0).is_ok());
        assert!(validate_coordinates(-90.0, -180.0).is_ok());
        assert!(validate_coordinates(90.0001, 0.0).is_err());
        assert!(validate_coordinates(0.0, -180.5).is_err());
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn radius_bounds() {
        assert!(validate_radius(MAX_RADIUS_METERS).is_ok());
        assert!(validate_radius(0.0).is_err());
        assert!(validate_radius(MAX_RADIUS_METERS + 1.0).is_err());
    }

    #[test]
    fn bounding_box_contains_circle_edge() {
        let bbox = BoundingBox::around(KRAKOW.0, KRAKOW.1, 10_000.0);
        // ~10km due north and due east
        assert!(bbox.contains(KRAKOW.0 + 0.0899, KRAKOW.1));
        assert!(bbox.contains(KRAKOW.0, KRAKOW.1 + 0.139));
        assert!(!bbox.contains(KRAKOW.0 + 0.2, KRAKOW.1));
    }

    #[test]
    fn bounding_box_keeps_circles_widest_point() {
        let (lat, lng, radius) = (50.0_f64, 20.0_f64, 50_000.0);
        let angular = radius / EARTH_RADIUS_METERS;
        let phi = lat.to_radians();
        // Tangent point of the circle's easternmost meridian.
        let reach = (angular.sin() / phi.cos()).asin().to_degrees();
        let tangent_lat = (phi.sin() / angular.cos()).asin().to_degrees();

        let inside_lng = lng + 0.99999 * reach;
        let d = haversine_distance_meters(lat, lng, tangent_lat, inside_lng);
        assert!(d <= radius, "point should be inside, got {d}m");

        let bbox = BoundingBox::around(lat, lng, radius);
        assert!(bbox.contains(tangent_lat, inside_lng), "{bbox:?}");
        assert!(bbox.contains(tangent_lat, lng + reach));
        assert!(!bbox.contains(tangent_lat, lng + reach * 1.01));
    }

    #[test]
    fn bounding_box_opens_when_circle_wraps_antimeridian() {
        let bbox = BoundingBox::around(0.0, 179.9, 50_000.0);
        assert_eq!((bbox.min_lng, bbox.max_lng), (-180.0, 180.0));
    }

    #[test]
    fn bounding_box_near_pole_opens_longitude() {
        let bbox = BoundingBox::around(89.99, 0.0, 5_000.0);
        assert_eq!(bbox.min_lng, -180.0);
        assert_eq!(bbox.max_lng, 180.0);
    }
}
