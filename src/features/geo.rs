//! Great-circle distance

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance in kilometres between two points given in degrees.
pub fn haversine_km(lat1: f64, long1: f64, lat2: f64, long2: f64) -> f64 {
    let (lat1, long1, lat2, long2) = (
        lat1.to_radians(),
        long1.to_radians(),
        lat2.to_radians(),
        long2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlong = long2 - long1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlong / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_distance() {
        // New York to London, roughly 5570 km
        let d = haversine_km(40.7128, -74.0060, 51.5074, -0.1278);
        assert!((d - 5570.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn test_quarter_meridian() {
        let d = haversine_km(0.0, 0.0, 90.0, 0.0);
        assert!((d - EARTH_RADIUS_KM * std::f64::consts::FRAC_PI_2).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn distance_to_self_is_zero(lat in -90.0f64..90.0, long in -180.0f64..180.0) {
            prop_assert_eq!(haversine_km(lat, long, lat, long), 0.0);
        }

        #[test]
        fn distance_is_symmetric(
            lat1 in -90.0f64..90.0,
            long1 in -180.0f64..180.0,
            lat2 in -90.0f64..90.0,
            long2 in -180.0f64..180.0,
        ) {
            let there = haversine_km(lat1, long1, lat2, long2);
            let back = haversine_km(lat2, long2, lat1, long1);
            prop_assert!((there - back).abs() < 1e-9);
            prop_assert!(there >= 0.0);
        }
    }
}
