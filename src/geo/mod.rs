use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

const EARTH_RADIUS_KM: f64 = 6_371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(alias = "longitude")]
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Decides when a courier position is worth sending as `current_location`.
///
/// A fix is reported when the courier moved at least `min_distance_m` since the
/// last reported fix, or when `min_interval` elapsed regardless of movement.
#[derive(Debug, Clone)]
pub struct LocationThrottle {
    min_distance_m: f64,
    min_interval: Duration,
    last_reported: Option<(GeoPoint, Instant)>,
    last_seen: Option<GeoPoint>,
}

impl LocationThrottle {
    pub fn new(min_distance_m: f64, min_interval: Duration) -> Self {
        Self {
            min_distance_m: min_distance_m.max(0.0),
            min_interval,
            last_reported: None,
            last_seen: None,
        }
    }

    pub fn should_report(&mut self, point: GeoPoint, now: Instant) -> bool {
        self.last_seen = Some(point);

        let report = match &self.last_reported {
            None => true,
            Some((last_point, last_at)) => {
                let moved_m = haversine_km(last_point, &point) * 1_000.0;
                moved_m >= self.min_distance_m
                    || now.saturating_duration_since(*last_at) >= self.min_interval
            }
        };

        if report {
            self.last_reported = Some((point, now));
        }
        report
    }

    pub fn last_seen(&self) -> Option<GeoPoint> {
        self.last_seen
    }

    pub fn reset(&mut self) {
        self.last_reported = None;
        self.last_seen = None;
    }
}
