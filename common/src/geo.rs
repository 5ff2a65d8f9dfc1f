//! Coordinate validation and bounding boxes for trail routes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::Location;

/// A validated map position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Build a position, rejecting non-finite or out-of-range values.
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        valid.then_some(LatLng { lat, lng })
    }
}

impl From<Location> for LatLng {
    fn from(l: Location) -> Self {
        LatLng { lat: l.latitude, lng: l.longitude }
    }
}

/// Axis-aligned bounding box; starts empty and grows with [`Bounds::extend`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    extent: Option<(LatLng, LatLng)>,
}

impl Bounds {
    pub fn is_empty(&self) -> bool {
        self.extent.is_none()
    }

    pub fn extend(&mut self, p: LatLng) {
        self.extent = Some(match self.extent {
            None => (p, p),
            Some((sw, ne)) => (
                LatLng { lat: sw.lat.min(p.lat), lng: sw.lng.min(p.lng) },
                LatLng { lat: ne.lat.max(p.lat), lng: ne.lng.max(p.lng) },
            ),
        });
    }

    pub fn union(&mut self, other: &Bounds) {
        if let Some((sw, ne)) = other.extent {
            self.extend(sw);
            self.extend(ne);
        }
    }

    pub fn contains(&self, p: LatLng) -> bool {
        self.extent.is_some_and(|(sw, ne)| {
            (sw.lat..=ne.lat).contains(&p.lat) && (sw.lng..=ne.lng).contains(&p.lng)
        })
    }

    /// South-west and north-east corners.
    pub fn corners(&self) -> Option<(LatLng, LatLng)> {
        self.extent
    }

    pub fn center(&self) -> Option<LatLng> {
        self.extent.map(|(sw, ne)| LatLng {
            lat: (sw.lat + ne.lat) / 2.0,
            lng: (sw.lng + ne.lng) / 2.0,
        })
    }
}

/// Result of validating a raw route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteParse {
    /// Valid points, in input order.
    pub points: Vec<LatLng>,
    /// Number of entries that were skipped.
    pub dropped: usize,
}

impl RouteParse {
    /// A polyline needs at least two valid points.
    pub fn is_drawable(&self) -> bool {
        self.points.len() >= 2
    }

    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds::default();
        for p in &self.points {
            b.extend(*p);
        }
        b
    }
}

/// Validate `[lng, lat]` route entries.
///
/// Entries that are not arrays of at least two numbers (or numeric
/// strings), or that fall outside the valid lat/lng ranges, are dropped.
pub fn parse_route(coordinates: &[Value]) -> RouteParse {
    let mut out = RouteParse::default();
    for entry in coordinates {
        match parse_point(entry) {
            Some(p) => out.points.push(p),
            None => {
                tracing::debug!("Skipping invalid route point: {entry}");
                out.dropped += 1;
            }
        }
    }
    out
}

fn parse_point(entry: &Value) -> Option<LatLng> {
    let pair = entry.as_array().filter(|a| a.len() >= 2)?;
    let lng = as_number(&pair[0])?;
    let lat = as_number(&pair[1])?;
    LatLng::new(lat, lng)
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
