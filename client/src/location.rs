//! Location provider: device geolocation plus reverse geocoding.
//!
//! State machine per request:
//!   idle → requesting → granted | denied | unavailable | timed-out
//!
//! Geocoding failures never fail a request; they only leave the address
//! on the "unavailable" placeholder.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info, warn};

use moodwalk_common::address::{
    format_display_address, GeocodeDocument, ADDRESS_PENDING, ADDRESS_UNAVAILABLE,
    LOCATION_UNKNOWN,
};
use moodwalk_common::protocol::Location;

use crate::error::ClientError;

/// Why a position could not be obtained.  The display strings are the
/// messages shown next to the address badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GeolocationError {
    #[error("위치 정보 접근이 거부되었습니다.")]
    PermissionDenied,
    #[error("위치 정보를 사용할 수 없습니다.")]
    PositionUnavailable,
    #[error("위치 정보 요청 시간이 초과되었습니다.")]
    Timeout,
    #[error("GPS를 지원하지 않는 환경입니다.")]
    Unsupported,
    #[error("지도 API가 로드되지 않았습니다.")]
    MapsUnavailable,
}

/// Platform geolocation.
#[async_trait]
pub trait Geolocator: Send + Sync {
    fn is_supported(&self) -> bool {
        true
    }

    /// One position fix; a cached fix no older than `max_age` is acceptable.
    async fn current_position(
        &self,
        timeout: Duration,
        max_age: Duration,
    ) -> Result<Location, GeolocationError>;
}

/// Coordinates → administrative address.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn coord_to_address(&self, location: Location)
        -> Result<Vec<GeocodeDocument>, ClientError>;
}

/// A geolocator that always reports the same configured position.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedGeolocator {
    position: Option<Location>,
}

impl FixedGeolocator {
    pub fn new(position: Option<Location>) -> Self {
        FixedGeolocator { position }
    }
}

#[async_trait]
impl Geolocator for FixedGeolocator {
    async fn current_position(
        &self,
        _timeout: Duration,
        _max_age: Duration,
    ) -> Result<Location, GeolocationError> {
        self.position.ok_or(GeolocationError::PositionUnavailable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocationPhase {
    #[default]
    Idle,
    Requesting,
    Granted,
    Denied,
    Unavailable,
    TimedOut,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationState {
    pub current_location: Option<Location>,
    pub current_address: String,
    pub permission: Option<Permission>,
    pub error: Option<String>,
    pub is_getting_location: bool,
    pub phase: LocationPhase,
}

pub struct LocationProvider {
    geolocator: Option<Arc<dyn Geolocator>>,
    geocoder: Option<Arc<dyn ReverseGeocoder>>,
    state: watch::Sender<LocationState>,
    timeout: Duration,
    max_age: Duration,
}

impl LocationProvider {
    pub fn new(
        geolocator: Option<Arc<dyn Geolocator>>,
        geocoder: Option<Arc<dyn ReverseGeocoder>>,
        timeout: Duration,
        max_age: Duration,
    ) -> Self {
        let (state, _) = watch::channel(LocationState::default());
        LocationProvider { geolocator, geocoder, state, timeout, max_age }
    }

    pub fn subscribe(&self) -> watch::Receiver<LocationState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> LocationState {
        self.state.borrow().clone()
    }

    pub fn current_location(&self) -> Option<Location> {
        self.state.borrow().current_location
    }

    pub fn current_address(&self) -> String {
        self.state.borrow().current_address.clone()
    }

    /// Acquire the device position, then resolve its display address.
    pub async fn request_gps_location(&self) -> Result<Location, GeolocationError> {
        let geolocator = match &self.geolocator {
            Some(g) if g.is_supported() => g.clone(),
            _ => return Err(self.reject(GeolocationError::Unsupported)),
        };
        let geocoder = match &self.geocoder {
            Some(g) => g.clone(),
            None => return Err(self.reject(GeolocationError::MapsUnavailable)),
        };

        self.state.send_modify(|s| {
            s.is_getting_location = true;
            s.error = None;
            s.current_address = ADDRESS_PENDING.to_string();
            s.phase = LocationPhase::Requesting;
        });
        info!("Requesting device location");

        let fix = tokio::time::timeout(
            self.timeout,
            geolocator.current_position(self.timeout, self.max_age),
        )
        .await
        .unwrap_or(Err(GeolocationError::Timeout));

        let location = match fix {
            Ok(location) => location,
            Err(e) => {
                error!("Location request failed: {e}");
                self.state.send_modify(|s| {
                    s.error = Some(e.to_string());
                    s.current_address = LOCATION_UNKNOWN.to_string();
                    s.is_getting_location = false;
                    s.phase = match e {
                        GeolocationError::PermissionDenied => LocationPhase::Denied,
                        GeolocationError::Timeout => LocationPhase::TimedOut,
                        _ => LocationPhase::Unavailable,
                    };
                    if e == GeolocationError::PermissionDenied {
                        s.permission = Some(Permission::Denied);
                    }
                });
                return Err(e);
            }
        };

        info!("Location acquired: {}, {}", location.latitude, location.longitude);
        self.state.send_modify(|s| {
            s.current_location = Some(location);
            s.permission = Some(Permission::Granted);
            s.phase = LocationPhase::Granted;
        });

        let address = match geocoder.coord_to_address(location).await {
            Ok(docs) => match docs.first() {
                Some(doc) => format_display_address(doc),
                None => {
                    warn!("Reverse geocoding returned no documents");
                    ADDRESS_UNAVAILABLE.to_string()
                }
            },
            Err(e) => {
                warn!("Reverse geocoding failed: {e}");
                ADDRESS_UNAVAILABLE.to_string()
            }
        };
        info!("Resolved address: {address}");

        self.state.send_modify(|s| {
            s.current_address = address;
            s.is_getting_location = false;
        });
        Ok(location)
    }

    /// Replace the displayed address (e.g. after a manual correction).
    pub fn set_current_address(&self, address: impl Into<String>) {
        let address = address.into();
        self.state.send_modify(|s| s.current_address = address);
    }

    fn reject(&self, e: GeolocationError) -> GeolocationError {
        error!("Location request rejected: {e}");
        self.state.send_modify(|s| s.error = Some(e.to_string()));
        e
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn test_success_sets_location_and_address() {
        let p = provider(FakeGeolocator::at(37.5, 127.0), FakeGeocoder::seoul());
        let loc = p.request_gps_location().await.unwrap();
        assert_eq!(loc, Location { latitude: 37.5, longitude: 127.0 });

        let s = p.state();
        assert_eq!(s.current_location, Some(loc));
        assert_eq!(s.current_address, "서울시 성북구 삼선동");
        assert_eq!(s.permission, Some(Permission::Granted));
        assert_eq!(s.phase, LocationPhase::Granted);
        assert!(!s.is_getting_location);
    }

    #[tokio::test]
    async fn test_geocoding_failure_is_soft() {
        let p = provider(FakeGeolocator::at(37.5, 127.0), FakeGeocoder::failing());
        assert!(p.request_gps_location().await.is_ok());
        assert_eq!(p.current_address(), ADDRESS_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let p = provider(
            FakeGeolocator::failing(GeolocationError::PermissionDenied),
            FakeGeocoder::seoul(),
        );
        let err = p.request_gps_location().await.unwrap_err();
        assert_eq!(err, GeolocationError::PermissionDenied);

        let s = p.state();
        assert_eq!(s.permission, Some(Permission::Denied));
        assert_eq!(s.phase, LocationPhase::Denied);
        assert_eq!(s.error.as_deref(), Some("위치 정보 접근이 거부되었습니다."));
        assert_eq!(s.current_address, LOCATION_UNKNOWN);
        assert!(s.current_location.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fix_times_out() {
        let geo = Arc::new(FakeGeolocator {
            result: std::sync::Mutex::new(Ok(Location { latitude: 1.0, longitude: 1.0 })),
            delay: Duration::from_secs(60),
            calls: Default::default(),
        });
        let p = provider(geo, FakeGeocoder::seoul());
        assert_eq!(p.request_gps_location().await, Err(GeolocationError::Timeout));
        assert_eq!(p.state().phase, LocationPhase::TimedOut);
    }

    #[tokio::test]
    async fn test_rejects_without_platform_support() {
        let p = LocationProvider::new(
            None,
            Some(FakeGeocoder::seoul()),
            Duration::from_secs(10),
            Duration::from_secs(300),
        );
        assert_eq!(p.request_gps_location().await, Err(GeolocationError::Unsupported));

        let geo = FakeGeolocator::at(37.5, 127.0);
        let p = LocationProvider::new(
            Some(geo.clone()),
            None,
            Duration::from_secs(10),
            Duration::from_secs(300),
        );
        assert_eq!(p.request_gps_location().await, Err(GeolocationError::MapsUnavailable));
        assert_eq!(geo.calls(), 0);
    }
}
