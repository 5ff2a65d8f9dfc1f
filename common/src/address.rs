//! Reverse-geocoding result types and the display-address policy.
//!
//! The types mirror the `coord2address` document of the Kakao Local API:
//! each document carries an optional road-name address and an optional
//! lot-number address, both split into administrative region levels.

use serde::{Deserialize, Serialize};

/// Shown when no address source exists in a geocoding document.
pub const NO_ADDRESS_INFO: &str = "주소 정보 없음";

/// Shown when reverse geocoding failed or was not attempted.
pub const ADDRESS_UNAVAILABLE: &str = "주소를 확인할 수 없습니다.";

/// Shown while a position request is in flight.
pub const ADDRESS_PENDING: &str = "위치 정보 확인 중...";

/// Shown after a position request failed.
pub const LOCATION_UNKNOWN: &str = "위치를 확인할 수 없습니다.";

/// One address source split into region levels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionAddress {
    #[serde(default)]
    pub address_name: String,
    #[serde(default)]
    pub region_1depth_name: String,
    #[serde(default)]
    pub region_2depth_name: String,
    #[serde(default)]
    pub region_3depth_name: String,
    /// Only present on road-name addresses.
    #[serde(default)]
    pub building_name: String,
}

/// A single reverse-geocoding hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodeDocument {
    #[serde(default)]
    pub road_address: Option<RegionAddress>,
    /// Lot-number (jibun) address.
    #[serde(default)]
    pub address: Option<RegionAddress>,
}

/// Envelope of a `coord2address` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResponse {
    #[serde(default)]
    pub documents: Vec<GeocodeDocument>,
}

/// Collapse `특별시` / `광역시` into a plain `시` suffix.
pub fn normalize_region1(region: &str) -> String {
    region.replacen("특별시", "시", 1).replacen("광역시", "시", 1)
}

/// Format a document as `"{level1} {level2} {level3}"`.
///
/// The road-name address is preferred.  When it lacks a third level (and
/// a building name to stand in for it) the level is borrowed from the
/// lot-number address before falling back to two levels.
pub fn format_display_address(doc: &GeocodeDocument) -> String {
    let display = match (&doc.road_address, &doc.address) {
        (Some(road), jibun) => {
            let region3 = non_empty(&road.region_3depth_name)
                .or_else(|| non_empty(&road.building_name))
                .or_else(|| jibun.as_ref().and_then(|j| non_empty(&j.region_3depth_name)));
            join_levels(road, region3)
        }
        (None, Some(jibun)) => join_levels(jibun, non_empty(&jibun.region_3depth_name)),
        (None, None) => NO_ADDRESS_INFO.to_string(),
    };
    display.trim().to_string()
}

fn join_levels(addr: &RegionAddress, region3: Option<&str>) -> String {
    let region1 = normalize_region1(&addr.region_1depth_name);
    match region3 {
        Some(r3) => format!("{} {} {}", region1, addr.region_2depth_name, r3),
        None => format!("{} {}", region1, addr.region_2depth_name),
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(r1: &str, r2: &str, r3: &str) -> RegionAddress {
        RegionAddress {
            region_1depth_name: r1.into(),
            region_2depth_name: r2.into(),
            region_3depth_name: r3.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_road_address_preferred_and_normalized() {
        let doc = GeocodeDocument {
            road_address: Some(region("서울특별시", "강남구", "역삼동")),
            address: Some(region("서울특별시", "강남구", "대치동")),
        };
        assert_eq!(format_display_address(&doc), "서울시 강남구 역삼동");
    }

    #[test]
    fn test_level3_borrowed_from_lot_address() {
        let doc = GeocodeDocument {
            road_address: Some(region("부산광역시", "해운대구", "")),
            address: Some(region("부산광역시", "해운대구", "우동")),
        };
        assert_eq!(format_display_address(&doc), "부산시 해운대구 우동");
    }

    #[test]
    fn test_building_name_stands_in_for_level3() {
        let mut road = region("서울특별시", "성북구", "");
        road.building_name = "한성대학교".into();
        let doc = GeocodeDocument { road_address: Some(road), address: None };
        assert_eq!(format_display_address(&doc), "서울시 성북구 한성대학교");
    }

    #[test]
    fn test_two_level_fallbacks() {
        let doc = GeocodeDocument {
            road_address: Some(region("경기도", "수원시", "")),
            address: None,
        };
        assert_eq!(format_display_address(&doc), "경기도 수원시");

        let doc = GeocodeDocument { road_address: None, address: Some(region("대구광역시", "중구", "")) };
        assert_eq!(format_display_address(&doc), "대구시 중구");
    }

    #[test]
    fn test_no_source() {
        assert_eq!(format_display_address(&GeocodeDocument::default()), NO_ADDRESS_INFO);
    }
}
