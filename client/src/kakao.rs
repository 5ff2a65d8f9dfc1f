//! Reverse geocoding through the Kakao Local REST API.
//!
//! Uses `GET /v2/local/geo/coord2address.json`, which returns one document
//! with an optional road-name address and an optional lot-number address.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use moodwalk_common::address::{GeocodeDocument, GeocodeResponse};
use moodwalk_common::protocol::Location;

use crate::error::ClientError;
use crate::location::ReverseGeocoder;

pub const KAKAO_LOCAL_API: &str = "https://dapi.kakao.com";

pub struct KakaoGeocoder {
    http: reqwest::Client,
    base_url: String,
    rest_key: String,
}

impl KakaoGeocoder {
    pub fn new(rest_key: &str) -> Result<Self, ClientError> {
        Self::with_base_url(KAKAO_LOCAL_API, rest_key)
    }

    pub fn with_base_url(base_url: &str, rest_key: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(KakaoGeocoder {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            rest_key: rest_key.to_string(),
        })
    }
}

#[async_trait]
impl ReverseGeocoder for KakaoGeocoder {
    async fn coord_to_address(
        &self,
        location: Location,
    ) -> Result<Vec<GeocodeDocument>, ClientError> {
        // The API takes x = longitude, y = latitude.
        let url = format!(
            "{}/v2/local/geo/coord2address.json?x={}&y={}",
            self.base_url, location.longitude, location.latitude
        );
        let resp = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, format!("KakaoAK {}", self.rest_key))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Api { status: status.as_u16(), message: None });
        }

        let body: GeocodeResponse = resp.json().await?;
        debug!("coord2address returned {} document(s)", body.documents.len());
        Ok(body.documents)
    }
}
