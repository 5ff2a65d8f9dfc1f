//! Configuration parsing – reads a `KEY=VALUE` file (`moodwalk.conf`).
//!
//! The same file is read by the CLI and by anything embedding the client
//! crate; each ignores the fields it does not need.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::protocol::Location;

const DEFAULT_SELECTED_TRAIL_TTL_HOURS: i64 = 24;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // ── backend ──────────────────────────────────────────────────────
    /// Origin every `/api/*` call is issued against.
    pub api_base_url: String,
    pub analyze_timeout_ms: u64,
    pub request_timeout_secs: u64,

    // ── location ─────────────────────────────────────────────────────
    pub location_timeout_secs: u64,
    pub location_max_age_secs: u64,
    /// Fixed device position for headless runs (no platform geolocation).
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub kakao_rest_key: Option<String>,

    // ── auth ─────────────────────────────────────────────────────────
    pub firebase_api_key: Option<String>,
    pub token_refresh_secs: u64,
    pub token_retry_backoff_ms: u64,

    // ── trail selection / community ──────────────────────────────────
    pub selection_nav_delay_secs: u64,
    pub selected_trail_ttl_hours: i64,
    pub chat_history_limit: usize,

    // ── local persistence ────────────────────────────────────────────
    pub store_dir: PathBuf,
}

impl Config {
    /// Default config path.
    pub fn default_path() -> &'static str {
        "/etc/moodwalk/moodwalk.conf"
    }

    pub fn analyze_timeout(&self) -> Duration {
        Duration::from_millis(self.analyze_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn location_timeout(&self) -> Duration {
        Duration::from_secs(self.location_timeout_secs)
    }

    pub fn location_max_age(&self) -> Duration {
        Duration::from_secs(self.location_max_age_secs)
    }

    pub fn token_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.token_refresh_secs)
    }

    pub fn token_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.token_retry_backoff_ms)
    }

    pub fn selection_nav_delay(&self) -> Duration {
        Duration::from_secs(self.selection_nav_delay_secs)
    }

    /// Out-of-range values fall back to 24 h.
    pub fn selected_trail_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.selected_trail_ttl_hours).unwrap_or_else(|| {
            warn!(
                "SELECTED_TRAIL_TTL_HOURS={} is out of range, using {DEFAULT_SELECTED_TRAIL_TTL_HOURS}",
                self.selected_trail_ttl_hours
            );
            chrono::Duration::hours(DEFAULT_SELECTED_TRAIL_TTL_HOURS)
        })
    }

    /// The configured fixed position, if both coordinates are present.
    pub fn fixed_location(&self) -> Option<Location> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Location { latitude, longitude }),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        from_map(&HashMap::new())
    }
}

/// Parse a `KEY=VALUE` configuration file.
///
/// Lines starting with `#` are comments.  Values may be optionally
/// double-quoted.  Unknown keys are silently ignored.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;

    let map = parse_conf(&text);
    info!("Loaded config from {}", path.display());
    Ok(from_map(&map))
}

fn from_map(map: &HashMap<String, String>) -> Config {
    let get = |key: &str| -> Option<String> { map.get(key).cloned().filter(|s| !s.is_empty()) };
    let get_u64 = |key: &str, default: u64| -> u64 {
        get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    };
    let get_f64 = |key: &str| -> Option<f64> { get(key).and_then(|v| v.parse().ok()) };

    Config {
        api_base_url: get("API_BASE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| "http://localhost:5000".into()),
        analyze_timeout_ms: get_u64("ANALYZE_TIMEOUT_MS", 300_000),
        request_timeout_secs: get_u64("REQUEST_TIMEOUT_SECS", 30),

        location_timeout_secs: get_u64("LOCATION_TIMEOUT_SECS", 10),
        location_max_age_secs: get_u64("LOCATION_MAX_AGE_SECS", 300),
        latitude: get_f64("LATITUDE"),
        longitude: get_f64("LONGITUDE"),
        kakao_rest_key: get("KAKAO_REST_KEY"),

        firebase_api_key: get("FIREBASE_API_KEY"),
        token_refresh_secs: get_u64("TOKEN_REFRESH_SECS", 3600),
        token_retry_backoff_ms: get_u64("TOKEN_RETRY_BACKOFF_MS", 500),

        selection_nav_delay_secs: get_u64("SELECTION_NAV_DELAY_SECS", 3),
        selected_trail_ttl_hours: get("SELECTED_TRAIL_TTL_HOURS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SELECTED_TRAIL_TTL_HOURS),
        chat_history_limit: get("CHAT_HISTORY_LIMIT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(100),

        store_dir: PathBuf::from(get("STORE_DIR").unwrap_or_else(|| "/var/lib/moodwalk".into())),
    }
}

/// Parse `KEY=VALUE` lines into a map, stripping optional double-quotes.
fn parse_conf(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let key = key.trim();
            let val = val.trim().trim_matches('"');
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conf() {
        let text = r#"
# comment
API_BASE_URL="http://api.example:8080/"
LATITUDE=37.5
LONGITUDE="127.0"
KAKAO_REST_KEY=
"#;
        let map = parse_conf(text);
        assert_eq!(map["API_BASE_URL"], "http://api.example:8080/");
        assert_eq!(map["LONGITUDE"], "127.0");
        assert_eq!(map["KAKAO_REST_KEY"], "");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:5000");
        assert_eq!(config.analyze_timeout(), Duration::from_millis(300_000));
        assert_eq!(config.location_timeout(), Duration::from_secs(10));
        assert_eq!(config.location_max_age(), Duration::from_secs(300));
        assert_eq!(config.token_refresh_interval(), Duration::from_secs(3600));
        assert_eq!(config.token_retry_backoff(), Duration::from_millis(500));
        assert_eq!(config.selection_nav_delay(), Duration::from_secs(3));
        assert_eq!(config.selected_trail_ttl(), chrono::Duration::hours(24));
        assert_eq!(config.chat_history_limit, 100);
        assert!(config.fixed_location().is_none());
    }

    #[test]
    fn test_load_file() {
        let tmp = tempfile(
            "API_BASE_URL=http://api.example:8080/\nLATITUDE=37.5\nLONGITUDE=127.0\nKAKAO_REST_KEY=\n",
        );
        let config = load(tmp.as_path()).unwrap();
        assert_eq!(config.api_base_url, "http://api.example:8080");
        assert_eq!(
            config.fixed_location(),
            Some(Location { latitude: 37.5, longitude: 127.0 })
        );
        assert!(config.kakao_rest_key.is_none());
    }

    #[test]
    fn test_huge_ttl_falls_back_to_default() {
        let config = Config { selected_trail_ttl_hours: i64::MAX, ..Config::default() };
        assert_eq!(config.selected_trail_ttl(), chrono::Duration::hours(24));

        let config = Config { selected_trail_ttl_hours: 48, ..Config::default() };
        assert_eq!(config.selected_trail_ttl(), chrono::Duration::hours(48));
    }

    fn tempfile(content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("moodwalk_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.conf");
        std::fs::write(&path, content).unwrap();
        path
    }
}
