//! HTTP protocol types exchanged with the recommendation backend.
//!
//! Every field the backend may omit is optional or defaulted so that a
//! partial payload still decodes; rendering code decides what to show.

use serde::{Deserialize, Deserializer, Serialize};

/// Treats an explicit `null` like a missing key.
fn null_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Option::unwrap_or_default)
}

// ─── Analyze ─────────────────────────────────────────────────────────────────

/// A device position in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Body of `POST /api/analyze`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub text: String,
    /// Serialised as `null` when no position could be resolved.
    pub location: Option<Location>,
}

/// Response of `POST /api/analyze`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, deserialize_with = "null_default")]
    pub analysis: Analysis,
    #[serde(default, deserialize_with = "null_default")]
    pub trail: TrailPayload,
}

/// Emotion analysis and music recommendations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub emotions: Vec<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comfort_message: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub recommendations: Vec<MusicRec>,
    /// Business-level failure reported inside a 2xx payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Analysis {
    /// Display label: the singular `emotion` when present, else the joined
    /// `emotions` list, else `-`.
    pub fn emotion_label(&self) -> String {
        emotion_label(self.emotion.as_deref(), &self.emotions).unwrap_or_else(|| "-".into())
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Shared label rule for analysis results and history entries.
pub fn emotion_label(emotion: Option<&str>, emotions: &[String]) -> Option<String> {
    match emotion {
        Some(e) if !e.is_empty() => Some(e.to_string()),
        _ if !emotions.is_empty() => Some(emotions.join(", ")),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MusicRec {
    #[serde(default, deserialize_with = "null_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_default")]
    pub artist: String,
    #[serde(default, deserialize_with = "null_default")]
    pub reason: String,
}

/// Trail recommendations attached to an analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrailPayload {
    /// Top-ranked trails, already sorted by the backend.
    #[serde(default, deserialize_with = "null_default")]
    pub trails: Vec<Trail>,
    #[serde(default, deserialize_with = "null_default")]
    pub more: Vec<Trail>,
    #[serde(default, deserialize_with = "null_default")]
    pub positive_emotions_used: Vec<String>,
}

// ─── Trail ───────────────────────────────────────────────────────────────────

/// A recommended walking route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trail {
    pub name: String,
    #[serde(default, deserialize_with = "null_default")]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
}

impl Trail {
    /// Number of raw route entries (before validation).
    pub fn route_len(&self) -> usize {
        self.route.as_ref().map_or(0, |r| r.coordinates.len())
    }
}

/// A `LineString`-style route.
///
/// Points are kept as raw JSON so that malformed entries survive decoding
/// and can be dropped individually by [`crate::geo::parse_route`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// `[lng, lat]` pairs.
    #[serde(default, deserialize_with = "null_default")]
    pub coordinates: Vec<serde_json::Value>,
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// Stored user profile (`GET /api/me` → `user`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, deserialize_with = "null_default")]
    pub username: String,
    #[serde(default, deserialize_with = "null_default")]
    pub email: String,
    #[serde(default, deserialize_with = "null_default")]
    pub music_taste: String,
    #[serde(default, deserialize_with = "null_default")]
    pub residence: String,
}

/// Body of `POST /api/register`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub music_taste: String,
    pub residence: String,
}

/// Body of `PUT /api/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub username: String,
    pub music_taste: String,
    pub residence: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeResponse {
    #[serde(default, deserialize_with = "null_default")]
    pub user: Profile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub user: Profile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub updated_fields: Vec<String>,
}

// ─── History ─────────────────────────────────────────────────────────────────

/// One past analysis (`GET /api/history`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub emotions: Vec<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub keywords: Vec<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub comfort_message: String,
    #[serde(default, deserialize_with = "null_default")]
    pub recommendations: Vec<MusicRec>,
    #[serde(default, deserialize_with = "null_default")]
    pub trails: Vec<Trail>,
    #[serde(default, deserialize_with = "null_default")]
    pub more_trails: Vec<Trail>,
    #[serde(default, deserialize_with = "null_default")]
    pub positive_emotions_used: Vec<String>,
    /// ISO-8601, newest first as returned by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default, deserialize_with = "null_default")]
    pub history: Vec<HistoryItem>,
}

// ─── Generic ─────────────────────────────────────────────────────────────────

/// Acknowledgement returned by mutating endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_emotion_label_prefers_singular() {
        let a = Analysis {
            emotion: Some("기쁨".into()),
            emotions: vec!["설렘".into(), "평온".into()],
            ..Default::default()
        };
        assert_eq!(a.emotion_label(), "기쁨");
    }

    #[test]
    fn test_emotion_label_joins_list_and_falls_back() {
        let a = Analysis {
            emotion: Some(String::new()),
            emotions: vec!["설렘".into(), "평온".into()],
            ..Default::default()
        };
        assert_eq!(a.emotion_label(), "설렘, 평온");
        assert_eq!(Analysis::default().emotion_label(), "-");
    }

    #[test]
    fn test_request_serialises_null_location() {
        let req = AnalysisRequest { text: "hi".into(), location: None };
        assert_eq!(serde_json::to_value(&req).unwrap(), json!({"text": "hi", "location": null}));
    }

    #[test]
    fn test_decode_partial_result() {
        let raw = json!({
            "analysis": {"emotions": ["슬픔"], "error": "gemini_failed"},
            "trail": {"trails": [{
                "name": "장이소공원",
                "address": "서울",
                "score": 8.5,
                "route": {"type": "LineString", "coordinates": [[127.0, 37.5], ["bad", null]]}
            }]}
        });
        let result: AnalysisResult = serde_json::from_value(raw).unwrap();
        assert!(result.analysis.has_error());
        assert_eq!(result.trail.trails[0].route_len(), 2);
        assert!(result.trail.more.is_empty());
    }

    #[test]
    fn test_decode_null_fields_as_empty() {
        let raw = json!({
            "analysis": {
                "emotion": "기쁨",
                "keywords": null,
                "comfort_message": null,
                "recommendations": null
            },
            "trail": {"trails": null, "more": null, "positive_emotions_used": null}
        });
        let result: AnalysisResult = serde_json::from_value(raw).unwrap();
        assert!(result.analysis.keywords.is_empty());
        assert!(result.analysis.recommendations.is_empty());
        assert!(result.analysis.comfort_message.is_none());
        assert!(result.trail.trails.is_empty());

        let rec: MusicRec = serde_json::from_value(json!({"title": "봄날", "artist": null, "reason": null})).unwrap();
        assert_eq!(rec.title, "봄날");
        assert!(rec.artist.is_empty());
    }

    #[test]
    fn test_decode_history_row_with_nulls() {
        let raw = json!({"history": [{
            "id": "h1",
            "prompt": null,
            "emotions": null,
            "keywords": null,
            "comfort_message": null,
            "recommendations": null,
            "trails": null,
            "more_trails": null,
            "positive_emotions_used": null,
            "timestamp": null
        }]});
        let history: HistoryResponse = serde_json::from_value(raw).unwrap();
        let item = &history.history[0];
        assert_eq!(item.id, "h1");
        assert!(item.comfort_message.is_empty());
        assert!(item.keywords.is_empty() && item.trails.is_empty());
    }
}
