//! "My history" page: past analyses, detail view and deletion.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use moodwalk_common::protocol::{HistoryItem, Trail};
use moodwalk_common::timefmt::format_history_date;

use crate::api::ApiClient;
use crate::auth::AuthSession;

pub const LOAD_FAILED: &str = "이용 내역을 불러오는데 실패했습니다.";
pub const DELETE_FAILED: &str = "내역 삭제에 실패했습니다.";
pub const DELETE_CONFIRM: &str = "이 내역을 삭제하시겠습니까?";
pub const NO_EMOTION: &str = "감정 분석 결과 없음";
pub const NO_TRAILS: &str = "산책로 정보 없음";

/// More-trail entries shown in the detail view.
const DETAIL_MORE_TRAILS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryState {
    pub items: Vec<HistoryItem>,
    pub loading: bool,
    pub error: Option<String>,
    /// Item shown in the detail view.
    pub selected: Option<HistoryItem>,
}

impl HistoryState {
    pub fn count_label(&self) -> String {
        format!("총 {}개의 추천 내역이 있습니다", self.items.len())
    }
}

/// Emotion line of a history entry: the list when present, else the single
/// label.
pub fn emotion_summary(item: &HistoryItem) -> String {
    if !item.emotions.is_empty() {
        return item.emotions.join(", ");
    }
    item.emotion
        .clone()
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| NO_EMOTION.to_string())
}

pub fn trail_summary(trails: &[Trail]) -> String {
    match trails.first() {
        Some(first) => format!("{} 외 {}곳", first.name, trails.len() - 1),
        None => NO_TRAILS.to_string(),
    }
}

/// One row of the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRow {
    pub id: String,
    pub date: String,
    pub emotion: String,
    pub trails: String,
}

impl From<&HistoryItem> for HistoryRow {
    fn from(item: &HistoryItem) -> Self {
        HistoryRow {
            id: item.id.clone(),
            date: format_history_date(item.timestamp.as_deref()),
            emotion: emotion_summary(item),
            trails: trail_summary(&item.trails),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedTrail {
    pub rank: usize,
    pub name: String,
    pub address: String,
    pub score: String,
}

/// Detail view of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryDetail {
    pub date: String,
    pub prompt: String,
    pub emotion: String,
    pub comfort: String,
    /// `title - artist` and reason; empty shows `music_placeholder`.
    pub music: Vec<(String, String)>,
    pub trails: Vec<RankedTrail>,
    pub more_trails: Vec<RankedTrail>,
}

impl HistoryDetail {
    pub const NO_PROMPT: &'static str = "입력 내용 없음";
    pub const NO_COMFORT: &'static str = "공감 메시지 없음";
    pub const NO_MUSIC: &'static str = "추천 음악 정보 없음";
    pub const NO_TRAILS: &'static str = "추천 산책로 정보 없음";

    pub fn project(item: &HistoryItem) -> Self {
        let non_empty = |s: &str, fallback: &str| {
            if s.trim().is_empty() { fallback.to_string() } else { s.to_string() }
        };
        let ranked = |trails: &[Trail], first_rank: usize| -> Vec<RankedTrail> {
            trails
                .iter()
                .enumerate()
                .map(|(i, t)| RankedTrail {
                    rank: first_rank + i,
                    name: t.name.clone(),
                    address: t.address.clone(),
                    score: t.score.map(|s| format!("매칭도: {s}")).unwrap_or_default(),
                })
                .collect()
        };
        let more: Vec<Trail> = item.more_trails.iter().take(DETAIL_MORE_TRAILS).cloned().collect();

        HistoryDetail {
            date: format_history_date(item.timestamp.as_deref()),
            prompt: non_empty(&item.prompt, Self::NO_PROMPT),
            emotion: emotion_summary(item),
            comfort: non_empty(&item.comfort_message, Self::NO_COMFORT),
            music: item
                .recommendations
                .iter()
                .map(|m| (format!("{} - {}", m.title, m.artist), m.reason.clone()))
                .collect(),
            trails: ranked(&item.trails, 1),
            more_trails: ranked(&more, item.trails.len() + 1),
        }
    }

    pub fn music_placeholder(&self) -> Option<&'static str> {
        self.music.is_empty().then_some(Self::NO_MUSIC)
    }

    pub fn trails_placeholder(&self) -> Option<&'static str> {
        self.trails.is_empty().then_some(Self::NO_TRAILS)
    }
}

pub struct HistoryBook {
    api: ApiClient,
    auth: Arc<AuthSession>,
    state: watch::Sender<HistoryState>,
}

impl HistoryBook {
    pub fn new(api: ApiClient, auth: Arc<AuthSession>) -> Self {
        let (state, _) = watch::channel(HistoryState { loading: true, ..Default::default() });
        HistoryBook { api, auth, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<HistoryState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> HistoryState {
        self.state.borrow().clone()
    }

    pub fn rows(&self) -> Vec<HistoryRow> {
        self.state.borrow().items.iter().map(HistoryRow::from).collect()
    }

    pub async fn load(&self) {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
        let headers = self.auth.auth_headers().await;
        let outcome = self.api.history(&headers).await;
        self.state.send_modify(|s| {
            s.loading = false;
            match outcome {
                Ok(resp) => {
                    info!("Loaded {} history item(s)", resp.history.len());
                    s.items = resp.history;
                }
                Err(e) => {
                    error!("Failed to fetch history: {e}");
                    s.error = Some(LOAD_FAILED.to_string());
                }
            }
        });
    }

    pub fn open_detail(&self, id: &str) -> Option<HistoryDetail> {
        let item = self.state.borrow().items.iter().find(|i| i.id == id).cloned()?;
        let detail = HistoryDetail::project(&item);
        self.state.send_modify(|s| s.selected = Some(item));
        Some(detail)
    }

    pub fn close_detail(&self) {
        self.state.send_modify(|s| s.selected = None);
    }

    /// Delete an entry after `confirm` accepts [`DELETE_CONFIRM`].
    /// Returns whether the entry was removed.
    pub async fn delete(&self, id: &str, confirm: impl FnOnce(&str) -> bool) -> bool {
        if !confirm(DELETE_CONFIRM) {
            return false;
        }
        let headers = self.auth.auth_headers().await;
        match self.api.delete_history(id, &headers).await {
            Ok(_) => {
                self.state.send_modify(|s| {
                    s.items.retain(|i| i.id != id);
                    if s.selected.as_ref().is_some_and(|sel| sel.id == id) {
                        s.selected = None;
                    }
                });
                info!("Deleted history item {id}");
                true
            }
            Err(e) => {
                error!("Failed to delete history: {e}");
                self.state.send_modify(|s| s.error = Some(DELETE_FAILED.to_string()));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use moodwalk_common::protocol::MusicRec;

    use super::*;

    fn item() -> HistoryItem {
        HistoryItem {
            id: "h1".into(),
            prompt: "산책하고 싶어요".into(),
            emotion: Some("기쁨".into()),
            emotions: vec!["설렘".into(), "평온".into()],
            recommendations: vec![MusicRec {
                title: "봄날".into(),
                artist: "BTS".into(),
                reason: "".into(),
            }],
            trails: (1..=3)
                .map(|i| Trail { name: format!("t{i}"), score: Some(0.9), ..Default::default() })
                .collect(),
            more_trails: (4..=12).map(|i| Trail { name: format!("t{i}"), ..Default::default() }).collect(),
            timestamp: Some("2024-03-05T01:30:00Z".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_summaries() {
        let it = item();
        assert_eq!(emotion_summary(&it), "설렘, 평온");
        assert_eq!(trail_summary(&it.trails), "t1 외 2곳");
        assert_eq!(trail_summary(&[]), NO_TRAILS);

        let bare = HistoryItem { id: "x".into(), ..Default::default() };
        assert_eq!(emotion_summary(&bare), NO_EMOTION);
        let row = HistoryRow::from(&bare);
        assert_eq!(row.date, "날짜 정보 없음");
    }

    #[test]
    fn test_detail_projection() {
        let d = HistoryDetail::project(&item());
        assert_eq!(d.date, "2024년 3월 5일 10:30");
        assert_eq!(d.comfort, HistoryDetail::NO_COMFORT);
        assert_eq!(d.music[0].0, "봄날 - BTS");
        assert_eq!(d.trails[2].rank, 3);
        assert_eq!(d.trails[0].score, "매칭도: 0.9");
        assert_eq!(d.more_trails.len(), 5);
        assert_eq!(d.more_trails[0].rank, 4);
        assert!(d.music_placeholder().is_none());
    }

    #[test]
    fn test_count_label() {
        let s = HistoryState { items: vec![item()], ..Default::default() };
        assert_eq!(s.count_label(), "총 1개의 추천 내역이 있습니다");
    }
}
