//! Results page: projection of an analysis result, trail selection and the
//! single-trail map panel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use moodwalk_common::protocol::{AnalysisResult, Location, Trail};

use crate::coupons::{offer_for, CouponOffer};
use crate::error::ClientError;
use crate::map::{MapSurface, TrailMapRenderer};
use crate::nav::{Navigator, Route};
use crate::store::SelectedTrailStore;

pub const NO_RESULT: &str = "결과 데이터가 없습니다. 처음 화면으로 돌아가 다시 시도해주세요.";
pub const COMFORT_PENDING: &str = "결과가 준비되는 대로 표시됩니다.";
pub const MUSIC_PENDING: &str = "추천 결과가 아직 없어요.";
pub const NO_TRAILS: &str = "추천 산책로가 없습니다.";
pub const NO_MORE_TRAILS: &str = "추가 산책로가 없습니다.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicCard {
    /// `artist - title`
    pub heading: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// The backend reported an analysis failure inside a 2xx payload.
    Error(String),
    Recommendations { comfort: String, music: Vec<MusicCard>, music_placeholder: Option<&'static str> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrailCard {
    pub trail: Trail,
    pub score_label: Option<String>,
}

impl TrailCard {
    fn new(trail: &Trail) -> Self {
        TrailCard { trail: trail.clone(), score_label: score_label(trail.score) }
    }
}

/// `추천 점수: 8.5/10`; absent and zero scores are not shown.
pub fn score_label(score: Option<f64>) -> Option<String> {
    score.filter(|s| *s != 0.0).map(|s| format!("추천 점수: {s}/10"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultsView {
    pub emotion: String,
    pub keywords: Vec<String>,
    pub body: Body,
    /// Sentence naming the positive emotions the trails were picked for.
    pub guidance: Option<String>,
    /// Trails in backend order.
    pub trails: Vec<TrailCard>,
    pub trails_placeholder: Option<&'static str>,
    more: Vec<Trail>,
    positive_emotions: Vec<String>,
}

impl ResultsView {
    /// Nothing is rendered without a result.
    pub fn project(result: Option<&AnalysisResult>) -> Option<Self> {
        let result = result?;
        let analysis = &result.analysis;

        let body = match &analysis.error {
            Some(error) => {
                let detail = analysis.message.as_deref().unwrap_or(error);
                Body::Error(format!("분석 오류: {detail}"))
            }
            None => {
                let music: Vec<MusicCard> = analysis
                    .recommendations
                    .iter()
                    .map(|r| MusicCard {
                        heading: format!("{} - {}", r.artist, r.title),
                        reason: r.reason.clone(),
                    })
                    .collect();
                Body::Recommendations {
                    comfort: analysis
                        .comfort_message
                        .clone()
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| COMFORT_PENDING.to_string()),
                    music_placeholder: music.is_empty().then_some(MUSIC_PENDING),
                    music,
                }
            }
        };

        let positive = &result.trail.positive_emotions_used;
        let trails: Vec<TrailCard> = result.trail.trails.iter().map(TrailCard::new).collect();

        Some(ResultsView {
            emotion: analysis.emotion_label(),
            keywords: analysis.keywords.iter().map(|k| format!("#{k}")).collect(),
            body,
            guidance: guidance(positive),
            trails_placeholder: trails.is_empty().then_some(NO_TRAILS),
            trails,
            more: result.trail.more.clone(),
            positive_emotions: positive.clone(),
        })
    }

    pub fn has_more(&self) -> bool {
        !self.trails.is_empty() && !self.more.is_empty()
    }

    /// Open the full list of lower-ranked trails.
    pub fn show_more(&self, nav: &dyn Navigator) -> bool {
        if !self.has_more() {
            return false;
        }
        nav.navigate(Route::Trails {
            trails: self.more.clone(),
            emotions: self.positive_emotions.clone(),
        });
        true
    }
}

fn guidance(emotions: &[String]) -> Option<String> {
    if emotions.is_empty() {
        return None;
    }
    Some(format!("\"{}\" 감정에 알맞은 산책로를 추천해드릴게요.", emotions.join("\", \"")))
}

/// The "more trails" page.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailsListView {
    pub emotions: Vec<String>,
    pub trails: Vec<TrailCard>,
    pub placeholder: Option<&'static str>,
}

impl TrailsListView {
    pub fn project(trails: &[Trail], emotions: &[String]) -> Self {
        TrailsListView {
            emotions: emotions.iter().map(|e| format!("#{e}")).collect(),
            trails: trails.iter().map(TrailCard::new).collect(),
            placeholder: trails.is_empty().then_some(NO_MORE_TRAILS),
        }
    }
}

// ── Selection ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CouponPopup {
    pub trail: Trail,
    pub offer: CouponOffer,
}

/// Trail selection: persist, announce the coupon, then move to the trail's
/// community after a delay unless the popup is dismissed first.
pub struct TrailSelection {
    store: SelectedTrailStore,
    nav: Arc<dyn Navigator>,
    delay: Duration,
    popup: Arc<watch::Sender<Option<CouponPopup>>>,
    pending: Mutex<Option<CancellationToken>>,
}

impl TrailSelection {
    pub fn new(store: SelectedTrailStore, nav: Arc<dyn Navigator>, delay: Duration) -> Self {
        let (popup, _) = watch::channel(None);
        TrailSelection { store, nav, delay, popup: Arc::new(popup), pending: Mutex::new(None) }
    }

    pub fn popup(&self) -> watch::Receiver<Option<CouponPopup>> {
        self.popup.subscribe()
    }

    /// Must be called from within a tokio runtime.
    pub fn select(&self, trail: &Trail) -> Result<(), ClientError> {
        info!("Trail selected: {}", trail.name);
        self.store.save(trail, Utc::now())?;

        let token = CancellationToken::new();
        if let Some(previous) = self.replace_pending(Some(token.clone())) {
            previous.cancel();
        }
        self.popup.send_replace(Some(CouponPopup { trail: trail.clone(), offer: offer_for(&trail.name) }));

        let nav = self.nav.clone();
        let popup = self.popup.clone();
        let delay = self.delay;
        let trail = trail.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("Navigation to community cancelled"),
                _ = tokio::time::sleep(delay) => {
                    popup.send_replace(None);
                    nav.navigate(Route::Community { trail, from_analysis: true });
                }
            }
        });
        Ok(())
    }

    /// Close the popup and cancel the pending navigation.
    pub fn dismiss(&self) {
        self.cancel_pending();
        self.popup.send_replace(None);
    }

    pub fn view_coupons(&self) {
        self.dismiss();
        self.nav.navigate(Route::Coupons);
    }

    fn replace_pending(&self, token: Option<CancellationToken>) -> Option<CancellationToken> {
        let mut guard = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, token)
    }

    fn cancel_pending(&self) {
        if let Some(token) = self.replace_pending(None) {
            token.cancel();
        }
    }
}

impl Drop for TrailSelection {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

// ── Map panel ───────────────────────────────────────────────────────────────

/// "View map" for exactly one trail, independent of selection.
pub struct MapPanel<S: MapSurface> {
    renderer: TrailMapRenderer<S>,
    trail: Option<Trail>,
}

impl<S: MapSurface> MapPanel<S> {
    pub fn new(surface: S) -> Self {
        MapPanel { renderer: TrailMapRenderer::new(surface), trail: None }
    }

    pub fn open(&mut self, trail: &Trail, current_location: Option<Location>) {
        self.trail = Some(trail.clone());
        self.renderer.render(std::slice::from_ref(trail), true, current_location);
    }

    pub fn close(&mut self) {
        self.trail = None;
        self.renderer.close();
    }

    pub fn trail(&self) -> Option<&Trail> {
        self.trail.as_ref()
    }

    pub fn renderer(&mut self) -> &mut TrailMapRenderer<S> {
        &mut self.renderer
    }
}
