//! Analyze orchestrator: validate → locate → submit → done.
//!
//! Every submission gets a generation number.  A result (or error) is only
//! applied if its generation is still the latest and the owning view has
//! not been detached, so a late response never lands on a torn-down view.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use moodwalk_common::protocol::{AnalysisRequest, AnalysisResult, Location};

use crate::api::ApiClient;
use crate::auth::AuthSession;
use crate::error::ClientError;
use crate::location::LocationProvider;
use crate::nav::{Navigator, Route};

pub const EMPTY_TEXT: &str = "내용을 입력해주세요.";
pub const LOGIN_REQUIRED: &str = "로그인이 필요한 서비스입니다. 로그인 후 이용해주세요.";
pub const DONE_PROMPT: &str = "분석이 완료되었어요. 결과 페이지로 이동하시겠어요?";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Locating,
    Submitting,
    /// A result is held and the results page can be offered.
    Done,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalyzeView {
    pub phase: Phase,
    pub error: Option<String>,
    pub result: Option<Arc<AnalysisResult>>,
}

impl AnalyzeView {
    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Locating | Phase::Submitting)
    }

    /// Prompt offering navigation to the results page, in the done state.
    pub fn done_prompt(&self) -> Option<&'static str> {
        (self.phase == Phase::Done).then_some(DONE_PROMPT)
    }
}

pub struct AnalyzeOrchestrator {
    api: ApiClient,
    auth: Arc<AuthSession>,
    location: Arc<LocationProvider>,
    view: watch::Sender<AnalyzeView>,
    generation: AtomicU64,
    cancel: CancellationToken,
}

impl AnalyzeOrchestrator {
    pub fn new(api: ApiClient, auth: Arc<AuthSession>, location: Arc<LocationProvider>) -> Self {
        let (view, _) = watch::channel(AnalyzeView::default());
        AnalyzeOrchestrator {
            api,
            auth,
            location,
            view,
            generation: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    pub fn view(&self) -> watch::Receiver<AnalyzeView> {
        self.view.subscribe()
    }

    pub fn snapshot(&self) -> AnalyzeView {
        self.view.borrow().clone()
    }

    /// Warm the location cache for a signed-in user who has none yet.
    /// Failures are only logged.
    pub async fn prefetch_location(&self) {
        if self.auth.current_user().is_none() || self.location.current_location().is_some() {
            return;
        }
        if let Err(e) = self.location.request_gps_location().await {
            info!("Initial location request failed: {e}");
        }
    }

    /// Run one analysis for `text`.  Outcomes are reported through the view.
    pub async fn submit(&self, text: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if self.cancel.is_cancelled() {
            return;
        }
        self.view.send_replace(AnalyzeView::default());

        if text.trim().is_empty() {
            self.fail_fast(EMPTY_TEXT);
            return;
        }
        if self.auth.current_user().is_none() {
            self.fail_fast(LOGIN_REQUIRED);
            return;
        }

        self.view.send_modify(|v| v.phase = Phase::Locating);
        let location = tokio::select! {
            _ = self.cancel.cancelled() => return,
            location = self.resolve_location() => location,
        };
        if !self.is_current(generation) {
            return;
        }

        self.view.send_modify(|v| v.phase = Phase::Submitting);
        let request = AnalysisRequest { text: text.to_string(), location };
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => return,
            outcome = self.call(&request) => outcome,
        };
        if !self.is_current(generation) {
            info!("Discarding stale analysis result (generation {generation})");
            return;
        }

        match outcome {
            Ok(result) => {
                info!(
                    "Analysis done: emotion={}, {} trail(s)",
                    result.analysis.emotion_label(),
                    result.trail.trails.len()
                );
                self.view.send_modify(|v| {
                    v.result = Some(Arc::new(result));
                    v.phase = Phase::Done;
                });
            }
            Err(e) => {
                error!("Analysis failed: {e}");
                self.view.send_modify(|v| {
                    v.error = Some(e.user_message());
                    v.phase = Phase::Idle;
                });
            }
        }
    }

    /// Hand the held result to the results page.  Returns false outside the
    /// done state.
    pub fn go_to_results(&self, nav: &dyn Navigator) -> bool {
        let view = self.snapshot();
        let (Phase::Done, Some(result)) = (view.phase, view.result) else {
            return false;
        };
        nav.navigate(Route::Results(result));
        self.view.send_replace(AnalyzeView::default());
        true
    }

    /// The owning view is gone: abandon in-flight work.
    pub fn detach(&self) {
        self.cancel.cancel();
    }

    // ── helpers ──────────────────────────────────────────────────────────

    async fn resolve_location(&self) -> Option<Location> {
        if let Some(cached) = self.location.current_location() {
            return Some(cached);
        }
        match self.location.request_gps_location().await {
            Ok(location) => Some(location),
            Err(e) => {
                warn!("No location, continuing without it: {e}");
                None
            }
        }
    }

    async fn call(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ClientError> {
        let headers = self.auth.auth_headers().await;
        self.api.analyze(request, &headers).await
    }

    fn fail_fast(&self, message: &str) {
        self.view.send_modify(|v| {
            v.error = Some(message.to_string());
            v.phase = Phase::Idle;
        });
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.cancel.is_cancelled() && self.generation.load(Ordering::SeqCst) == generation
    }
}

impl Drop for AnalyzeOrchestrator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
