//! Auth session: follows the identity provider and hands out bearer tokens.
//!
//! The session is the only writer of [`AuthState`]; everything else reads
//! it through [`AuthSession::subscribe`] or the accessors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::AuthHeaders;
use crate::error::ClientError;

/// An authenticated account as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl User {
    /// Name used when no stored profile is available: display name, else
    /// the local part of the email, else `사용자`.
    pub fn fallback_name(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        self.email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|local| !local.is_empty())
            .unwrap_or("사용자")
            .to_string()
    }
}

/// External identity provider (email/password accounts, ID tokens).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, ClientError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<User, ClientError>;

    async fn sign_out(&self) -> Result<(), ClientError>;

    /// Current ID token; `force_refresh` bypasses any cached token.
    async fn id_token(&self, force_refresh: bool) -> Result<String, ClientError>;

    /// Sign-in state notifications; the current value is the current user.
    fn subscribe(&self) -> watch::Receiver<Option<User>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub current_user: Option<User>,
    pub token: Option<String>,
    /// True until the first identity notification has been processed.
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        AuthState { current_user: None, token: None, loading: true }
    }
}

pub struct AuthSession {
    identity: Arc<dyn IdentityProvider>,
    state: Arc<watch::Sender<AuthState>>,
    retry_backoff: Duration,
    cancel: CancellationToken,
}

impl AuthSession {
    /// Start following `identity`.  While a user is signed in the token is
    /// force-refreshed every `refresh_every`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        identity: Arc<dyn IdentityProvider>,
        refresh_every: Duration,
        retry_backoff: Duration,
    ) -> Arc<Self> {
        let (tx, _rx) = watch::channel(AuthState::default());
        let state = Arc::new(tx);
        let cancel = CancellationToken::new();

        tokio::spawn(follow_identity(
            identity.clone(),
            state.clone(),
            refresh_every,
            cancel.clone(),
        ));

        Arc::new(AuthSession { identity, state, retry_backoff, cancel })
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().current_user.clone()
    }

    /// Last token seen by the session (not refreshed).
    pub fn cached_token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    /// Wait until the first identity notification has been applied.
    pub async fn ready(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| !s.loading).await;
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let user = self.identity.sign_in(email, password).await?;
        info!("Signed in as {}", user.uid);
        self.state.send_modify(|s| {
            s.current_user = Some(user.clone());
            s.loading = false;
        });
        Ok(user)
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let user = self.identity.sign_up(email, password).await?;
        info!("Created account {}", user.uid);
        self.state.send_modify(|s| {
            s.current_user = Some(user.clone());
            s.loading = false;
        });
        Ok(user)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.identity.sign_out().await?;
        self.state.send_modify(|s| {
            s.current_user = None;
            s.token = None;
        });
        Ok(())
    }

    /// Fetch a fresh ID token.
    ///
    /// Forces a refresh; on failure retries once (unforced) after the
    /// backoff and gives up with `None`.
    pub async fn id_token(&self) -> Option<String> {
        self.current_user()?;

        let token = match self.identity.id_token(true).await {
            Ok(token) => token,
            Err(e) => {
                error!("Failed to get ID token: {e}");
                tokio::time::sleep(self.retry_backoff).await;
                match self.identity.id_token(false).await {
                    Ok(token) => token,
                    Err(e) => {
                        error!("Failed to get ID token on retry: {e}");
                        return None;
                    }
                }
            }
        };
        self.state.send_modify(|s| s.token = Some(token.clone()));
        Some(token)
    }

    /// Headers for one backend call; empty when no token is available.
    pub async fn auth_headers(&self) -> AuthHeaders {
        AuthHeaders::from_token(self.id_token().await)
    }

    /// Stop following the identity provider and the refresh timer.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn follow_identity(
    identity: Arc<dyn IdentityProvider>,
    state: Arc<watch::Sender<AuthState>>,
    refresh_every: Duration,
    cancel: CancellationToken,
) {
    let mut users = identity.subscribe();

    loop {
        let user = users.borrow_and_update().clone();
        let token = match &user {
            Some(_) => match identity.id_token(false).await {
                Ok(token) => Some(token),
                Err(e) => {
                    error!("Failed to get ID token: {e}");
                    None
                }
            },
            None => None,
        };
        let signed_in = user.is_some();
        state.send_modify(|s| {
            s.current_user = user;
            s.token = token;
            s.loading = false;
        });

        // The refresh timer only exists while somebody is signed in.
        let mut refresh = signed_in.then(|| refresh_timer(refresh_every));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Auth session stopped");
                    return;
                }
                changed = users.changed() => {
                    if changed.is_err() {
                        debug!("Identity provider gone, auth session stopped");
                        return;
                    }
                    break;
                }
                _ = tick(&mut refresh) => {
                    match identity.id_token(true).await {
                        Ok(token) => state.send_modify(|s| s.token = Some(token)),
                        Err(e) => warn!("Failed to refresh token: {e}"),
                    }
                }
            }
        }
    }
}

fn refresh_timer(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{test_user, FakeIdentity};
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);
    const BACKOFF: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn test_session_follows_identity() {
        let identity = FakeIdentity::new(None);
        let session = AuthSession::start(identity.clone(), HOUR, BACKOFF);
        session.ready().await;
        assert!(session.current_user().is_none());

        identity.set_user(Some(test_user()));
        let mut rx = session.subscribe();
        let state = rx.wait_for(|s| s.token.is_some()).await.unwrap().clone();
        assert_eq!(state.current_user, Some(test_user()));

        identity.set_user(None);
        let state = rx.wait_for(|s| s.current_user.is_none()).await.unwrap().clone();
        assert!(state.token.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_id_token_retries_once_unforced() {
        let identity = FakeIdentity::signed_in();
        let session = AuthSession::start(identity.clone(), HOUR, BACKOFF);
        session.ready().await;
        identity.token_calls.lock().unwrap().clear();

        identity.script(vec![Err("network"), Ok("fresh")]);
        let started = Instant::now();
        assert_eq!(session.id_token().await.as_deref(), Some("fresh"));
        assert!(started.elapsed() >= BACKOFF);
        assert_eq!(*identity.token_calls.lock().unwrap(), vec![true, false]);
        assert_eq!(session.cached_token().as_deref(), Some("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_headers_empty_after_two_failures() {
        let identity = FakeIdentity::signed_in();
        let session = AuthSession::start(identity.clone(), HOUR, BACKOFF);
        session.ready().await;

        identity.script(vec![Err("a"), Err("b")]);
        let headers = session.auth_headers().await;
        assert!(!headers.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_token_without_user() {
        let identity = FakeIdentity::new(None);
        let session = AuthSession::start(identity.clone(), HOUR, BACKOFF);
        session.ready().await;
        assert!(session.id_token().await.is_none());
        assert!(identity.token_calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_only_while_signed_in() {
        let identity = FakeIdentity::signed_in();
        let session = AuthSession::start(identity.clone(), HOUR, BACKOFF);
        session.ready().await;

        tokio::time::sleep(HOUR * 2 + Duration::from_secs(1)).await;
        assert_eq!(identity.forced_calls(), 2);

        identity.set_user(None);
        let mut rx = session.subscribe();
        rx.wait_for(|s| s.current_user.is_none()).await.unwrap();
        tokio::time::sleep(HOUR * 3).await;
        assert_eq!(identity.forced_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_refresh() {
        let identity = FakeIdentity::signed_in();
        let session = AuthSession::start(identity.clone(), HOUR, BACKOFF);
        session.ready().await;
        session.shutdown();
        tokio::time::sleep(HOUR * 2).await;
        assert_eq!(identity.forced_calls(), 0);
    }

    #[test]
    fn test_fallback_name() {
        let mut user = test_user();
        assert_eq!(user.fallback_name(), "walker");
        user.display_name = Some("산책러".into());
        assert_eq!(user.fallback_name(), "산책러");
        user.display_name = None;
        user.email = None;
        assert_eq!(user.fallback_name(), "사용자");
    }
}
