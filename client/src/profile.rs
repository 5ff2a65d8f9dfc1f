//! Profile page and sign-up form.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};

use moodwalk_common::protocol::{Profile, ProfileUpdate, RegisterRequest};

use crate::api::{ApiClient, AuthHeaders};
use crate::auth::{AuthSession, User};
use crate::error::ClientError;

pub const LOAD_FAILED: &str = "사용자 정보를 불러오는데 실패했습니다.";
pub const ALL_FIELDS_REQUIRED: &str = "모든 필드를 입력해주세요.";
pub const UPDATE_OK: &str = "프로필이 성공적으로 업데이트되었습니다.";
pub const UPDATE_FAILED: &str = "프로필 업데이트에 실패했습니다.";
pub const PASSWORD_MISMATCH: &str = "비밀번호가 일치하지 않습니다.";
pub const PASSWORD_TOO_SHORT: &str = "비밀번호는 최소 6자 이상이어야 합니다.";
pub const MIN_PASSWORD_CHARS: usize = 6;

/// How long the success message stays up.
const SUCCESS_VISIBLE: Duration = Duration::from_secs(3);

/// Editable fields of the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDraft {
    pub username: String,
    pub music_taste: String,
    pub residence: String,
}

impl From<&Profile> for ProfileDraft {
    fn from(p: &Profile) -> Self {
        ProfileDraft {
            username: p.username.clone(),
            music_taste: p.music_taste.clone(),
            residence: p.residence.clone(),
        }
    }
}

impl ProfileDraft {
    /// Trimmed update, or `None` when any field is blank.
    pub fn to_update(&self) -> Option<ProfileUpdate> {
        let username = self.username.trim();
        let music_taste = self.music_taste.trim();
        let residence = self.residence.trim();
        if username.is_empty() || music_taste.is_empty() || residence.is_empty() {
            return None;
        }
        Some(ProfileUpdate {
            username: username.to_string(),
            music_taste: music_taste.to_string(),
            residence: residence.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileState {
    pub profile: Option<Profile>,
    pub draft: ProfileDraft,
    pub editing: bool,
    pub loading: bool,
    pub saving: bool,
    pub error: Option<String>,
    pub success: Option<String>,
    success_until: Option<Instant>,
}

pub struct ProfileEditor {
    api: ApiClient,
    auth: Arc<AuthSession>,
    state: Arc<watch::Sender<ProfileState>>,
}

impl ProfileEditor {
    pub fn new(api: ApiClient, auth: Arc<AuthSession>) -> Self {
        let (state, _) = watch::channel(ProfileState { loading: true, ..Default::default() });
        ProfileEditor { api, auth, state: Arc::new(state) }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProfileState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ProfileState {
        self.state.borrow().clone()
    }

    pub async fn load(&self) -> bool {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
        let headers = self.auth.auth_headers().await;
        let outcome = self.api.me(&headers).await;
        let ok = outcome.is_ok();
        self.state.send_modify(|s| {
            s.loading = false;
            match outcome {
                Ok(me) => {
                    s.draft = ProfileDraft::from(&me.user);
                    s.profile = Some(me.user);
                }
                Err(e) => {
                    error!("Failed to fetch user info: {e}");
                    s.error = Some(LOAD_FAILED.to_string());
                }
            }
        });
        ok
    }

    pub fn begin_edit(&self) {
        self.state.send_modify(|s| s.editing = true);
    }

    pub fn edit(&self, f: impl FnOnce(&mut ProfileDraft)) {
        self.state.send_modify(|s| f(&mut s.draft));
    }

    /// Leave edit mode and restore the draft from the loaded profile.
    pub fn cancel_edit(&self) {
        self.state.send_modify(|s| {
            s.editing = false;
            s.error = None;
            s.success = None;
            if let Some(p) = &s.profile {
                s.draft = ProfileDraft::from(p);
            }
        });
    }

    /// Returns whether the backend accepted the update.  The success message
    /// is shown only once the stored profile has been reloaded.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn save(&self) -> bool {
        self.state.send_modify(|s| {
            s.error = None;
            s.success = None;
        });
        let update = self.state.borrow().draft.to_update();
        let Some(update) = update else {
            self.state.send_modify(|s| s.error = Some(ALL_FIELDS_REQUIRED.to_string()));
            return false;
        };

        self.state.send_modify(|s| s.saving = true);
        let headers = self.auth.auth_headers().await;
        if let Err(e) = self.api.update_me(&update, &headers).await {
            error!("Failed to update profile: {e}");
            let message = match &e {
                ClientError::Api { message: Some(m), .. } if !m.is_empty() => m.clone(),
                _ => UPDATE_FAILED.to_string(),
            };
            self.state.send_modify(|s| {
                s.saving = false;
                s.error = Some(message);
            });
            return false;
        }

        if !self.load().await {
            // Saved, but the page would show stale data: keep the reload error.
            warn!("Profile updated but reload failed");
            self.state.send_modify(|s| {
                s.saving = false;
                s.editing = false;
            });
            return true;
        }
        let until = Instant::now() + SUCCESS_VISIBLE;
        self.state.send_modify(|s| {
            s.saving = false;
            s.editing = false;
            s.success = Some(UPDATE_OK.to_string());
            s.success_until = Some(until);
        });
        info!("Profile updated");

        let state = self.state.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(until).await;
            state.send_if_modified(|s| {
                // A newer message has its own timer.
                if s.success_until != Some(until) {
                    return false;
                }
                s.success = None;
                s.success_until = None;
                true
            });
        });
        true
    }

    pub async fn logout(&self) {
        if let Err(e) = self.auth.logout().await {
            error!("Logout failed: {e}");
        }
    }
}

// ── Sign-up ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupForm {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub username: String,
    pub music_taste: String,
    pub residence: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupOutcome {
    /// Account created and profile stored.
    Complete,
    /// Account created but the profile could not be stored; the user stays
    /// signed in.
    AccountOnly { message: String },
}

impl SignupForm {
    pub fn validate(&self) -> Result<(), ClientError> {
        let fields = [&self.email, &self.password, &self.username, &self.music_taste, &self.residence];
        if fields.iter().any(|f| f.is_empty()) {
            return Err(ClientError::Validation(ALL_FIELDS_REQUIRED.into()));
        }
        if self.password != self.confirm_password {
            return Err(ClientError::Validation(PASSWORD_MISMATCH.into()));
        }
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(ClientError::Validation(PASSWORD_TOO_SHORT.into()));
        }
        Ok(())
    }

    fn register_request(&self) -> RegisterRequest {
        RegisterRequest {
            username: self.username.clone(),
            email: self.email.clone(),
            music_taste: self.music_taste.clone(),
            residence: self.residence.clone(),
        }
    }

    /// Create the account, then store the profile with the new account's
    /// token.
    pub async fn signup(&self, auth: &AuthSession, api: &ApiClient) -> Result<SignupOutcome, ClientError> {
        self.validate()?;
        let user: User = auth.signup(&self.email, &self.password).await?;
        info!("Account created: {}", user.uid);

        let headers = AuthHeaders::from_token(auth.id_token().await);
        match api.register(&self.register_request(), &headers).await {
            Ok(_) => Ok(SignupOutcome::Complete),
            Err(e) => {
                warn!("Profile save failed after sign-up: {e}");
                let detail = match &e {
                    ClientError::Api { message: Some(m), .. } if !m.is_empty() => m.clone(),
                    _ => "프로필 저장에 실패했습니다.".to_string(),
                };
                Ok(SignupOutcome::AccountOnly {
                    message: format!("로그인은 완료되었습니다. 프로필 저장 실패: {detail}"),
                })
            }
        }
    }
}
