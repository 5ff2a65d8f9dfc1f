//! Identity provider backed by the Firebase Auth REST API.
//!
//! Endpoints:
//!   POST {identitytoolkit}/v1/accounts:signInWithPassword
//!   POST {identitytoolkit}/v1/accounts:signUp
//!   POST {securetoken}/v1/token                (refresh-token exchange)

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::auth::{IdentityProvider, User};
use crate::error::ClientError;

pub const IDENTITY_TOOLKIT: &str = "https://identitytoolkit.googleapis.com";
pub const SECURE_TOKEN: &str = "https://securetoken.googleapis.com";

/// Cached tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct FirebaseEndpoints {
    pub identity_toolkit: String,
    pub secure_token: String,
}

impl Default for FirebaseEndpoints {
    fn default() -> Self {
        FirebaseEndpoints {
            identity_toolkit: IDENTITY_TOOLKIT.to_string(),
            secure_token: SECURE_TOKEN.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Tokens {
    id_token: String,
    refresh_token: String,
    expires_at: Instant,
}

pub struct FirebaseIdentity {
    http: reqwest::Client,
    api_key: String,
    endpoints: FirebaseEndpoints,
    tokens: Mutex<Option<Tokens>>,
    users: watch::Sender<Option<User>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

impl FirebaseIdentity {
    pub fn new(api_key: &str) -> Result<Self, ClientError> {
        Self::with_endpoints(api_key, FirebaseEndpoints::default())
    }

    pub fn with_endpoints(api_key: &str, endpoints: FirebaseEndpoints) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let (users, _) = watch::channel(None);
        Ok(FirebaseIdentity {
            http,
            api_key: api_key.to_string(),
            endpoints,
            tokens: Mutex::new(None),
            users,
        })
    }

    async fn password_call(&self, method: &str, email: &str, password: &str) -> Result<User, ClientError> {
        let url = format!(
            "{}/v1/accounts:{method}?key={}",
            self.endpoints.identity_toolkit.trim_end_matches('/'),
            self.api_key
        );
        let body = json!({ "email": email, "password": password, "returnSecureToken": true });
        let resp: SignInResponse = self.post(&url, &body).await?;

        let user = User {
            uid: resp.local_id,
            email: resp.email.or_else(|| Some(email.to_string())),
            display_name: resp.display_name.filter(|n| !n.is_empty()),
        };
        self.store_tokens(resp.id_token, resp.refresh_token, resp.expires_in.as_deref());
        self.users.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<String, ClientError> {
        let url = format!(
            "{}/v1/token?key={}",
            self.endpoints.secure_token.trim_end_matches('/'),
            self.api_key
        );
        let body = json!({ "grant_type": "refresh_token", "refresh_token": refresh_token });
        let resp: RefreshResponse = self.post(&url, &body).await?;
        debug!("ID token refreshed");
        self.store_tokens(resp.id_token.clone(), resp.refresh_token, resp.expires_in.as_deref());
        Ok(resp.id_token)
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, ClientError> {
        let resp = self.http.post(url).json(body).send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let code = serde_json::from_slice::<ErrorEnvelope>(&bytes)
                .map(|e| e.error.message)
                .unwrap_or_default();
            return Err(ClientError::Identity(describe_error(&code)));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn store_tokens(&self, id_token: String, refresh_token: String, expires_in: Option<&str>) {
        let lifetime = expires_in
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(3600));
        let mut guard = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Tokens { id_token, refresh_token, expires_at: Instant::now() + lifetime });
    }

    fn cached(&self) -> Option<Tokens> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<User, ClientError> {
        self.password_call("signInWithPassword", email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<User, ClientError> {
        self.password_call("signUp", email, password).await
    }

    async fn sign_out(&self) -> Result<(), ClientError> {
        *self.tokens.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.users.send_replace(None);
        info!("Signed out");
        Ok(())
    }

    async fn id_token(&self, force_refresh: bool) -> Result<String, ClientError> {
        let tokens = self
            .cached()
            .ok_or_else(|| ClientError::Identity("로그인이 필요합니다.".into()))?;

        if !force_refresh && Instant::now() + EXPIRY_MARGIN < tokens.expires_at {
            return Ok(tokens.id_token);
        }
        self.refresh(&tokens.refresh_token).await
    }

    fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.users.subscribe()
    }
}

/// Korean message for a Firebase Auth error code.
pub fn describe_error(code: &str) -> String {
    // Codes may carry a suffix, e.g. "WEAK_PASSWORD : Password should be ...".
    let code = code.split_whitespace().next().unwrap_or_default();
    match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            "이메일 또는 비밀번호가 올바르지 않습니다.".to_string()
        }
        "EMAIL_EXISTS" => "이미 사용 중인 이메일입니다.".to_string(),
        "WEAK_PASSWORD" => "비밀번호가 너무 약합니다.".to_string(),
        "INVALID_EMAIL" => "유효하지 않은 이메일 주소입니다.".to_string(),
        "OPERATION_NOT_ALLOWED" => "이메일/비밀번호 계정이 비활성화되어 있습니다.".to_string(),
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "잠시 후 다시 시도해주세요.".to_string(),
        "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_DISABLED" | "USER_NOT_FOUND" => {
            "로그인 세션이 만료되었습니다. 다시 로그인해주세요.".to_string()
        }
        "" => "인증에 실패했습니다.".to_string(),
        other => format!("인증에 실패했습니다. ({other})"),
    }
}
