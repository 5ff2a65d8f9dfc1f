//! Per-trail community chat.
//!
//! Messages live in an external ordered document store keyed by a
//! normalised trail name; the room mirrors that list live while it is open
//! and stops listening when it is left or dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use moodwalk_common::protocol::Trail;
use moodwalk_common::timefmt::relative_time;

use crate::api::ApiClient;
use crate::auth::{AuthSession, User};
use crate::error::ClientError;
use crate::nav::{Navigator, Route};
use crate::store::{LocalStore, SelectedTrailStore};

pub const LOGIN_REQUIRED: &str = "로그인이 필요한 서비스입니다.";
pub const SELECT_TRAIL_FIRST: &str = "산책로를 먼저 선택해주세요.";
pub const MAX_MESSAGE_CHARS: usize = 500;

/// `trail_` followed by the trail name with each whitespace run replaced by
/// one `_`, including runs at either end.
pub fn community_id(trail_name: &str) -> String {
    let mut id = String::from("trail_");
    let mut in_run = false;
    for c in trail_name.chars() {
        if c.is_whitespace() {
            if !in_run {
                id.push('_');
            }
            in_run = true;
        } else {
            id.push(c);
            in_run = false;
        }
    }
    id
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub user_email: Option<String>,
    /// Assigned by the store.
    pub timestamp: DateTime<Utc>,
    pub trail_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub text: String,
    pub user_id: String,
    pub user_name: String,
    pub user_email: Option<String>,
    pub trail_name: String,
}

/// Ordered, live-queryable message collections.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn append(&self, community: &str, message: NewMessage) -> Result<ChatMessage, ClientError>;

    /// Live view of a community's messages in timestamp order.
    fn subscribe(&self, community: &str) -> watch::Receiver<Vec<ChatMessage>>;
}

/// In-process chat store.
#[derive(Default)]
pub struct MemoryChatStore {
    communities: Mutex<HashMap<String, watch::Sender<Vec<ChatMessage>>>>,
    next_id: AtomicU64,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, community: &str) -> watch::Sender<Vec<ChatMessage>> {
        let mut map = self.communities.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(community.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .clone()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn append(&self, community: &str, message: NewMessage) -> Result<ChatMessage, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let stored = ChatMessage {
            id: format!("msg-{id}"),
            text: message.text,
            user_id: message.user_id,
            user_name: message.user_name,
            user_email: message.user_email,
            timestamp: Utc::now(),
            trail_name: message.trail_name,
        };
        self.channel(community).send_modify(|list| list.push(stored.clone()));
        Ok(stored)
    }

    fn subscribe(&self, community: &str) -> watch::Receiver<Vec<ChatMessage>> {
        self.channel(community).subscribe()
    }
}

/// Chat store persisted through a [`LocalStore`], one record per community.
///
/// Every append re-reads the record, so messages written by another
/// process sharing the store are kept; live updates reach subscribers of
/// this instance only.
pub struct LocalChatStore {
    store: Arc<dyn LocalStore>,
    live: Mutex<HashMap<String, watch::Sender<Vec<ChatMessage>>>>,
}

impl LocalChatStore {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        LocalChatStore { store, live: Mutex::new(HashMap::new()) }
    }

    /// Record key; path separators in trail names must not leave the store.
    fn key(community: &str) -> String {
        format!("chat_{}", community.replace(['/', '\\'], "_"))
    }

    fn read(&self, community: &str) -> Result<Vec<ChatMessage>, ClientError> {
        match self.store.get(&Self::key(community))? {
            Some(text) => serde_json::from_str(&text)
                .map_err(|e| ClientError::Chat(format!("corrupt chat record for {community}: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    fn channel(&self, community: &str) -> watch::Sender<Vec<ChatMessage>> {
        let mut live = self.live.lock().unwrap_or_else(|e| e.into_inner());
        live.entry(community.to_string())
            .or_insert_with(|| {
                let messages = self.read(community).unwrap_or_else(|e| {
                    warn!("Cannot load chat history: {e}");
                    Vec::new()
                });
                watch::channel(messages).0
            })
            .clone()
    }
}

#[async_trait]
impl ChatStore for LocalChatStore {
    async fn append(&self, community: &str, message: NewMessage) -> Result<ChatMessage, ClientError> {
        let sender = self.channel(community);
        let mut messages = self.read(community)?;
        let timestamp = Utc::now();
        let stored = ChatMessage {
            id: format!("msg-{}-{}", timestamp.timestamp_micros(), messages.len() + 1),
            text: message.text,
            user_id: message.user_id,
            user_name: message.user_name,
            user_email: message.user_email,
            timestamp,
            trail_name: message.trail_name,
        };
        messages.push(stored.clone());
        self.store.set(&Self::key(community), &serde_json::to_string(&messages)?)?;
        debug!("Stored message {} in {community}", stored.id);

        sender.send_replace(messages);
        Ok(stored)
    }

    fn subscribe(&self, community: &str) -> watch::Receiver<Vec<ChatMessage>> {
        self.channel(community).subscribe()
    }
}

// ── Room ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomState {
    pub messages: Vec<ChatMessage>,
    pub sending: bool,
    pub error: Option<String>,
}

/// One rendered chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLine {
    pub text: String,
    pub is_mine: bool,
    /// Sender name, shown above the first of consecutive messages by
    /// another user.
    pub user_name: Option<String>,
    pub time: String,
}

/// Everything needed to open community rooms.
pub struct Community {
    pub auth: Arc<AuthSession>,
    pub api: ApiClient,
    pub selected: SelectedTrailStore,
    pub chat: Arc<dyn ChatStore>,
    pub nav: Arc<dyn Navigator>,
    pub history_limit: usize,
}

impl Community {
    /// Open the room for the handed-off trail, or else the stored selection.
    ///
    /// Without a session the user is sent to login; without a trail, home.
    pub async fn enter(&self, handoff: Option<Trail>) -> Result<CommunityRoom, ClientError> {
        let Some(user) = self.auth.current_user() else {
            self.nav.navigate(Route::Login);
            return Err(ClientError::Validation(LOGIN_REQUIRED.into()));
        };
        let Some(trail) = handoff.or_else(|| self.selected.load(Utc::now())) else {
            self.nav.navigate(Route::Home);
            return Err(ClientError::Validation(SELECT_TRAIL_FIRST.into()));
        };

        let display_name = self.display_name(&user).await;
        let id = community_id(&trail.name);
        info!("Entering community {id} as {display_name}");

        let state = Arc::new(watch::channel(RoomState::default()).0);
        let cancel = CancellationToken::new();
        tokio::spawn(mirror(
            self.chat.subscribe(&id),
            state.clone(),
            self.history_limit,
            cancel.clone(),
        ));

        Ok(CommunityRoom {
            trail,
            id,
            user,
            display_name,
            chat: self.chat.clone(),
            state,
            cancel,
        })
    }

    /// Stored profile name, falling back to what the session knows.
    async fn display_name(&self, user: &User) -> String {
        let headers = self.auth.auth_headers().await;
        match self.api.me(&headers).await {
            Ok(me) if !me.user.username.trim().is_empty() => me.user.username,
            Ok(_) => user.fallback_name(),
            Err(e) => {
                warn!("Profile unavailable, using session name: {e}");
                user.fallback_name()
            }
        }
    }
}

async fn mirror(
    mut source: watch::Receiver<Vec<ChatMessage>>,
    state: Arc<watch::Sender<RoomState>>,
    limit: usize,
    cancel: CancellationToken,
) {
    loop {
        let latest = {
            let all = source.borrow_and_update();
            all[all.len().saturating_sub(limit)..].to_vec()
        };
        state.send_modify(|s| s.messages = latest);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = source.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!("Chat subscription closed");
}

pub struct CommunityRoom {
    trail: Trail,
    id: String,
    user: User,
    display_name: String,
    chat: Arc<dyn ChatStore>,
    state: Arc<watch::Sender<RoomState>>,
    cancel: CancellationToken,
}

impl CommunityRoom {
    pub fn trail(&self) -> &Trail {
        &self.trail
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn title(&self) -> String {
        format!("{} 커뮤니티", self.trail.name)
    }

    pub fn subscribe(&self) -> watch::Receiver<RoomState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RoomState {
        self.state.borrow().clone()
    }

    /// Post `text`.  Blank input is ignored; longer input is cut to the
    /// maximum length.  Returns whether a message was stored.
    pub async fn send(&self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let text: String = text.chars().take(MAX_MESSAGE_CHARS).collect();

        self.state.send_modify(|s| {
            s.sending = true;
            s.error = None;
        });
        let message = NewMessage {
            text,
            user_id: self.user.uid.clone(),
            user_name: if self.display_name.is_empty() { "익명".into() } else { self.display_name.clone() },
            user_email: self.user.email.clone(),
            trail_name: self.trail.name.clone(),
        };
        let result = self.chat.append(&self.id, message).await;

        let sent = result.is_ok();
        self.state.send_modify(|s| {
            s.sending = false;
            if let Err(e) = &result {
                error!("Message send failed: {e}");
                s.error = Some(e.user_message());
            }
        });
        sent
    }

    pub fn is_mine(&self, message: &ChatMessage) -> bool {
        message.user_id == self.user.uid
    }

    /// Render the current list relative to `now`.
    pub fn lines(&self, now: DateTime<Utc>) -> Vec<MessageLine> {
        let messages = self.state.borrow().messages.clone();
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let is_mine = self.is_mine(m);
                let name = (!is_mine && show_user_name(&messages, i)).then(|| m.user_name.clone());
                MessageLine {
                    text: m.text.clone(),
                    is_mine,
                    user_name: name,
                    time: relative_time(m.timestamp, now),
                }
            })
            .collect()
    }

    /// Stop mirroring the chat.
    pub fn leave(&self) {
        self.cancel.cancel();
    }
}

impl Drop for CommunityRoom {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A sender's name is shown on the first message and whenever the sender
/// differs from the previous one.
pub fn show_user_name(messages: &[ChatMessage], index: usize) -> bool {
    index == 0 || messages.get(index - 1).map(|m| &m.user_id) != messages.get(index).map(|m| &m.user_id)
}
