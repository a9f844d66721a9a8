use crate::constants::{auth, conversation};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cached upstream credentials for one conversation.
///
/// A token is only meaningful together with its expiry. The session id has no
/// expiry of its own and is dropped only when the upstream reports it invalid.
#[derive(Debug, Clone, Default)]
pub struct Session {
    access_token: Option<String>,
    token_expiry_epoch: i64,
    session_id: Option<String>,
}

impl Session {
    /// Returns the token if it stays valid for more than the refresh margin.
    pub fn cached_token(&self, now: i64) -> Option<&str> {
        let token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        if now < self
            .token_expiry_epoch
            .saturating_sub(auth::TOKEN_REFRESH_MARGIN_SECS)
        {
            Some(token)
        } else {
            None
        }
    }

    pub fn store_token(&mut self, token: String, expires_in: i64, now: i64) {
        self.access_token = Some(token);
        self.token_expiry_epoch = now.saturating_add(expires_in);
    }

    pub fn token_expiry_epoch(&self) -> i64 {
        self.token_expiry_epoch
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn store_session_id(&mut self, session_id: String) {
        self.session_id = Some(session_id);
    }

    /// Drops the cached session id if it is still `used`; the token is kept.
    pub fn invalidate_session_id(&mut self, used: &str) -> bool {
        if self.session_id.as_deref() == Some(used) {
            self.session_id = None;
            true
        } else {
            false
        }
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Scope of one tool invocation: the conversation's session plus the
/// request-scoped headers that may override credentials.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    id: String,
    session: SessionHandle,
    headers: HashMap<String, String>,
}

impl ConversationContext {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[derive(Debug)]
struct SessionEntry {
    handle: SessionHandle,
    last_used: i64,
}

/// Sessions keyed by conversation id. A conversation that sees no calls for
/// `idle_ttl_secs` is dropped on the next lookup, which ends its session.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, SessionEntry>,
    idle_ttl_secs: i64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_ttl(conversation::SESSION_IDLE_TTL_SECS)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl_secs: i64) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_ttl_secs,
        }
    }

    pub fn handle(&self, conversation_id: &str) -> SessionHandle {
        self.handle_at(conversation_id, chrono::Utc::now().timestamp())
    }

    fn handle_at(&self, conversation_id: &str, now: i64) -> SessionHandle {
        self.evict_idle(now);
        let mut entry = self
            .sessions
            .entry(conversation_id.to_string())
            .or_insert_with(|| SessionEntry {
                handle: Arc::new(Mutex::new(Session::default())),
                last_used: now,
            });
        entry.last_used = now;
        entry.handle.clone()
    }

    /// Drops conversations idle for at least the TTL and returns how many went.
    pub fn evict_idle(&self, now: i64) -> usize {
        let ttl = self.idle_ttl_secs;
        let mut evicted = 0;
        self.sessions.retain(|_, entry| {
            let keep = now.saturating_sub(entry.last_used) < ttl;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    pub fn context(
        &self,
        conversation_id: Option<&str>,
        headers: HashMap<String, String>,
    ) -> ConversationContext {
        let id = conversation_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(conversation::DEFAULT_CONVERSATION_ID)
            .to_string();
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        ConversationContext {
            session: self.handle(&id),
            id,
            headers,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
