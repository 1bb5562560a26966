use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::error::RelayError;
use crate::llm::CompletionProvider;
use crate::llm_types::{Message, Role};

pub const DEFAULT_SESSION_KEY: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// History is replaced by the incoming messages on every call.
    Ephemeral,
    /// History is append-only until remember is switched off.
    Accumulating,
}

/// Conversational state for one caller: system prompt, model, remember flag
/// and the message history sent with every completion.
#[derive(Debug, Clone)]
pub struct CompletionSession {
    system: String,
    model: String,
    remember: bool,
    history: VecDeque<Message>,
    history_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub model: String,
    pub system: String,
    pub remember: bool,
    pub mode: SessionMode,
    pub history: Vec<Message>,
}

impl CompletionSession {
    pub fn new(system: impl Into<String>, model: impl Into<String>) -> Self {
        CompletionSession {
            system: system.into(),
            model: model.into(),
            remember: false,
            history: VecDeque::new(),
            history_limit: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut session = Self::new(config.system_prompt.clone(), config.model.clone())
            .with_history_limit(config.history_limit());
        session.set_remember(config.remember);
        session
    }

    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self.enforce_limit();
        self
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn set_system(&mut self, system: impl Into<String>) {
        self.system = system.into();
    }

    /// Turning remember off drops the history immediately; turning it on
    /// from ephemeral mode starts from an empty history.
    pub fn set_remember(&mut self, remember: bool) {
        if remember != self.remember {
            self.history.clear();
        }
        self.remember = remember;
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn remember(&self) -> bool {
        self.remember
    }

    pub fn mode(&self) -> SessionMode {
        if self.remember {
            SessionMode::Accumulating
        } else {
            SessionMode::Ephemeral
        }
    }

    pub fn history(&self) -> Vec<Message> {
        self.history.iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// System entry followed by the current history.
    pub fn outgoing_messages(&self) -> Vec<Message> {
        std::iter::once(Message::system(self.system.clone()))
            .chain(self.history.iter().cloned())
            .collect()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            model: self.model.clone(),
            system: self.system.clone(),
            remember: self.remember,
            mode: self.mode(),
            history: self.history(),
        }
    }

    pub async fn submit(
        &mut self,
        provider: &dyn CompletionProvider,
        new_messages: Vec<Message>,
    ) -> Result<String, RelayError> {
        self.submit_with_model(provider, None, new_messages).await
    }

    /// Like `submit`, but `model` overrides the session model for this call
    /// only. The session model itself is left untouched.
    pub async fn submit_with_model(
        &mut self,
        provider: &dyn CompletionProvider,
        model: Option<&str>,
        new_messages: Vec<Message>,
    ) -> Result<String, RelayError> {
        if self.remember {
            self.history.extend(new_messages);
            // Also bounds history when the call below fails.
            self.enforce_limit();
        } else {
            self.history = new_messages.into();
        }

        let model = model.unwrap_or(self.model.as_str()).to_string();
        let outgoing = self.outgoing_messages();
        debug!(
            model = %model,
            mode = ?self.mode(),
            messages = outgoing.len(),
            "Submitting completion"
        );
        let reply = provider.complete(&model, outgoing).await?;

        if self.remember {
            self.history.push_back(Message::assistant(reply.clone()));
            self.enforce_limit();
        }
        Ok(reply)
    }

    /// Drops the oldest entries until the history fits, then keeps dropping
    /// until it starts on a user turn so no reply is left without its prompt.
    fn enforce_limit(&mut self) {
        let Some(limit) = self.history_limit else {
            return;
        };
        if self.history.len() <= limit {
            return;
        }
        while self.history.len() > limit {
            self.history.pop_front();
        }
        while self
            .history
            .front()
            .is_some_and(|m| m.role == Role::Assistant)
        {
            self.history.pop_front();
        }
    }
}

// ---------------------------------------------------------------------------
// Per-key session registry
// ---------------------------------------------------------------------------

struct SessionEntry {
    session: Arc<Mutex<CompletionSession>>,
    last_touch: Instant,
}

/// Hands out one `CompletionSession` per session key. Callers hold the
/// returned lock for the whole submit so calls on one key never interleave.
#[derive(Clone)]
pub struct SessionStore {
    template: CompletionSession,
    idle_ttl: Duration,
    entries: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

impl SessionStore {
    pub fn new(template: CompletionSession, idle_ttl: Duration) -> Self {
        SessionStore {
            template,
            idle_ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            CompletionSession::from_config(config),
            config.session_idle_ttl(),
        )
    }

    pub async fn session_for(&self, session_key: &str) -> Arc<Mutex<CompletionSession>> {
        let now = Instant::now();
        let mut guard = self.entries.lock().await;
        guard.retain(|key, entry| {
            if key == session_key {
                return true;
            }
            let stale = now.duration_since(entry.last_touch) > self.idle_ttl;
            // Remove only stale + unused sessions.
            !(stale && Arc::strong_count(&entry.session) == 1)
        });
        guard
            .entry(session_key.to_string())
            .and_modify(|entry| entry.last_touch = now)
            .or_insert_with(|| SessionEntry {
                session: Arc::new(Mutex::new(self.template.clone())),
                last_touch: now,
            })
            .session
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

pub fn normalize_session_key(session_key: Option<&str>) -> String {
    match session_key.map(str::trim) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => DEFAULT_SESSION_KEY.to_string(),
    }
}
