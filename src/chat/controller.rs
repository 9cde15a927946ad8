//! The state machine a chat UI binds to.
//!
//! Session read loops and the elapsed-time ticker run as background tasks,
//! but they only post [`ControllerEvent`]s. All state changes happen on the
//! task that owns the controller, when it calls [`StreamController::next_event`]
//! or [`StreamController::poll_pending`].

use super::session::{self, SessionHandle, StreamHandler};
use super::transport::{HttpTransport, Transport};
use super::{ChatError, ChatPayload, ChatScope, StreamChunk, StreamStatus};
use crate::config::ClientConfig;
use crate::db::conversation::ConversationStore;
use crate::db::models::Message;
use crate::db::{Storage, StorageError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Delta(String),
    Complete,
    Error(String),
    Tick,
}

/// An event tagged with the session generation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerEvent {
    generation: u64,
    kind: EventKind,
}

struct ChannelHandler {
    generation: u64,
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl ChannelHandler {
    fn send(&self, kind: EventKind) {
        let _ = self.tx.send(ControllerEvent {
            generation: self.generation,
            kind,
        });
    }
}

impl StreamHandler for ChannelHandler {
    fn on_message(&mut self, chunk: StreamChunk) {
        if let Some(text) = chunk.text {
            self.send(EventKind::Delta(text));
        }
    }

    fn on_complete(&mut self) {
        self.send(EventKind::Complete);
    }

    fn on_error(&mut self, message: String) {
        self.send(EventKind::Error(message));
    }
}

pub struct StreamController {
    transport: Arc<dyn Transport>,
    base_url: String,
    scope: ChatScope,
    store: ConversationStore,
    status: StreamStatus,
    current: String,
    error: Option<String>,
    elapsed_secs: u64,
    generation: u64,
    session: Option<SessionHandle>,
    timer: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<ControllerEvent>,
    rx: mpsc::UnboundedReceiver<ControllerEvent>,
}

impl StreamController {
    /// Build a controller bound to `scope`, restoring its history from
    /// `storage`.
    pub fn new(
        transport: Arc<dyn Transport>,
        storage: Arc<dyn Storage>,
        base_url: impl Into<String>,
        scope: ChatScope,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = ConversationStore::new(storage, scope.storage_key());
        Self {
            transport,
            base_url: base_url.into(),
            scope,
            store,
            status: StreamStatus::Idle,
            current: String::new(),
            error: None,
            elapsed_secs: 0,
            generation: 0,
            session: None,
            timer: None,
            tx,
            rx,
        }
    }

    /// HTTP transport plus the storage backend named in `config`.
    pub fn from_config(config: &ClientConfig, scope: ChatScope) -> Result<Self, StorageError> {
        let storage = config.open_storage()?;
        Ok(Self::new(
            Arc::new(HttpTransport::new()),
            storage,
            config.base_url.clone(),
            scope,
        ))
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    /// Assistant text received so far for the in-flight reply.
    pub fn current_assistant_message(&self) -> &str {
        &self.current
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn scope(&self) -> &ChatScope {
        &self.scope
    }

    /// Send `text` and begin streaming the reply.
    ///
    /// The user message is committed before any network activity. Rejected
    /// calls leave every piece of state untouched. Must be called from
    /// within a tokio runtime.
    pub fn start(&mut self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.status.is_active() {
            tracing::debug!("start rejected, a stream is already running");
            return Err(ChatError::StreamInProgress);
        }

        self.store.append(Message::user(text));

        self.generation += 1;
        self.status = StreamStatus::Connecting;
        self.error = None;
        self.current.clear();
        self.elapsed_secs = 0;
        self.start_timer();

        let handler = ChannelHandler {
            generation: self.generation,
            tx: self.tx.clone(),
        };
        let url = self.scope.endpoint_url(&self.base_url);
        let payload = ChatPayload {
            message: text.to_string(),
        };
        let handle = session::open(self.transport.clone(), url, payload, handler);
        tracing::debug!(session = %handle.id(), generation = self.generation, "opened chat session");
        self.session = Some(handle);
        Ok(())
    }

    /// Abandon the live stream, if any, and go idle. The partial reply is
    /// dropped.
    pub fn stop(&mut self) {
        if self.cancel_session() {
            tracing::info!("stream stopped by user");
        }
        self.stop_timer();
        self.current.clear();
        self.status = StreamStatus::Idle;
    }

    /// Stop and wipe the active conversation, in memory and in storage.
    pub fn clear(&mut self) {
        self.cancel_session();
        self.stop_timer();
        self.store.reset();
        self.current.clear();
        self.error = None;
        self.status = StreamStatus::Idle;
        tracing::info!(key = self.store.key(), "chat messages cleared");
    }

    /// Rebind to another conversation. The previous scope's stream is
    /// cancelled and its history is left as persisted.
    pub fn switch_scope(&mut self, scope: ChatScope) {
        if scope == self.scope {
            return;
        }
        self.cancel_session();
        self.stop_timer();
        self.current.clear();
        self.error = None;
        self.elapsed_secs = 0;
        self.status = StreamStatus::Idle;
        self.store.activate(&scope.storage_key());
        tracing::info!(key = self.store.key(), "switched conversation");
        self.scope = scope;
    }

    /// Wait for the next event from the live session or ticker and apply it.
    ///
    /// Events from cancelled or superseded sessions are skipped. Pending
    /// forever while nothing is running.
    pub async fn next_event(&mut self) -> Option<EventKind> {
        loop {
            let event = self.rx.recv().await?;
            if let Some(kind) = self.apply(event) {
                return Some(kind);
            }
        }
    }

    /// Apply every event already queued, without waiting. Returns how many
    /// took effect.
    pub fn poll_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.rx.try_recv() {
            if self.apply(event).is_some() {
                applied += 1;
            }
        }
        applied
    }

    /// Pump events until the reply completes or fails.
    pub async fn run_until_settled(&mut self) -> StreamStatus {
        while self.status.is_active() {
            if self.next_event().await.is_none() {
                break;
            }
        }
        self.status
    }

    fn apply(&mut self, event: ControllerEvent) -> Option<EventKind> {
        if event.generation != self.generation || !self.status.is_active() {
            tracing::trace!(?event, "dropping stale controller event");
            return None;
        }
        match &event.kind {
            EventKind::Tick => self.elapsed_secs += 1,
            EventKind::Delta(text) => {
                self.status = StreamStatus::Streaming;
                self.current.push_str(text);
            }
            EventKind::Complete => {
                let reply = std::mem::take(&mut self.current);
                if !reply.is_empty() {
                    self.store.append(Message::assistant(reply));
                }
                self.status = StreamStatus::Complete;
                self.finish_session();
            }
            EventKind::Error(message) => {
                tracing::error!(message = %message, "chat stream failed");
                self.error = Some(message.clone());
                self.current.clear();
                self.status = StreamStatus::Error;
                self.finish_session();
            }
        }
        Some(event.kind)
    }

    fn finish_session(&mut self) {
        self.stop_timer();
        self.cancel_session();
    }

    /// Returns whether a session was still attached.
    fn cancel_session(&mut self) -> bool {
        match self.session.take() {
            Some(handle) => {
                if !handle.is_finished() {
                    tracing::debug!(session = %handle.id(), "cancelling chat session");
                }
                handle.cancel();
                true
            }
            None => false,
        }
    }

    fn start_timer(&mut self) {
        self.stop_timer();
        let tx = self.tx.clone();
        let generation = self.generation;
        self.timer = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            // The first tick resolves immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let event = ControllerEvent {
                    generation,
                    kind: EventKind::Tick,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.stop_timer();
        self.cancel_session();
    }
}
