use super::models::Message;
use super::{Storage, StorageError};
use std::sync::Arc;

/// Ordered history of the active conversation, mirrored to [`Storage`].
///
/// Persistence is best-effort: failures are logged and never reach the
/// caller, and unreadable entries restore as an empty history.
pub struct ConversationStore {
    storage: Arc<dyn Storage>,
    key: String,
    messages: Vec<Message>,
}

impl ConversationStore {
    pub fn new(storage: Arc<dyn Storage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let messages = load_from(storage.as_ref(), &key);
        Self {
            storage,
            key,
            messages,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Switch to `key`, replacing the in-memory history with the persisted
    /// one. Re-activating the current key keeps the loaded history.
    pub fn activate(&mut self, key: &str) {
        if key == self.key {
            return;
        }
        self.key = key.to_string();
        self.messages = self.load(key);
    }

    /// Append to the active conversation and persist it.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.save(&self.key, &self.messages);
    }

    /// Drop the active conversation, both in memory and in storage.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.clear(&self.key);
    }

    pub fn load(&self, key: &str) -> Vec<Message> {
        load_from(self.storage.as_ref(), key)
    }

    pub fn save(&self, key: &str, messages: &[Message]) {
        let result = serde_json::to_string(messages)
            .map_err(StorageError::from)
            .and_then(|json| self.storage.set(key, &json));
        match result {
            Ok(()) => tracing::debug!(key, count = messages.len(), "saved chat history"),
            Err(e) => tracing::error!(key, error = %e, "failed to save chat history"),
        }
    }

    pub fn clear(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            tracing::error!(key, error = %e, "failed to clear chat history");
        }
    }
}

fn load_from(storage: &dyn Storage, key: &str) -> Vec<Message> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::error!(key, error = %e, "failed to read chat history");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<Message>>(&raw) {
        Ok(messages) => {
            tracing::info!(key, count = messages.len(), "loaded chat history");
            messages
        }
        Err(e) => {
            tracing::error!(key, error = %e, "discarding malformed chat history");
            Vec::new()
        }
    }
}
