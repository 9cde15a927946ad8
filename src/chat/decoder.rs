use super::StreamChunk;

const DATA_FIELD: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A chunk carrying a non-empty text delta.
    Delta(StreamChunk),
    /// An application-level `error` chunk.
    Failure(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Turns framed lines into [`StreamEvent`]s. After `Done` it goes quiet.
#[derive(Debug, Default)]
pub struct EventDecoder {
    done: bool,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn decode(&mut self, line: &str) -> Option<StreamEvent> {
        if self.done {
            return None;
        }
        let data = line.strip_prefix(DATA_FIELD)?;
        let data = data.strip_prefix(' ').unwrap_or(data);

        if data.trim() == DONE_SENTINEL {
            self.done = true;
            return Some(StreamEvent::Done);
        }

        let chunk = match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, data, "skipping malformed stream chunk");
                return None;
            }
        };

        if let Some(error) = chunk.error {
            return Some(StreamEvent::Failure(error));
        }
        match chunk.text {
            Some(text) if !text.is_empty() => Some(StreamEvent::Delta(StreamChunk {
                text: Some(text),
                error: None,
            })),
            _ => None,
        }
    }
}
