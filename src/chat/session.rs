use super::decoder::{EventDecoder, StreamEvent};
use super::framer::LineFramer;
use super::transport::Transport;
use super::{ChatError, ChatPayload, StreamChunk};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Callbacks for one stream session.
///
/// `on_complete` fires at most once, and never after a transport failure.
/// `on_error` also reports application `error` chunks, which do not end the
/// session by themselves.
pub trait StreamHandler: Send {
    fn on_message(&mut self, chunk: StreamChunk);
    fn on_complete(&mut self);
    fn on_error(&mut self, message: String);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Owner's handle on a running session. Dropping it cancels the session.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stop delivering callbacks. Effects of callbacks already delivered stay.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the read loop to exit.
    pub async fn join(mut self) -> SessionOutcome {
        match (&mut self.task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(session = %self.id, error = %e, "chat session task failed");
                SessionOutcome::Failed
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Issue `payload` to `url` and feed the streamed reply to `handler` on a
/// background task. Must be called from within a tokio runtime.
pub fn open<H>(
    transport: Arc<dyn Transport>,
    url: String,
    payload: ChatPayload,
    mut handler: H,
) -> SessionHandle
where
    H: StreamHandler + 'static,
{
    let id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let span = tracing::info_span!("chat_session", session = %id);

    let task = tokio::spawn(
        async move {
            tracing::info!(url = %url, "starting chat stream");
            let opened = tokio::select! {
                biased;
                () = token.cancelled() => None,
                opened = transport.open_stream(&url, &payload) => Some(opened),
            };
            let outcome = match opened {
                None => SessionOutcome::Cancelled,
                Some(Err(_)) if token.is_cancelled() => SessionOutcome::Cancelled,
                Some(Err(e)) => {
                    tracing::error!(error = %e, "chat stream request failed");
                    handler.on_error(e.to_string());
                    SessionOutcome::Failed
                }
                Some(Ok(body)) => drive(body, &mut handler, &token).await,
            };
            tracing::info!(?outcome, "chat stream finished");
            outcome
        }
        .instrument(span),
    );

    SessionHandle { id, cancel, task }
}

/// Read loop over an already-open body.
///
/// The `[DONE]` sentinel and a clean end of body both complete the session,
/// and only the first of them counts. `cancel` is checked after every read
/// and before every callback.
pub async fn drive<S, B, H>(body: S, handler: &mut H, cancel: &CancellationToken) -> SessionOutcome
where
    S: Stream<Item = Result<B, ChatError>> + Unpin,
    B: AsRef<[u8]>,
    H: StreamHandler + ?Sized,
{
    let mut body = body;
    let mut framer = LineFramer::new();
    let mut decoder = EventDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return SessionOutcome::Cancelled,
            next = body.next() => next,
        };
        match next {
            Some(Ok(fragment)) => {
                for line in framer.push(fragment.as_ref()) {
                    if cancel.is_cancelled() {
                        return SessionOutcome::Cancelled;
                    }
                    if dispatch(&mut decoder, &line, handler) {
                        return SessionOutcome::Completed;
                    }
                }
            }
            Some(Err(e)) => {
                if cancel.is_cancelled() {
                    return SessionOutcome::Cancelled;
                }
                tracing::error!(error = %e, "chat stream read failed");
                handler.on_error(e.to_string());
                return SessionOutcome::Failed;
            }
            None => break,
        }
    }

    if let Some(line) = framer.finish() {
        if cancel.is_cancelled() {
            return SessionOutcome::Cancelled;
        }
        if dispatch(&mut decoder, &line, handler) {
            return SessionOutcome::Completed;
        }
    }
    if cancel.is_cancelled() {
        return SessionOutcome::Cancelled;
    }
    tracing::info!("chat stream closed without [DONE]");
    handler.on_complete();
    SessionOutcome::Completed
}

/// Returns true once the sentinel has been handled.
fn dispatch<H>(decoder: &mut EventDecoder, line: &str, handler: &mut H) -> bool
where
    H: StreamHandler + ?Sized,
{
    match decoder.decode(line) {
        Some(StreamEvent::Delta(chunk)) => handler.on_message(chunk),
        Some(StreamEvent::Failure(message)) => {
            tracing::warn!(message = %message, "error chunk in chat stream");
            handler.on_error(message);
        }
        Some(StreamEvent::Done) => {
            tracing::info!("received [DONE]");
            handler.on_complete();
            return true;
        }
        None => {}
    }
    false
}
