use std::sync::{Arc, Mutex};

use tokio::sync::{oneshot, watch};
use tracing::debug;
use uuid::Uuid;

use crate::errors::EngineError;
use crate::provider::{ChatRequest, HistoryTurn, ProviderAdapter, WireRequest};
use crate::transport::{Accumulator, HttpTransport, Transport, TransportSession};

/// One attached document, already extracted to plain text upstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub text: String,
}

/// Caller input for one send.
#[derive(Clone, Debug, Default)]
pub struct OutgoingMessage {
    pub text: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub history: Vec<HistoryTurn>,
    /// Continuity token from the previous completion-style response.
    pub context: Option<serde_json::Value>,
    pub attachments: Vec<Attachment>,
}

impl OutgoingMessage {
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn history(mut self, history: Vec<HistoryTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn attachment(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.attachments.push(Attachment {
            name: name.into(),
            text: text.into(),
        });
        self
    }

    /// True when the send carried extracted documents; feeds the file-edit
    /// detector's attachment-context rule.
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Resolved result of one send.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatOutcome {
    /// Everything extracted from the stream, in receipt order.
    pub text: String,
    /// Latest continuity token seen (completion-style backends only);
    /// resend it on the next message.
    pub context: Option<serde_json::Value>,
    /// False when the stream was cancelled or degraded to partial text.
    pub complete: bool,
}

struct SessionSlot {
    id: Uuid,
    abort: watch::Sender<bool>,
    accumulated: Accumulator,
}

/// Handle for one in-flight send.
#[derive(Debug)]
pub struct MessageHandle {
    id: Uuid,
    abort: watch::Sender<bool>,
    accumulated: Accumulator,
    result: oneshot::Receiver<Result<ChatOutcome, EngineError>>,
}

impl MessageHandle {
    /// Id of this send, for log correlation.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Text accumulated so far, without disturbing the stream.
    pub fn partial_text(&self) -> String {
        self.accumulated.snapshot()
    }

    /// Aborts the transport and returns the text accumulated so far.
    ///
    /// Idempotent: calling it twice, or after natural completion, returns
    /// the same text and never errors. `finish` still resolves normally.
    pub fn cancel(&self) -> String {
        let _ = self.abort.send(true);
        self.accumulated.snapshot()
    }

    /// Waits for the terminal result.
    ///
    /// Resolves with the full text on natural end, the partial text after
    /// cancel or a mid-stream failure; errors only when nothing at all was
    /// received.
    pub async fn finish(self) -> Result<ChatOutcome, EngineError> {
        match self.result.await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Protocol(
                "session task ended without a result".into(),
            )),
        }
    }
}

/// Uniform client surface over one provider adapter plus shared transport
/// plumbing. Owns the single in-flight session.
pub struct ChatClient {
    adapter: Arc<dyn ProviderAdapter>,
    transport: Arc<dyn Transport>,
    current: Mutex<Option<SessionSlot>>,
}

impl ChatClient {
    /// Creates a client over the production HTTP transport.
    pub fn new(adapter: Arc<dyn ProviderAdapter>) -> Result<Self, EngineError> {
        let transport = HttpTransport::new()
            .map_err(|e| EngineError::Config(format!("failed to build transport: {e}")))?;
        Ok(Self::with_transport(adapter, Arc::new(transport)))
    }

    /// Creates a client over an explicit transport (tests, proxies).
    pub fn with_transport(adapter: Arc<dyn ProviderAdapter>, transport: Arc<dyn Transport>) -> Self {
        Self {
            adapter,
            transport,
            current: Mutex::new(None),
        }
    }

    /// Fetches and normalizes the backend's model catalog.
    ///
    /// Fails fast with a not-configured error before any network call when
    /// the credential is missing. Repeated calls within the cache window
    /// are served from the transport's GET cache.
    pub async fn fetch_model_names(&self) -> Result<Vec<String>, EngineError> {
        let wire = self.adapter.list_models_request()?;
        debug!(provider = %self.adapter.id(), "fetching model catalog");
        let body = self.transport.fetch_text(&wire).await?;
        Ok(self.adapter.normalize_model_list(&body))
    }

    /// Starts streaming one message; must be called within a Tokio runtime.
    ///
    /// Any active session is retired (cancelled) first — starting a send is
    /// the linearization point for the single-flight contract. `on_delta`
    /// fires for every extracted text fragment, strictly in receipt order.
    ///
    /// Configuration errors (missing credential or model) fail here, before
    /// any transport is opened.
    pub fn send_message<F>(
        &self,
        message: OutgoingMessage,
        on_delta: F,
    ) -> Result<MessageHandle, EngineError>
    where
        F: Fn(&str) + Send + 'static,
    {
        let request = build_chat_request(&message);
        let wire = self.adapter.build_request(&request)?;

        let id = Uuid::new_v4();
        let accumulated = Accumulator::default();
        let (abort_tx, abort_rx) = watch::channel(false);
        let (result_tx, result_rx) = oneshot::channel();

        self.replace_current(SessionSlot {
            id,
            abort: abort_tx.clone(),
            accumulated: accumulated.clone(),
        });

        debug!(session = %id, provider = %self.adapter.id(), model = %request.model, "starting stream");
        let adapter = self.adapter.clone();
        let transport = self.transport.clone();
        let task_accumulated = accumulated.clone();
        tokio::spawn(async move {
            let outcome =
                stream_task(adapter, transport, wire, task_accumulated, abort_rx, on_delta).await;
            let _ = result_tx.send(outcome);
        });

        Ok(MessageHandle {
            id,
            abort: abort_tx,
            accumulated,
            result: result_rx,
        })
    }

    /// Cancels the active session, if any, returning its text so far.
    pub fn stop(&self) -> Option<String> {
        let guard = self.lock_current();
        guard.as_ref().map(|slot| {
            debug!(session = %slot.id, "stop requested");
            let _ = slot.abort.send(true);
            slot.accumulated.snapshot()
        })
    }

    fn replace_current(&self, slot: SessionSlot) {
        let mut guard = self.lock_current();
        if let Some(previous) = guard.take() {
            debug!(session = %previous.id, "retiring active session");
            let _ = previous.abort.send(true);
        }
        *guard = Some(slot);
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<SessionSlot>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn build_chat_request(message: &OutgoingMessage) -> ChatRequest {
    let mut prompt = message.text.clone();
    for attachment in &message.attachments {
        prompt.push_str("\n\n[Attached file: ");
        prompt.push_str(&attachment.name);
        prompt.push_str("]\n");
        prompt.push_str(&attachment.text);
    }
    ChatRequest {
        model: message.model.clone(),
        prompt,
        temperature: message.temperature,
        history: message.history.clone(),
        context: message.context.clone(),
    }
}

async fn stream_task<F>(
    adapter: Arc<dyn ProviderAdapter>,
    transport: Arc<dyn Transport>,
    wire: WireRequest,
    accumulated: Accumulator,
    abort_rx: watch::Receiver<bool>,
    on_delta: F,
) -> Result<ChatOutcome, EngineError>
where
    F: Fn(&str) + Send + 'static,
{
    let stream = match transport.open(&wire).await {
        Ok(stream) => stream,
        Err(err) => {
            // Cancelled while connecting: not an error, just empty.
            if *abort_rx.borrow() {
                return Ok(ChatOutcome {
                    text: accumulated.snapshot(),
                    context: None,
                    complete: false,
                });
            }
            return Err(err.into());
        }
    };

    let mut latest_context: Option<serde_json::Value> = None;
    let session = TransportSession::new(accumulated, abort_rx);
    let outcome = session
        .run(
            stream,
            |line| {
                let delta = adapter.extract_delta(line)?;
                if let Some(context) = delta.context {
                    latest_context = Some(context);
                }
                delta.text.filter(|text| !text.is_empty())
            },
            move |text| on_delta(text),
        )
        .await?;

    Ok(ChatOutcome {
        text: outcome.text,
        context: latest_context,
        complete: outcome.complete,
    })
}
