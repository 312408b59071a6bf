use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::StreamExt as _;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::errors::TransportError;
use crate::provider::{HttpMethod, WireRequest};

/// Boxed stream of raw response bytes.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Lines processed between cooperative yields so a large or fast stream
/// cannot starve the rest of the host within one scheduling tick.
const YIELD_BATCH_LINES: usize = 8;

const CATALOG_CACHE_CAPACITY: usize = 16;
const CATALOG_CACHE_TTL: Duration = Duration::from_secs(60);

/// Incremental splitter from byte chunks to decoded lines.
///
/// A line split across chunk boundaries is held back until its newline
/// arrives; `flush` drains a trailing unterminated line at end of stream.
#[derive(Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(idx) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=idx).collect();
            lines.push(decode_line(&line_bytes[..line_bytes.len() - 1]));
        }
        lines
    }

    pub fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Append-only accumulator shared between a streaming task and the handles
/// that need a synchronous snapshot of it (cancel, stop).
#[derive(Clone, Default, Debug)]
pub(crate) struct Accumulator(Arc<Mutex<String>>);

impl Accumulator {
    pub fn append(&self, text: &str) {
        self.lock().push_str(text);
    }

    pub fn snapshot(&self) -> String {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, String> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// HTTP layer behind the engine; swapped for a fake in tests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Opens a streaming request and returns its byte stream.
    ///
    /// A non-success status fails here with the response body attached.
    async fn open(&self, request: &WireRequest) -> Result<ByteStream, TransportError>;

    /// Performs a GET and returns the whole body, consulting the
    /// short-lived catalog cache first.
    async fn fetch_text(&self, request: &WireRequest) -> Result<String, TransportError>;
}

/// Production transport over a shared `reqwest` client with fixed timeouts.
pub struct HttpTransport {
    client: reqwest::Client,
    catalog_cache: Mutex<GetCache>,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            catalog_cache: Mutex::new(GetCache::new(CATALOG_CACHE_CAPACITY, CATALOG_CACHE_TTL)),
        })
    }

    fn builder_for(&self, request: &WireRequest) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder
    }

    async fn send_checked(&self, request: &WireRequest) -> Result<reqwest::Response, TransportError> {
        let response = self
            .builder_for(request)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &WireRequest) -> Result<ByteStream, TransportError> {
        let response = self.send_checked(request).await?;
        Ok(Box::pin(response.bytes_stream().map(|item| {
            item.map_err(|e| TransportError::Read(e.to_string()))
        })))
    }

    async fn fetch_text(&self, request: &WireRequest) -> Result<String, TransportError> {
        let key = request.cache_key();
        if let Some(hit) = self.lock_cache().get(&key) {
            debug!(url = %request.url, "catalog cache hit");
            return Ok(hit);
        }
        let response = self.send_checked(request).await?;
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Read(e.to_string()))?;
        self.lock_cache().insert(key, body.clone());
        Ok(body)
    }
}

impl HttpTransport {
    fn lock_cache(&self) -> std::sync::MutexGuard<'_, GetCache> {
        self.catalog_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Final state of a streamed session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Everything the transform appended, in receipt order.
    pub text: String,
    /// False after cancel or a degraded (partial-text) failure.
    pub complete: bool,
}

/// One cancellable line-reading pass over a byte stream.
///
/// The transform sees every decoded line; its `Some` output is appended to
/// the shared accumulator. Cancellation is observed at every suspension
/// point, returns the text accumulated so far, and is idempotent.
pub(crate) struct TransportSession {
    accumulated: Accumulator,
    abort_rx: watch::Receiver<bool>,
}

impl TransportSession {
    pub fn new(accumulated: Accumulator, abort_rx: watch::Receiver<bool>) -> Self {
        Self {
            accumulated,
            abort_rx,
        }
    }

    pub async fn run<F, G>(
        self,
        mut stream: ByteStream,
        mut transform: F,
        mut on_append: G,
    ) -> Result<StreamOutcome, TransportError>
    where
        F: FnMut(&str) -> Option<String> + Send,
        G: FnMut(&str) + Send,
    {
        let Self {
            accumulated,
            mut abort_rx,
        } = self;
        // Second receiver for the per-line flag probe, so the select! arm
        // below keeps exclusive use of `abort_rx` for `changed()`.
        let abort_probe = abort_rx.clone();
        let mut decoder = LineDecoder::default();

        loop {
            tokio::select! {
                changed = abort_rx.changed() => {
                    // A dropped sender means every owning handle is gone;
                    // treat it like an abort rather than streaming into the void.
                    if changed.is_err() || *abort_rx.borrow() {
                        return Ok(StreamOutcome {
                            text: accumulated.snapshot(),
                            complete: false,
                        });
                    }
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(chunk)) => {
                            let lines = decoder.push_chunk(&chunk);
                            if consume_lines(
                                &accumulated,
                                &abort_probe,
                                &lines,
                                &mut transform,
                                &mut on_append,
                            )
                            .await
                            {
                                return Ok(StreamOutcome {
                                    text: accumulated.snapshot(),
                                    complete: false,
                                });
                            }
                        }
                        Some(Err(err)) => {
                            let text = accumulated.snapshot();
                            if text.is_empty() {
                                return Err(err);
                            }
                            warn!(error = %err, "stream failed mid-response, keeping partial text");
                            return Ok(StreamOutcome {
                                text,
                                complete: false,
                            });
                        }
                        None => {
                            if let Some(tail) = decoder.flush()
                                && let Some(text) = transform(&tail)
                            {
                                accumulated.append(&text);
                                on_append(&text);
                            }
                            return Ok(StreamOutcome {
                                text: accumulated.snapshot(),
                                complete: true,
                            });
                        }
                    }
                }
            }
        }
    }
}

/// Feeds one chunk's lines through the transform, appending each accepted
/// fragment and then notifying the observer. Returns true if an abort
/// arrived mid-batch; lines after the abort flag are dropped so no
/// continuation mutates post-cancel state.
async fn consume_lines<F, G>(
    accumulated: &Accumulator,
    abort_rx: &watch::Receiver<bool>,
    lines: &[String],
    transform: &mut F,
    on_append: &mut G,
) -> bool
where
    F: FnMut(&str) -> Option<String> + Send,
    G: FnMut(&str) + Send,
{
    for (index, line) in lines.iter().enumerate() {
        if *abort_rx.borrow() {
            return true;
        }
        if let Some(text) = transform(line) {
            accumulated.append(&text);
            on_append(&text);
        }
        if (index + 1) % YIELD_BATCH_LINES == 0 {
            tokio::task::yield_now().await;
        }
    }
    false
}

/// Bounded TTL cache with least-recently-used eviction, keyed by
/// URL + sorted headers. Keeps repeated catalog fetches off the network
/// within a short window.
pub(crate) struct GetCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
    recency: VecDeque<String>,
}

struct CacheEntry {
    body: String,
    fetched_at: Instant,
}

impl GetCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::new(),
            recency: VecDeque::new(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.fetched_at.elapsed() >= self.ttl {
            self.entries.remove(key);
            self.recency.retain(|k| k != key);
            return None;
        }
        let body = entry.body.clone();
        self.touch(key);
        Some(body)
    }

    pub fn insert(&mut self, key: String, body: String) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest) = self.recency.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key.clone(),
            CacheEntry {
                body,
                fetched_at: Instant::now(),
            },
        );
        self.touch(&key);
    }

    fn touch(&mut self, key: &str) {
        self.recency.retain(|k| k != key);
        self.recency.push_back(key.to_string());
    }
}
