//! Client for the external text-generation service.
//!
//! The service answers a POST with a stream of newline-delimited JSON
//! objects, each carrying an incremental text fragment and a `done` flag.
//! The stream is read to exhaustion; fragments are concatenated in arrival
//! order and the `done` flag is recorded but never used to stop early.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ChatError;

/// Outbound request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// One line of the response stream. Missing fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerationChunk {
    pub model: String,
    pub created_at: String,
    pub response: String,
    pub done: bool,
}

/// Anything that can turn a prompt into generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run one generation and return the fully accumulated text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ChatError>;
}

// =============================================================================
// StreamAccumulator
// =============================================================================

/// Incremental decoder for a line-delimited JSON stream.
///
/// Bytes may arrive split anywhere, including mid-line or mid-codepoint;
/// only complete lines are decoded. Blank lines are ignored and malformed
/// lines are logged and skipped.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    buffer: Vec<u8>,
    text: String,
    lines: usize,
    skipped: usize,
    done_seen: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        let mut buffer = std::mem::take(&mut self.buffer);
        // Between pushes the buffer holds no newline, so only new bytes are scanned.
        let mut cursor = buffer.len();
        buffer.extend_from_slice(bytes);

        let mut start = 0;
        while let Some(offset) = buffer[cursor..].iter().position(|b| *b == b'\n') {
            let end = cursor + offset;
            self.consume_line(&buffer[start..=end]);
            start = end + 1;
            cursor = start;
        }
        buffer.drain(..start);
        self.buffer = buffer;
    }

    /// Decode any trailing unterminated line and return the accumulated text.
    pub fn finish(mut self) -> String {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.consume_line(&rest);
        }
        debug!(
            lines = self.lines,
            skipped = self.skipped,
            done_seen = self.done_seen,
            chars = self.text.chars().count(),
            "Generation stream drained"
        );
        self.text
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn done_seen(&self) -> bool {
        self.done_seen
    }

    fn consume_line(&mut self, raw: &[u8]) {
        let decoded = String::from_utf8_lossy(raw);
        let line = decoded.trim();
        if line.is_empty() {
            return;
        }
        self.lines += 1;
        match serde_json::from_str::<GenerationChunk>(line) {
            Ok(chunk) => {
                self.text.push_str(&chunk.response);
                if chunk.done {
                    self.done_seen = true;
                }
            }
            Err(e) => {
                self.skipped += 1;
                warn!(error = %e, line = %line, "Skipping unparseable generation line");
            }
        }
    }
}

// =============================================================================
// OllamaClient
// =============================================================================

/// Streaming HTTP client for an Ollama-style `/api/generate` endpoint.
pub struct OllamaClient {
    client: Client,
    endpoint: Url,
}

impl OllamaClient {
    /// Build a client for `endpoint`.
    ///
    /// With `timeout` unset, a slow or hung upstream blocks the request
    /// indefinitely.
    pub fn new(endpoint: &str, timeout: Option<Duration>) -> Result<Self, ChatError> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| ChatError::InvalidEndpoint(format!("{endpoint}: {e}")))?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ChatError::InvalidEndpoint(e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ChatError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let mut stream = response.bytes_stream();
        let mut accumulator = StreamAccumulator::new();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| ChatError::StreamRead(e.to_string()))?;
            accumulator.push(&bytes);
        }

        Ok(accumulator.finish())
    }
}
