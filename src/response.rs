//! Synthetic response generation.
//!
//! A response body looks like:
//!
//! ```text
//! MOCK_RESPONSE_000042_1760745600000_REQ:<first 50 request chars>_DATA_BLOCK_00000_
//! SAMPLE_TEXT_00001_MOCK_FIELD_00002_...
//! ```
//!
//! The body is padded with ASCII blocks up to a randomly drawn size, so its
//! EUC-KR byte length equals the drawn size exactly. Everything apart from
//! the size draw and the clock is deterministic, which keeps the output
//! reproducible under a seeded RNG.

use crate::codec::{self, encoded_len};
use crate::config::{Config, HEADER_SIZE};
use bytes::Bytes;
use rand::Rng;
use tracing::debug;

/// Prefix identifying every generated response.
pub const RESPONSE_PREFIX: &str = "MOCK_RESPONSE_";

/// Block tags cycled through while padding.
pub const PADDING_PATTERNS: [&str; 5] = [
    "DATA_BLOCK_",
    "SAMPLE_TEXT_",
    "MOCK_FIELD_",
    "TEST_VALUE_",
    "RESPONSE_ITEM_",
];

/// Requests with more characters than this are echoed back.
const ECHO_THRESHOLD: usize = 20;

/// Maximum number of request characters echoed.
const ECHO_MAX_CHARS: usize = 50;

/// A newline follows every block whose number is a multiple of this.
const NEWLINE_EVERY: usize = 10;

/// A generated message ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Header and EUC-KR payload.
    pub message: Bytes,
}

impl Response {
    /// The 10-digit length header.
    pub fn header(&self) -> &[u8] {
        &self.message[..HEADER_SIZE]
    }

    /// Encoded payload following the header.
    pub fn payload(&self) -> &[u8] {
        &self.message[HEADER_SIZE..]
    }

    /// Payload byte length (the value carried by the header).
    pub fn payload_len(&self) -> usize {
        self.message.len() - HEADER_SIZE
    }
}

/// Draws response sizes and builds responses.
#[derive(Debug, Clone, Copy)]
pub struct ResponseGenerator {
    min_bytes: usize,
    max_bytes: usize,
}

impl ResponseGenerator {
    /// Create a generator for payloads of `min_bytes..=max_bytes`.
    pub fn new(min_bytes: usize, max_bytes: usize) -> Self {
        Self {
            min_bytes,
            max_bytes: max_bytes.max(min_bytes),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.min_response_bytes, config.max_response_bytes)
    }

    /// Draw a payload size, uniform over the inclusive range.
    pub fn target_size<R: Rng>(&self, rng: &mut R) -> usize {
        rng.gen_range(self.min_bytes..=self.max_bytes)
    }

    /// Generate a response for `request_id` using the current time.
    pub fn generate<R: Rng>(&self, rng: &mut R, request_id: u64, request: &str) -> Response {
        let target = self.target_size(rng);
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        build_response(request_id, request, target, timestamp_ms)
    }
}

/// Build a framed response whose payload is exactly `target_size` bytes.
///
/// When the fixed prefix alone already exceeds `target_size` no padding is
/// added and the payload is longer than requested.
pub fn build_response(request_id: u64, request: &str, target_size: usize, timestamp_ms: i64) -> Response {
    let mut body = response_prefix(request_id, request, timestamp_ms);
    let remaining = target_size.saturating_sub(encoded_len(&body));
    body.push_str(&padding(remaining));

    let message = codec::encode_frame(&body);
    debug!(
        req_id = request_id,
        header = %String::from_utf8_lossy(&message[..HEADER_SIZE]),
        data_size = message.len() - HEADER_SIZE,
        "Response generated"
    );

    Response { message }
}

/// Identifier, timestamp and optional request echo.
fn response_prefix(request_id: u64, request: &str, timestamp_ms: i64) -> String {
    let mut body = format!("{RESPONSE_PREFIX}{request_id:06}_{timestamp_ms}_");

    if request.chars().count() > ECHO_THRESHOLD {
        body.push_str("REQ:");
        body.extend(request.chars().take(ECHO_MAX_CHARS));
        body.push('_');
    }

    body
}

/// ASCII padding of exactly `size` bytes.
pub fn padding(size: usize) -> String {
    let mut out = String::with_capacity(size + 32);

    let mut block = 0usize;
    while out.len() < size {
        out.push_str(PADDING_PATTERNS[block % PADDING_PATTERNS.len()]);
        out.push_str(&format!("{block:05}_"));
        if block % NEWLINE_EVERY == 0 {
            out.push('\n');
        }
        block += 1;
    }

    out.truncate(size);
    out
}
