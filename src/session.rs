//! Per-connection session handling.
//!
//! Each accepted connection carries exactly one request and one response:
//!
//! ```text
//! Connected -> ReadingRequest -> Delaying -> GeneratingResponse -> SendingResponse -> Closed
//!      \              \              \                \                  \
//!       `--------------`--------------`----------------`------------------`--> Aborted
//! ```
//!
//! A request whose header cannot be read or parsed goes straight to `Closed`
//! without a response. A readable header is always answered, even when the
//! payload is short or empty. Timeouts and I/O failures end in `Aborted`.
//! Either way the stream is closed when the session returns, and the
//! admission slot held by the caller is released when its permit drops.

use crate::admission::ServerStats;
use crate::codec::{self, FrameReader};
use crate::config::Config;
use crate::error::{FrameError, SessionError};
use crate::response::ResponseGenerator;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, trace, warn};

/// Characters of the request shown in debug logs.
const PREVIEW_CHARS: usize = 200;

/// Lifecycle states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    ReadingRequest,
    Delaying,
    GeneratingResponse,
    SendingResponse,
    Closed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Aborted)
    }
}

/// State shared by every session of a server.
#[derive(Debug)]
pub struct SessionContext {
    pub config: Config,
    pub stats: Arc<ServerStats>,
    pub generator: ResponseGenerator,
}

impl SessionContext {
    pub fn new(config: Config, stats: Arc<ServerStats>) -> Arc<Self> {
        let generator = ResponseGenerator::from_config(&config);
        Arc::new(Self {
            config,
            stats,
            generator,
        })
    }

    /// Draw the simulated processing delay.
    fn draw_delay(&self) -> Duration {
        let ms = rand::thread_rng().gen_range(self.config.min_delay_ms..=self.config.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// One accepted connection.
pub struct Session<S> {
    request_id: u64,
    peer: SocketAddr,
    started: Instant,
    stream: S,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(request_id: u64, peer: SocketAddr, stream: S) -> Self {
        Self {
            request_id,
            peer,
            started: Instant::now(),
            stream,
            state: SessionState::Connected,
        }
    }

    /// Drive the session to completion and close the stream.
    ///
    /// Returns the terminal state. Errors are logged here and never escape.
    pub async fn run(mut self, ctx: &SessionContext) -> SessionState {
        let req_id = self.request_id;
        info!(
            req_id,
            peer = %self.peer,
            active = ctx.stats.active_sessions(),
            max = ctx.config.max_sessions,
            "Client connected"
        );

        match self.serve(ctx).await {
            Ok(()) => {}
            Err(SessionError::Frame(e @ (FrameError::IncompleteHeader | FrameError::InvalidHeader(_)))) => {
                warn!(req_id, error = %e, "Unreadable request header");
                self.transition(SessionState::Closed);
            }
            Err(e) => {
                error!(req_id, error = %e, "Error handling client");
                self.transition(SessionState::Aborted);
            }
        }

        let state = self.state;
        debug_assert!(state.is_terminal(), "session ended in {state:?}");
        self.close().await;
        info!(req_id, state = ?state, "Connection closed");
        state
    }

    async fn serve(&mut self, ctx: &SessionContext) -> Result<(), SessionError> {
        let req_id = self.request_id;
        let read_timeout = ctx.config.read_timeout();

        self.transition(SessionState::ReadingRequest);
        let frame = {
            let mut reader = FrameReader::new(&mut self.stream);
            tokio::time::timeout(read_timeout, reader.read_frame())
                .await
                .map_err(|_| SessionError::ReadTimeout(ctx.config.read_timeout_ms))??
        };

        if frame.is_empty() {
            warn!(req_id, declared = frame.declared_len, "Request has no payload");
        }
        info!(req_id, size = frame.len(), truncated = frame.truncated, "Request received");
        debug!(req_id, content = %preview(&frame.payload), "Request content");

        self.transition(SessionState::Delaying);
        let delay = ctx.draw_delay();
        info!(req_id, delay_ms = delay.as_millis() as u64, "Simulating delay");
        tokio::time::sleep(delay).await;

        self.transition(SessionState::GeneratingResponse);
        let response = ctx
            .generator
            .generate(&mut rand::thread_rng(), req_id, &frame.payload);

        // writes share the read deadline
        self.transition(SessionState::SendingResponse);
        tokio::time::timeout(read_timeout, codec::write_encoded(&mut self.stream, &response.message))
            .await
            .map_err(|_| {
                SessionError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "response write timed out",
                ))
            })??;

        ctx.stats.record_completed();
        info!(
            req_id,
            size = response.message.len(),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Response sent"
        );

        self.transition(SessionState::Closed);
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        trace!(req_id = self.request_id, from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }

    /// Shut the stream down. Failures are ignored.
    async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            trace!(req_id = self.request_id, error = %e, "Ignoring close error");
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
        out.push_str("...");
        out
    }
}
