//! One-shot client for the mock endpoint.
//!
//! Sends a single framed request and reads the framed response, using the
//! same codec as the server.

use crate::codec::{self, FrameReader};
use crate::error::FrameError;
use std::io;
use std::time::{Duration, Instant};
use tokio::net::{TcpStream, ToSocketAddrs};

/// A response received by [`send_request`].
#[derive(Debug, Clone)]
pub struct ClientResponse {
    /// Length declared by the response header.
    pub declared_len: usize,
    /// Payload bytes actually received.
    pub received_len: usize,
    /// Decoded payload.
    pub payload: String,
    /// Time from connect to the end of the response.
    pub elapsed: Duration,
}

/// Connect, send `payload` as one framed request and read one framed response.
///
/// The whole exchange is bounded by `timeout`.
pub async fn send_request<A>(addr: A, payload: &str, timeout: Duration) -> Result<ClientResponse, FrameError>
where
    A: ToSocketAddrs,
{
    let started = Instant::now();

    tokio::time::timeout(timeout, exchange(addr, payload, started))
        .await
        .map_err(|_| FrameError::Io(io::Error::new(io::ErrorKind::TimedOut, "request timed out")))?
}

async fn exchange<A>(addr: A, payload: &str, started: Instant) -> Result<ClientResponse, FrameError>
where
    A: ToSocketAddrs,
{
    let mut stream = TcpStream::connect(addr).await?;
    codec::write_frame(&mut stream, payload).await?;

    let frame = FrameReader::new(&mut stream).read_frame().await?;

    Ok(ClientResponse {
        declared_len: frame.declared_len,
        received_len: frame.len(),
        payload: frame.payload,
        elapsed: started.elapsed(),
    })
}
