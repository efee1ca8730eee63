//! TCP listener for the mock endpoint.
//!
//! Accepts connections, applies admission control, and hands admitted
//! connections to a bounded pool of session workers. The accept loop never
//! waits on a worker: admitted sessions queue for a worker slot inside their
//! own task.

use crate::admission::{Admission, ServerStats};
use crate::config::Config;
use crate::session::{Session, SessionContext};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

/// Listen backlog for the bound socket
const LISTEN_BACKLOG: i32 = 1024;

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Stop signal for the accept loop.
#[derive(Debug, Clone)]
pub struct Shutdown {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Ask the server to stop accepting connections.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once `trigger` has been called.
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // the sender lives in self, so this cannot fail
        let _ = receiver.wait_for(|stop| *stop).await;
    }
}

/// Server instance
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: Arc<SessionContext>,
    admission: Admission,
    workers: Arc<Semaphore>,
}

impl Server {
    /// Bind the listening socket.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(config: Config) -> io::Result<Self> {
        let addr = config
            .bind_addr()
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("no address found for {}", config.bind_addr()),
                )
            })?;

        let listener = TcpListener::from_std(create_listener(addr)?)?;
        let local_addr = listener.local_addr()?;

        let stats = ServerStats::new();
        let admission = Admission::new(config.max_sessions, Arc::clone(&stats));
        let workers = Arc::new(Semaphore::new(config.max_workers));
        let ctx = SessionContext::new(config, stats);

        Ok(Server {
            listener,
            local_addr,
            ctx,
            admission,
            workers,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.ctx.stats)
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// On shutdown the listening socket is closed, then in-flight sessions
    /// get up to the configured grace period to finish.
    pub async fn run(self, shutdown: Shutdown) -> io::Result<()> {
        let Server {
            listener,
            local_addr,
            ctx,
            admission,
            workers,
        } = self;

        info!(address = %local_addr, "Server listening");

        let stop = shutdown.wait();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    info!("Shutdown requested, closing listener");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    // an accept racing the stop signal is not admitted
                    Ok((stream, peer)) if shutdown.is_triggered() => {
                        debug!(peer = %peer, "Dropping connection accepted during shutdown");
                        drop(stream);
                        break;
                    }
                    Ok((stream, peer)) => dispatch(stream, peer, &ctx, &admission, &workers),
                    Err(e) => {
                        error!(error = %e, "Accept error");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);

        let grace = ctx.config.shutdown_grace();
        if admission.drain(grace).await {
            info!("All sessions finished");
        } else {
            warn!(
                active = admission.active(),
                grace_ms = grace.as_millis() as u64,
                "Grace period elapsed with sessions still running"
            );
        }

        info!(
            total_requests = ctx.stats.total_requests(),
            completed = ctx.stats.completed(),
            rejected = ctx.stats.rejected(),
            "Server stopped"
        );
        Ok(())
    }
}

/// Admit or reject one accepted connection.
fn dispatch(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: &Arc<SessionContext>,
    admission: &Admission,
    workers: &Arc<Semaphore>,
) {
    let Some(permit) = admission.try_acquire() else {
        warn!(
            peer = %peer,
            active = admission.active(),
            max = admission.capacity(),
            rejected = ctx.stats.rejected(),
            "Max sessions reached, rejecting connection"
        );
        drop(stream);
        return;
    };

    debug!(peer = %peer, "New connection");

    let ctx = Arc::clone(ctx);
    let workers = Arc::clone(workers);
    tokio::spawn(async move {
        // released on every exit path of this task
        let _permit = permit;

        let Ok(_worker) = workers.acquire_owned().await else {
            return;
        };

        let request_id = ctx.stats.next_request_id();
        Session::new(request_id, peer, stream).run(&ctx).await;
    });
}

/// Create a TCP listener with SO_REUSEADDR so restarts can rebind at once.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}
