//! nice-mock: a mock endpoint for a length-prefixed EUC-KR partner protocol.
//!
//! Every connection carries one request and one response, framed as a
//! 10-digit zero-padded byte length followed by an EUC-KR payload. The server
//! answers after a random 0.5-2s delay with a synthetic 10-14KB payload and
//! caps concurrently active sessions, closing excess connections on accept.

pub mod admission;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod response;
pub mod server;
pub mod session;

pub use admission::{Admission, ServerStats, SessionPermit};
pub use codec::{Frame, FrameReader};
pub use config::Config;
pub use error::{FrameError, SessionError};
pub use response::{Response, ResponseGenerator};
pub use server::{Server, Shutdown};
pub use session::{Session, SessionContext, SessionState};
