//! Error types for the framelink transport.

use thiserror::Error;

use crate::transport::FrameError;

/// Top-level transport errors.
///
/// Nothing here is globally fatal: transport failures mark the affected
/// socket dead for lazy cleanup, framing failures drop the offending peer
/// only. Protocol-level problems (unknown packet type for a role, stale
/// packets) are not errors at all; they are logged and discarded.
#[derive(Debug, Error)]
pub enum NetError {
    /// Outbound connection failed (resolution, refusal, or timeout).
    #[error("connection failed: {0}")]
    Connect(String),

    /// Could not bind the listening socket.
    #[error("bind failed: {0}")]
    Bind(String),

    /// I/O error on an established socket.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error; connection-fatal for the peer it came from.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// A bounded partial read or write ran past its deadline.
    #[error("network operation timed out")]
    Timeout,

    /// The peer shut down the stream in an orderly fashion.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The operation needs a live session and there is none.
    #[error("not connected")]
    NotConnected,
}

/// Convenience result alias used throughout the crate.
pub type NetResult<T> = Result<T, NetError>;
