//! Protocol dispatch: per-role packet handlers and the session state
//! machine that governs which packets are legal when.
//!
//! Serialization and deserialization are asymmetric between the roles (the
//! server's `ClientAccept` serializer constructs the grant; the client's
//! deserializer consumes it), so each role has its own handler module:
//! [`server`] and [`client`]. Handlers never perform socket I/O; they
//! transform in-memory packets and session state only, which keeps the
//! protocol logic testable without a transport underneath.

pub mod client;
pub mod server;

use crate::transport::PacketType;

/// Which side of the connection is dispatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The listening host.
    Server,
    /// A joining peer.
    Client,
}

/// Server-side admission policy.
///
/// Mutated only by explicit operator or config action; read by the accept
/// path every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Netmode {
    /// No connections allowed; current connections are terminated.
    Red,
    /// No new connections; current connections are kept.
    Yellow,
    /// Anything goes.
    Green,
}

/// A single connection's handshake progress.
///
/// Monotonic forward except on disconnect, which resets to `NoConnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Netstate {
    /// Not connected to any network, not listening.
    NoConnect,
    /// Listening for connections.
    Listen,
    /// Connected to a server, awaiting the authorization packet.
    NeedAuth,
    /// Connected and authorized.
    Authorized,
}

/// Whether a control packet type is legal for `role` to *receive*.
///
/// An illegal or unknown type for the receiving role is a protocol error:
/// logged and discarded, never connection-fatal, so peers with additional
/// packet types stay compatible.
pub fn receivable(packet_type: PacketType, role: Role) -> bool {
    match (packet_type, role) {
        (PacketType::Ping, _) => true,
        (PacketType::ClientAttempt, Role::Server) => true,
        (
            PacketType::Drop | PacketType::ClientAccept | PacketType::ClientDenied,
            Role::Client,
        ) => true,
        _ => false,
    }
}
