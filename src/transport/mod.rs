//! Transport layer: the wire codec and the socket ownership wrappers.
//!
//! - **Packet framing**: [`Packet`], [`PacketHeader`], [`PacketBody`] and
//!   the length-prefixed wire format
//! - **Sockets**: [`Socket`] (one connected stream, move-only) and
//!   [`Listener`] (non-blocking accept)
//!
//! The transport knows nothing about admission or session state; it moves
//! exact frames and reports exact failures. Everything above it is pure
//! data transformation over in-memory packets.

mod frame;
mod socket;

pub use frame::{DenyReason, FrameError, Packet, PacketBody, PacketHeader, PacketType};
pub use socket::{Listener, Socket};
