//! # Framelink
//!
//! A frame-driven TCP transport for client-server game sessions.
//!
//! Framelink moves length-prefixed packets between one listening host and
//! up to a configured number of remote clients, and runs the handshake
//! that assigns each client a slot. It is built for programs that already
//! have a main loop: nothing blocks, nothing spawns threads, and all
//! network progress happens inside an explicit per-frame call.
//!
//! - **Admission**: a three-tier policy (`Red`/`Yellow`/`Green`) decides
//!   whether new connections are accepted, and refused peers always learn
//!   why
//! - **Handshake**: a client attempt is answered with a slot grant or a
//!   reasoned denial; drops are broadcast so every peer sees who left
//! - **Liveness**: silent peers are evicted after a configurable timeout,
//!   with keepalive pings sent well before it expires
//! - **Game packets**: type bytes at or above [`crate::core::constants::GAME_PACKET_BASE`]
//!   are carried opaquely and routed through registered callbacks
//!
//! ## Modules
//!
//! - [`core`]: constants, configuration, errors, and the callback table
//! - [`transport`]: the wire codec and non-blocking socket wrappers
//! - [`protocol`]: packet handlers plus the admission and handshake rules
//! - [`server`]: the listening side and its frame driver
//! - [`client`]: the connecting side and its frame driver
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use framelink::prelude::*;
//!
//! fn main() -> NetResult<()> {
//!     let config = NetConfig::builder().port(1750).max_clients(8).build();
//!     let mut server = Server::start(config)?;
//!     loop {
//!         server.frame()?;
//!         for (slot, name) in server.drain_joined() {
//!             println!("{name} joined in slot {slot}");
//!         }
//!         std::thread::sleep(std::time::Duration::from_millis(16));
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;

pub mod transport;

pub mod protocol;

pub mod client;

pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        CallbackHook, CallbackTable, NetCallback, NetConfig, NetConfigBuilder, NetError, NetResult,
    };

    pub use crate::transport::{
        DenyReason, FrameError, Packet, PacketBody, PacketHeader, PacketType,
    };

    pub use crate::protocol::{Netmode, Netstate};

    pub use crate::client::Client;
    pub use crate::server::{SendTarget, Server};
}

// Re-export commonly used items at crate root
pub use crate::core::{NetConfig, NetError, NetResult};
pub use crate::protocol::{Netmode, Netstate};

pub use crate::client::Client;
pub use crate::server::{SendTarget, Server};
