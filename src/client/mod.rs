//! The connecting side: the handshake state machine and the per-frame
//! client driver.

#[allow(clippy::module_inception)]
mod client;

pub use client::*;
