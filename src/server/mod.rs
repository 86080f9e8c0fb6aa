//! The listening side: connection admission, the slot registry, and the
//! per-frame server driver.

mod registry;
#[allow(clippy::module_inception)]
mod server;

pub use registry::{ClientSlot, ConnectionRegistry};
pub use server::{SendTarget, Server};
