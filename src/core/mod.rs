//! Core types shared by every layer: constants, configuration, errors, and
//! the lifecycle callback table.

mod callbacks;
mod config;
pub mod constants;
mod error;

pub use callbacks::{CallbackHook, CallbackTable, NetCallback};
pub use config::{NetConfig, NetConfigBuilder};
pub use error::{NetError, NetResult};
