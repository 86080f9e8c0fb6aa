//! Protocol constants.
//!
//! These values are fixed by the wire protocol and MUST NOT be changed
//! without bumping [`PROTOCOL_VERSION`]; both peers must agree on all of
//! them bit-for-bit.

use std::time::Duration;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Protocol version tag carried in every packet header.
pub const PROTOCOL_VERSION: u8 = 0;

/// Packet header size on the wire (version + type + payload length + slot).
pub const PACKET_HEADER_SIZE: usize = 10;

/// Maximum declared payload size. A header announcing more is a framing
/// error and connection-fatal.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024;

/// Maximum length of the identity string carried by a join attempt.
pub const MAX_NAME_LEN: usize = 64;

/// First packet-type byte available to game-defined packets. Everything
/// below this is reserved for the transport's control packets.
pub const GAME_PACKET_BASE: u8 = 0x10;

// =============================================================================
// SLOTS
// =============================================================================

/// Client slot reserved for the host.
pub const HOST_SLOT: i32 = 0;

/// Slot value used before the server has granted one.
pub const UNASSIGNED_SLOT: i32 = -1;

// =============================================================================
// DEFAULTS (overridable through `NetConfig`)
// =============================================================================

/// Default listening port.
pub const DEFAULT_PORT: u16 = 1750;

/// Default listen backlog hint.
pub const DEFAULT_BACKLOG: u32 = 32;

/// Default maximum number of concurrent remote clients.
pub const DEFAULT_MAX_CLIENTS: usize = 8;

/// Default per-connection inactivity timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// TIMING
// =============================================================================

/// TCP connect timeout for outbound connections.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for completing one partial packet read or write. Bounded so a
/// stalled peer mid-packet surfaces as a timeout instead of looping forever.
pub const IO_DEADLINE: Duration = Duration::from_secs(5);

/// Backoff between retries of a partial read or write.
pub const IO_RETRY_DELAY: Duration = Duration::from_millis(1);

/// A connection quiet for `timeout / KEEPALIVE_DIVISOR` gets a ping queued,
/// keeping an idle but healthy link clear of the eviction threshold.
pub const KEEPALIVE_DIVISOR: u32 = 3;

/// Keepalive cadence for a given inactivity timeout.
pub fn keepalive_interval(timeout: Duration) -> Duration {
    timeout / KEEPALIVE_DIVISOR
}
