//! Client-role packet handlers.
//!
//! Mirrors of the server handlers with the directions reversed: the
//! attempt is serialized here and consumed there; the grant, denial and
//! drop packets are consumed here. Pure data transforms, no socket I/O.

use tracing::{trace, warn};

use super::Netstate;
use crate::core::constants::UNASSIGNED_SLOT;
use crate::transport::{DenyReason, FrameError, Packet, PacketBody};

/// Build a liveness probe from a client that may not have a slot yet.
pub fn ping_serialize(my_slot: Option<i32>) -> Packet {
    Packet::from_body(&PacketBody::Ping, my_slot.unwrap_or(UNASSIGNED_SLOT))
}

/// A ping arrived; nothing to do beyond the liveness refresh the frame
/// driver already performed.
pub fn ping_deserialize() {
    trace!("ping from server");
}

/// Build the handshake request carrying our identity.
pub fn client_attempt_serialize(name: &str) -> Packet {
    Packet::from_body(
        &PacketBody::ClientAttempt {
            name: name.to_owned(),
        },
        UNASSIGNED_SLOT,
    )
}

/// Consume a handshake grant.
///
/// Returns the granted slot, or `None` when the grant is stale: a
/// `ClientAccept` received in any state but `NeedAuth` is out of order and
/// must be discarded, never acted on.
pub fn client_accept_deserialize(
    packet: &Packet,
    state: Netstate,
) -> Result<Option<i32>, FrameError> {
    let PacketBody::ClientAccept { slot } = packet.body()? else {
        return Err(FrameError::Malformed("expected a client accept"));
    };

    if state != Netstate::NeedAuth {
        warn!(?state, slot, "discarding stale client accept");
        return Ok(None);
    }
    Ok(Some(slot))
}

/// Consume a handshake refusal.
pub fn client_denied_deserialize(packet: &Packet) -> Result<DenyReason, FrameError> {
    match packet.body()? {
        PacketBody::ClientDenied { reason } => Ok(reason),
        _ => Err(FrameError::Malformed("expected a client denied")),
    }
}

/// Consume a drop broadcast, yielding the vacated slot.
pub fn drop_deserialize(packet: &Packet) -> Result<i32, FrameError> {
    match packet.body()? {
        PacketBody::Drop { slot } => Ok(slot),
        _ => Err(FrameError::Malformed("expected a drop")),
    }
}
