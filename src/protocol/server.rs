//! Server-role packet handlers.
//!
//! Pure data transforms: serializers build outbound packets, deserializers
//! validate inbound ones, and the admission decision is a function of
//! policy plus registry occupancy. No handler touches a socket.

use tracing::trace;

use super::Netmode;
use crate::core::constants::HOST_SLOT;
use crate::transport::{DenyReason, FrameError, Packet, PacketBody};

/// Build a liveness probe.
pub fn ping_serialize() -> Packet {
    Packet::from_body(&PacketBody::Ping, HOST_SLOT)
}

/// A ping arrived; the frame driver already refreshed the liveness
/// timestamp when it read the packet.
pub fn ping_deserialize(slot: i32) {
    trace!(slot, "ping from client");
}

/// Build the broadcast announcing that `dropped_slot` was vacated.
pub fn drop_serialize(dropped_slot: i32) -> Packet {
    Packet::from_body(&PacketBody::Drop { slot: dropped_slot }, HOST_SLOT)
}

/// Build the grant that completes a handshake.
pub fn client_accept_serialize(granted_slot: i32) -> Packet {
    Packet::from_body(&PacketBody::ClientAccept { slot: granted_slot }, HOST_SLOT)
}

/// Build a refusal carrying `reason`.
pub fn client_denied_serialize(reason: DenyReason) -> Packet {
    Packet::from_body(&PacketBody::ClientDenied { reason }, HOST_SLOT)
}

/// Extract the identity from a handshake request.
pub fn client_attempt_deserialize(packet: &Packet) -> Result<String, FrameError> {
    match packet.body()? {
        PacketBody::ClientAttempt { name } => Ok(name),
        _ => Err(FrameError::Malformed("expected a client attempt")),
    }
}

/// Decide whether a new connection is admitted.
///
/// Admission happens at the protocol layer, not at transport accept, so a
/// refused peer always learns why.
pub fn admission_decision(
    netmode: Netmode,
    free_slot: Option<i32>,
) -> Result<i32, DenyReason> {
    match netmode {
        Netmode::Red | Netmode::Yellow => Err(DenyReason::NotAccepting),
        Netmode::Green => free_slot.ok_or(DenyReason::ServerFull),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_matrix() {
        // Green with a free slot admits.
        assert_eq!(admission_decision(Netmode::Green, Some(1)), Ok(1));

        // Green without a free slot is "server full".
        assert_eq!(
            admission_decision(Netmode::Green, None),
            Err(DenyReason::ServerFull)
        );

        // Yellow and Red refuse even with room available.
        for mode in [Netmode::Yellow, Netmode::Red] {
            assert_eq!(
                admission_decision(mode, Some(1)),
                Err(DenyReason::NotAccepting)
            );
            assert_eq!(
                admission_decision(mode, None),
                Err(DenyReason::NotAccepting)
            );
        }
    }

    #[test]
    fn test_attempt_deserialize() {
        let packet = Packet::from_body(
            &PacketBody::ClientAttempt {
                name: "grue".to_owned(),
            },
            -1,
        );
        assert_eq!(client_attempt_deserialize(&packet).unwrap(), "grue");

        let not_an_attempt = ping_serialize();
        assert!(client_attempt_deserialize(&not_an_attempt).is_err());
    }

    #[test]
    fn test_serializers_set_host_slot() {
        for packet in [
            ping_serialize(),
            drop_serialize(4),
            client_accept_serialize(2),
            client_denied_serialize(DenyReason::ServerFull),
        ] {
            assert_eq!(packet.header.client_slot, HOST_SLOT);
        }
    }
}
