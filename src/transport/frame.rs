//! Packet encoding and decoding.
//!
//! Every packet is a fixed 10-byte header followed by exactly
//! `payload_len` opaque bytes. The protocol runs over a reliable stream,
//! so no resynchronization or escape scheme is needed; the length prefix
//! alone delimits packets.

use thiserror::Error;

use crate::core::constants::{
    GAME_PACKET_BASE, MAX_NAME_LEN, MAX_PAYLOAD_SIZE, PACKET_HEADER_SIZE, PROTOCOL_VERSION,
};

/// Control packet types. Bytes at or above [`GAME_PACKET_BASE`] belong to
/// game-defined packets and never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Liveness probe; receipt refreshes the peer's liveness timestamp.
    Ping = 0x01,
    /// Server informs remaining peers that a slot was vacated.
    Drop = 0x02,
    /// Client's handshake request to join, carrying its identity.
    ClientAttempt = 0x03,
    /// Server grants a slot number, completing the handshake.
    ClientAccept = 0x04,
    /// Server refuses a join with a reason code.
    ClientDenied = 0x05,
}

impl PacketType {
    /// Parse a control packet type from a byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Ping),
            0x02 => Some(Self::Drop),
            0x03 => Some(Self::ClientAttempt),
            0x04 => Some(Self::ClientAccept),
            0x05 => Some(Self::ClientDenied),
            _ => None,
        }
    }

    /// The byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Reason codes carried by a `ClientDenied` packet, so the refused peer
/// can tell its user why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DenyReason {
    /// Every client slot is occupied.
    ServerFull = 0x01,
    /// The server's netmode does not admit new connections.
    NotAccepting = 0x02,
    /// The peer speaks a different protocol version.
    WrongVersion = 0x03,
}

impl DenyReason {
    /// Parse a deny reason from its wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::ServerFull),
            0x02 => Some(Self::NotAccepting),
            0x03 => Some(Self::WrongVersion),
            _ => None,
        }
    }

    /// The byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::ServerFull => "server full",
            Self::NotAccepting => "server not accepting connections",
            Self::WrongVersion => "protocol version mismatch",
        };
        f.write_str(text)
    }
}

/// Fixed-size packet header.
///
/// Wire format (10 bytes, little-endian):
/// ```text
/// +---------+--------+----------------+----------------+
/// | Version | Type   | Payload Length | Client Slot    |
/// | 1 byte  | 1 byte | 4 bytes (LE32) | 4 bytes (LE32) |
/// +---------+--------+----------------+----------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Protocol version tag.
    pub version: u8,
    /// Raw packet-type byte; control types per [`PacketType`], everything
    /// at or above [`GAME_PACKET_BASE`] is game-defined.
    pub packet_type: u8,
    /// Exact payload size following the header.
    pub payload_len: u32,
    /// Originating client slot.
    pub client_slot: i32,
}

impl PacketHeader {
    /// Create a header for the current protocol version.
    pub fn new(packet_type: u8, payload_len: u32, client_slot: i32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            packet_type,
            payload_len,
            client_slot,
        }
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> [u8; PACKET_HEADER_SIZE] {
        let mut buf = [0u8; PACKET_HEADER_SIZE];
        buf[0] = self.version;
        buf[1] = self.packet_type;
        buf[2..6].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[6..10].copy_from_slice(&self.client_slot.to_le_bytes());
        buf
    }

    /// Parse from wire bytes, validating version and declared size.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < PACKET_HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: PACKET_HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let version = bytes[0];
        if version != PROTOCOL_VERSION {
            return Err(FrameError::WrongVersion {
                expected: PROTOCOL_VERSION,
                actual: version,
            });
        }

        let payload_len = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        if payload_len as usize > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge {
                size: payload_len as usize,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let client_slot = i32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);

        Ok(Self {
            version,
            packet_type: bytes[1],
            payload_len,
            client_slot,
        })
    }
}

/// Decoded packet contents, one variant per packet kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketBody {
    /// Liveness probe; empty payload.
    Ping,
    /// A slot was vacated.
    Drop {
        /// The vacated slot.
        slot: i32,
    },
    /// Handshake request to join.
    ClientAttempt {
        /// Desired identity (player name), UTF-8, at most `MAX_NAME_LEN` bytes.
        name: String,
    },
    /// Handshake grant.
    ClientAccept {
        /// The granted slot.
        slot: i32,
    },
    /// Handshake refusal.
    ClientDenied {
        /// Why the join was refused.
        reason: DenyReason,
    },
    /// Game-defined packet; the transport carries it opaquely and hands it
    /// to the registered serialize/deserialize callbacks.
    Game {
        /// Game packet kind; must be at or above [`GAME_PACKET_BASE`].
        kind: u8,
        /// Opaque game payload.
        data: Vec<u8>,
    },
}

impl PacketBody {
    /// Check sender-side limits before the body is queued.
    ///
    /// The receive path rejects these on the wire anyway, but by then the
    /// peer has already torn the connection down over what was a purely
    /// local mistake. Catching them here surfaces the error to the caller
    /// that made it, with the connection untouched.
    pub fn validate(&self) -> Result<(), FrameError> {
        match self {
            Self::ClientAttempt { name } => {
                if name.len() > MAX_NAME_LEN {
                    return Err(FrameError::Malformed("attempt name too long"));
                }
            }
            Self::Game { kind, data } => {
                if *kind < GAME_PACKET_BASE {
                    return Err(FrameError::Malformed("game packet kind in reserved range"));
                }
                if data.len() > MAX_PAYLOAD_SIZE {
                    return Err(FrameError::PayloadTooLarge {
                        size: data.len(),
                        max: MAX_PAYLOAD_SIZE,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// The packet-type byte this body travels under.
    pub fn packet_type(&self) -> u8 {
        match self {
            Self::Ping => PacketType::Ping.as_byte(),
            Self::Drop { .. } => PacketType::Drop.as_byte(),
            Self::ClientAttempt { .. } => PacketType::ClientAttempt.as_byte(),
            Self::ClientAccept { .. } => PacketType::ClientAccept.as_byte(),
            Self::ClientDenied { .. } => PacketType::ClientDenied.as_byte(),
            Self::Game { kind, .. } => *kind,
        }
    }

    /// Encode the payload bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Ping => Vec::new(),
            Self::Drop { slot } => slot.to_le_bytes().to_vec(),
            Self::ClientAttempt { name } => {
                let bytes = name.as_bytes();
                let mut buf = Vec::with_capacity(2 + bytes.len());
                buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
                buf.extend_from_slice(bytes);
                buf
            }
            Self::ClientAccept { slot } => slot.to_le_bytes().to_vec(),
            Self::ClientDenied { reason } => vec![reason.as_byte()],
            Self::Game { data, .. } => data.clone(),
        }
    }

    /// Decode a payload according to its type byte.
    ///
    /// Type bytes between the last control type and [`GAME_PACKET_BASE`]
    /// are reserved; they decode to [`FrameError::UnknownType`], which the
    /// dispatch layer logs and discards without dropping the connection.
    pub fn decode(packet_type: u8, payload: &[u8]) -> Result<Self, FrameError> {
        if packet_type >= GAME_PACKET_BASE {
            return Ok(Self::Game {
                kind: packet_type,
                data: payload.to_vec(),
            });
        }

        let Some(control) = PacketType::from_byte(packet_type) else {
            return Err(FrameError::UnknownType(packet_type));
        };

        match control {
            PacketType::Ping => Ok(Self::Ping),
            PacketType::Drop => Ok(Self::Drop {
                slot: decode_slot(payload)?,
            }),
            PacketType::ClientAttempt => {
                if payload.len() < 2 {
                    return Err(FrameError::Malformed("attempt payload truncated"));
                }
                let name_len = u16::from_le_bytes([payload[0], payload[1]]) as usize;
                if name_len > MAX_NAME_LEN {
                    return Err(FrameError::Malformed("attempt name too long"));
                }
                if payload.len() < 2 + name_len {
                    return Err(FrameError::Malformed("attempt name truncated"));
                }
                let name = std::str::from_utf8(&payload[2..2 + name_len])
                    .map_err(|_| FrameError::Malformed("attempt name not utf-8"))?;
                Ok(Self::ClientAttempt {
                    name: name.to_owned(),
                })
            }
            PacketType::ClientAccept => Ok(Self::ClientAccept {
                slot: decode_slot(payload)?,
            }),
            PacketType::ClientDenied => {
                let byte = payload
                    .first()
                    .ok_or(FrameError::Malformed("denied payload empty"))?;
                let reason = DenyReason::from_byte(*byte)
                    .ok_or(FrameError::Malformed("unknown deny reason"))?;
                Ok(Self::ClientDenied { reason })
            }
        }
    }
}

fn decode_slot(payload: &[u8]) -> Result<i32, FrameError> {
    if payload.len() < 4 {
        return Err(FrameError::Malformed("slot payload truncated"));
    }
    Ok(i32::from_le_bytes([
        payload[0], payload[1], payload[2], payload[3],
    ]))
}

/// A wire packet: header plus exactly `header.payload_len` payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// The fixed header.
    pub header: PacketHeader,
    /// The opaque payload bytes.
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a packet from a body and the sender's slot.
    pub fn from_body(body: &PacketBody, sender_slot: i32) -> Self {
        let payload = body.encode();
        Self {
            header: PacketHeader::new(body.packet_type(), payload.len() as u32, sender_slot),
            payload,
        }
    }

    /// Decode the body according to the header's type tag.
    pub fn body(&self) -> Result<PacketBody, FrameError> {
        PacketBody::decode(self.header.packet_type, &self.payload)
    }
}

/// Errors raised while encoding or decoding packets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not enough bytes for a header.
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size available.
        actual: usize,
    },

    /// Peer speaks a different protocol version.
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    WrongVersion {
        /// Our version.
        expected: u8,
        /// The peer's version.
        actual: u8,
    },

    /// Declared payload size exceeds the protocol maximum.
    #[error("declared payload of {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Declared size.
        size: usize,
        /// Protocol maximum.
        max: usize,
    },

    /// Reserved packet-type byte; logged and discarded, never fatal.
    #[error("unknown packet type: 0x{0:02x}")]
    UnknownType(u8),

    /// Declared payload length disagrees with the bytes at hand.
    #[error("payload length mismatch: header declares {declared}, have {actual}")]
    LengthMismatch {
        /// Length from the header.
        declared: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// Control payload does not parse.
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
}
