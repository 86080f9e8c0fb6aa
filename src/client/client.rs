//! Client frame driver.
//!
//! A client owns at most one connection and the small handshake state
//! machine around it: `NoConnect` until [`Client::connect`], `NeedAuth`
//! while the attempt is in flight, `Authorized` once the server grants a
//! slot. Like the server, all progress happens inside [`Client::frame`].

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::core::constants::{
    keepalive_interval, GAME_PACKET_BASE, MAX_PAYLOAD_SIZE, UNASSIGNED_SLOT,
};
use crate::core::{CallbackTable, NetConfig, NetResult};
use crate::protocol::{self, Netstate};
use crate::transport::{DenyReason, FrameError, Packet, PacketBody, PacketType, Socket};

/// One outbound queue entry. A literal body is sent as queued; a hook
/// entry has its payload built by the `SerializeToServer` callback at
/// send time.
#[derive(Debug)]
enum QueuedBody {
    Literal(PacketBody),
    Hook { kind: u8 },
}

/// The connecting side of a session.
pub struct Client {
    config: NetConfig,
    name: String,
    socket: Option<Socket>,
    netstate: Netstate,
    my_slot: Option<i32>,
    outbound: VecDeque<QueuedBody>,
    callbacks: CallbackTable,
    /// The reason carried by the most recent refusal, if any.
    last_deny: Option<DenyReason>,
    /// Slots other clients vacated since the last drain.
    remote_drops: Vec<i32>,
}

impl Client {
    /// Create an unconnected client that will identify as `name`.
    pub fn new(config: NetConfig, name: impl Into<String>) -> Self {
        Self {
            config,
            name: name.into(),
            socket: None,
            netstate: Netstate::NoConnect,
            my_slot: None,
            outbound: VecDeque::new(),
            callbacks: CallbackTable::new(),
            last_deny: None,
            remote_drops: Vec::new(),
        }
    }

    /// Connect to a server and queue the handshake request. Any existing
    /// connection is closed first.
    ///
    /// An identity the server would refuse to parse (over the name limit)
    /// fails here, before anything touches the network.
    pub fn connect(&mut self, hostname: &str) -> NetResult<()> {
        let attempt = PacketBody::ClientAttempt {
            name: self.name.clone(),
        };
        attempt.validate()?;

        self.disconnect();
        let socket = Socket::connect(hostname, self.config.port, self.config.ipv6)?;
        info!(peer = %socket.peer_addr(), name = self.name, "connected, requesting slot");
        self.socket = Some(socket);
        self.netstate = Netstate::NeedAuth;
        self.last_deny = None;
        self.outbound.push_back(QueuedBody::Literal(attempt));
        Ok(())
    }

    /// Current connection state.
    pub fn netstate(&self) -> Netstate {
        self.netstate
    }

    /// The slot the server granted, once authorized.
    pub fn my_slot(&self) -> Option<i32> {
        self.my_slot
    }

    /// Whether the handshake has completed.
    pub fn is_authorized(&self) -> bool {
        self.netstate == Netstate::Authorized
    }

    /// Why the most recent join attempt was refused, if it was.
    pub fn last_deny_reason(&self) -> Option<DenyReason> {
        self.last_deny
    }

    /// Slots other clients vacated since the last call.
    pub fn drain_dropped(&mut self) -> Vec<i32> {
        std::mem::take(&mut self.remote_drops)
    }

    /// The callback table, for registering and removing hooks.
    pub fn callbacks(&mut self) -> &mut CallbackTable {
        &mut self.callbacks
    }

    /// Queue a packet for the next flush.
    ///
    /// Bodies over the wire limits are refused here, so the mistake stays
    /// local instead of the server dropping this connection.
    pub fn queue_packet(&mut self, body: PacketBody) -> NetResult<()> {
        body.validate()?;
        self.outbound.push_back(QueuedBody::Literal(body));
        Ok(())
    }

    /// Queue a game packet whose payload the `SerializeToServer` hook
    /// builds at send time.
    pub fn queue_hook_packet(&mut self, kind: u8) -> NetResult<()> {
        if kind < GAME_PACKET_BASE {
            return Err(FrameError::Malformed("game packet kind in reserved range").into());
        }
        self.outbound.push_back(QueuedBody::Hook { kind });
        Ok(())
    }

    /// Close the connection, if any. Fires the exit hook when an
    /// authorized session ends. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            socket.disconnect();
            debug!("disconnected");
        }
        if self.netstate == Netstate::Authorized {
            self.callbacks.fire_exit();
        }
        self.netstate = Netstate::NoConnect;
        self.my_slot = None;
        self.outbound.clear();
    }

    /// Run one frame: read and dispatch every pending inbound packet,
    /// check the server's liveness, queue a keepalive if we have been
    /// quiet, flush the outbound queue, then fire the frame hook.
    pub fn frame(&mut self) -> NetResult<()> {
        if self.socket.is_some() {
            self.read_server_packets();
            self.check_server_liveness();
            self.queue_keepalive();
            self.flush_outbound();
        }
        self.callbacks.fire_client_frame();
        Ok(())
    }

    fn read_server_packets(&mut self) {
        loop {
            let Some(socket) = self.socket.as_mut() else {
                return;
            };
            if !socket.select() {
                return;
            }
            match socket.read_packet() {
                Ok(packet) => self.dispatch_packet(packet),
                Err(error) => {
                    warn!(%error, "read failed, closing connection");
                    self.disconnect();
                    return;
                }
            }
        }
    }

    /// Route one inbound packet. As on the server, protocol violations
    /// are logged and discarded without terminating the connection.
    fn dispatch_packet(&mut self, packet: Packet) {
        match PacketType::from_byte(packet.header.packet_type) {
            Some(PacketType::Ping) => protocol::client::ping_deserialize(),
            Some(PacketType::ClientAccept) => {
                match protocol::client::client_accept_deserialize(&packet, self.netstate) {
                    Ok(Some(slot)) => {
                        info!(slot, "slot granted, session authorized");
                        self.my_slot = Some(slot);
                        self.netstate = Netstate::Authorized;
                    }
                    Ok(None) => {} // stale grant, already logged
                    Err(error) => warn!(%error, "malformed grant, discarding"),
                }
            }
            Some(PacketType::ClientDenied) => {
                match protocol::client::client_denied_deserialize(&packet) {
                    Ok(reason) => {
                        info!(%reason, "join refused");
                        self.last_deny = Some(reason);
                        self.disconnect();
                    }
                    Err(error) => warn!(%error, "malformed refusal, discarding"),
                }
            }
            Some(PacketType::Drop) => match protocol::client::drop_deserialize(&packet) {
                Ok(slot) if Some(slot) == self.my_slot => {
                    info!(slot, "dropped by server");
                    self.disconnect();
                }
                Ok(slot) => {
                    debug!(slot, "remote client left");
                    self.remote_drops.push(slot);
                }
                Err(error) => warn!(%error, "malformed drop, discarding"),
            },
            Some(other) => {
                warn!(packet_type = ?other, "packet not legal in this direction, discarding");
            }
            None => match packet.body() {
                Ok(PacketBody::Game { kind, data }) => {
                    if !self.callbacks.deserialize_from_server(kind, &data) {
                        warn!(kind, "game packet with no deserialize hook, discarding");
                    }
                }
                Ok(body) => {
                    warn!(?body, "unroutable packet, discarding");
                }
                Err(error) => {
                    warn!(%error, "undecodable packet, discarding");
                }
            },
        }
    }

    fn check_server_liveness(&mut self) {
        let timed_out = self
            .socket
            .as_ref()
            .is_some_and(|socket| socket.idle_for() > self.config.timeout);
        if timed_out {
            warn!(timeout = ?self.config.timeout, "server went silent, closing connection");
            self.disconnect();
        }
    }

    fn queue_keepalive(&mut self) {
        let Some(socket) = self.socket.as_ref() else {
            return;
        };
        if socket.quiet_for() > keepalive_interval(self.config.timeout) {
            self.outbound.push_back(QueuedBody::Literal(PacketBody::Ping));
        }
    }

    fn flush_outbound(&mut self) {
        let queued: Vec<QueuedBody> = self.outbound.drain(..).collect();
        for body in queued {
            if self.socket.is_none() {
                return;
            }
            let wire = match &body {
                QueuedBody::Literal(PacketBody::Ping) => {
                    protocol::client::ping_serialize(self.my_slot)
                }
                QueuedBody::Literal(PacketBody::ClientAttempt { name }) => {
                    protocol::client::client_attempt_serialize(name)
                }
                QueuedBody::Literal(body) => {
                    Packet::from_body(body, self.my_slot.unwrap_or(UNASSIGNED_SLOT))
                }
                QueuedBody::Hook { kind } => {
                    let Some(data) = self.callbacks.serialize_to_server(*kind) else {
                        warn!(kind, "game packet with no serialize hook, discarding");
                        continue;
                    };
                    if data.len() > MAX_PAYLOAD_SIZE {
                        warn!(kind, len = data.len(), "serialize hook overran the payload limit, discarding");
                        continue;
                    }
                    Packet::from_body(
                        &PacketBody::Game { kind: *kind, data },
                        self.my_slot.unwrap_or(UNASSIGNED_SLOT),
                    )
                }
            };
            let Some(socket) = self.socket.as_mut() else {
                return;
            };
            if let Err(error) = socket.send_packet(&wire) {
                warn!(%error, "send failed, closing connection");
                self.disconnect();
                return;
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}
