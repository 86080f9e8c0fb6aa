//! Server frame driver.
//!
//! The server owns the listener, the slot registry, and an outbound queue,
//! and makes progress only inside [`Server::frame`]. Each frame runs the
//! same fixed sequence: accept, read, evict, keepalive, flush, then the
//! frame callback. Nothing blocks and nothing runs between frames, so a
//! host can drive this from its main loop at whatever cadence it likes.

use std::collections::VecDeque;
use std::net::SocketAddr;

use tracing::{debug, info, trace, warn};

use super::registry::ConnectionRegistry;
use crate::core::constants::{keepalive_interval, GAME_PACKET_BASE, HOST_SLOT, MAX_PAYLOAD_SIZE};
use crate::core::{CallbackTable, NetConfig, NetError, NetResult};
use crate::protocol::{self, Netmode, Netstate};
use crate::transport::{FrameError, Listener, Packet, PacketBody, PacketType};

/// Where a queued packet is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTarget {
    /// Every authorized client.
    Broadcast,
    /// Every authorized client except this slot.
    BroadcastExcept(i32),
    /// One slot only.
    Client(i32),
}

/// One outbound queue entry. A literal body is sent as queued; a hook
/// entry has its payload built by the registered serialize callback at
/// send time, once per target slot.
#[derive(Debug)]
enum QueuedBody {
    Literal(PacketBody),
    Hook { kind: u8 },
}

#[derive(Debug)]
struct QueuedPacket {
    body: QueuedBody,
    target: SendTarget,
}

/// The listening side of a session.
pub struct Server {
    config: NetConfig,
    /// Present while listening; taken at shutdown so the port is released.
    listener: Option<Listener>,
    registry: ConnectionRegistry,
    outbound: VecDeque<QueuedPacket>,
    callbacks: CallbackTable,
    netmode: Netmode,
    netstate: Netstate,
    /// Slots whose connection failed mid-frame; evicted before the flush.
    dead: Vec<i32>,
    /// Slots vacated since the last drain, for the host to act on.
    dropped: Vec<i32>,
    /// Handshakes completed since the last drain.
    joined: Vec<(i32, String)>,
}

impl Server {
    /// Bind the listener and start accepting. The server comes up in
    /// `Listen` state with the admission policy taken from `config`.
    pub fn start(config: NetConfig) -> NetResult<Self> {
        let listener = Listener::start(config.port, config.backlog, config.ipv6)?;
        info!(
            addr = %listener.local_addr()?,
            max_clients = config.max_clients,
            netmode = ?config.netmode,
            "server listening"
        );
        Ok(Self {
            registry: ConnectionRegistry::new(config.max_clients),
            listener: Some(listener),
            netmode: config.netmode,
            netstate: Netstate::Listen,
            outbound: VecDeque::new(),
            callbacks: CallbackTable::new(),
            dead: Vec::new(),
            dropped: Vec::new(),
            joined: Vec::new(),
            config,
        })
    }

    /// The address the listener is bound to. Useful when the configured
    /// port was 0 and the OS picked one.
    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        match &self.listener {
            Some(listener) => listener.local_addr(),
            None => Err(NetError::NotConnected),
        }
    }

    /// Current admission policy.
    pub fn netmode(&self) -> Netmode {
        self.netmode
    }

    /// Change the admission policy. Switching to `Red` terminates every
    /// existing connection; `Yellow` keeps them but refuses new ones.
    pub fn set_netmode(&mut self, netmode: Netmode) {
        if self.netmode == netmode {
            return;
        }
        info!(from = ?self.netmode, to = ?netmode, "netmode change");
        self.netmode = netmode;
        if netmode == Netmode::Red {
            for slot in self.registry.occupied_slots() {
                self.drop_client(slot);
            }
        }
    }

    /// Current connection state.
    pub fn netstate(&self) -> Netstate {
        self.netstate
    }

    /// Count of occupied slots, handshakes in flight included.
    pub fn num_connected(&self) -> usize {
        self.registry.num_connected()
    }

    /// The callback table, for registering and removing hooks.
    pub fn callbacks(&mut self) -> &mut CallbackTable {
        &mut self.callbacks
    }

    /// Queue a packet for the next flush. Queued packets leave in queue
    /// order, each exactly once.
    ///
    /// Bodies over the wire limits are refused here, so the mistake stays
    /// local instead of tearing down the receiving peer's connection.
    pub fn queue_packet(&mut self, body: PacketBody, target: SendTarget) -> NetResult<()> {
        body.validate()?;
        self.outbound.push_back(QueuedPacket {
            body: QueuedBody::Literal(body),
            target,
        });
        Ok(())
    }

    /// Queue a game packet whose payload the `SerializeToClient` hook
    /// builds at send time, once per target slot.
    pub fn queue_hook_packet(&mut self, kind: u8, target: SendTarget) -> NetResult<()> {
        if kind < GAME_PACKET_BASE {
            return Err(FrameError::Malformed("game packet kind in reserved range").into());
        }
        self.outbound.push_back(QueuedPacket {
            body: QueuedBody::Hook { kind },
            target,
        });
        Ok(())
    }

    /// Vacate a slot: close its connection, record the drop, and (when the
    /// client was authorized) broadcast the vacancy to everyone else.
    /// Dropping an absent slot is a no-op.
    pub fn drop_client(&mut self, slot: i32) {
        let Some(mut entry) = self.registry.remove(slot) else {
            return;
        };
        entry.socket.disconnect();
        debug!(slot, authorized = entry.authorized, "client dropped");
        self.dropped.push(slot);
        if entry.authorized {
            self.outbound.push_back(QueuedPacket {
                body: QueuedBody::Literal(PacketBody::Drop { slot }),
                target: SendTarget::Broadcast,
            });
        }
    }

    /// Slots vacated since the last call, in drop order.
    pub fn drain_dropped(&mut self) -> Vec<i32> {
        std::mem::take(&mut self.dropped)
    }

    /// Handshakes completed since the last call: `(slot, name)` pairs.
    pub fn drain_joined(&mut self) -> Vec<(i32, String)> {
        std::mem::take(&mut self.joined)
    }

    /// Tear the server down: close every connection without broadcasting,
    /// discard queued packets, and fire the exit hook.
    pub fn shutdown(&mut self) {
        self.listener = None;
        for (slot, mut entry) in self.registry.drain() {
            entry.socket.disconnect();
            trace!(slot, "connection closed at shutdown");
        }
        self.outbound.clear();
        self.callbacks.fire_exit();
        self.netstate = Netstate::NoConnect;
        info!("server shut down");
    }

    /// Run one frame: accept new connections, read and dispatch every
    /// pending inbound packet, evict dead and timed-out clients, queue
    /// keepalives, flush the outbound queue, then fire the frame hook.
    pub fn frame(&mut self) -> NetResult<()> {
        if self.netstate == Netstate::NoConnect {
            return Ok(());
        }
        self.accept_new_connections();
        self.read_client_packets();
        self.evict_stale_clients();
        self.queue_keepalives();
        self.flush_outbound();
        self.callbacks.fire_server_frame();
        Ok(())
    }

    /// Accept everything pending this frame. A peer that connects and
    /// immediately resets makes the accept or socket setup fail; that is
    /// the peer's problem, not ours, so the error is logged and the rest
    /// of the frame proceeds untouched.
    fn accept_new_connections(&mut self) {
        let Some(listener) = &self.listener else {
            return;
        };
        loop {
            let mut socket = match listener.check_pending() {
                Ok(Some(socket)) => socket,
                Ok(None) => return,
                Err(error) => {
                    warn!(%error, "accept failed, discarding connection");
                    return;
                }
            };
            let peer = socket.peer_addr();
            match protocol::server::admission_decision(self.netmode, self.registry.lowest_free_slot())
            {
                Ok(slot) => {
                    debug!(%peer, slot, "connection admitted, awaiting handshake");
                    self.registry.insert_pending(slot, socket);
                }
                Err(reason) => {
                    info!(%peer, %reason, "connection refused");
                    let denial = protocol::server::client_denied_serialize(reason);
                    if let Err(error) = socket.send_packet(&denial) {
                        warn!(%peer, %error, "failed to deliver refusal");
                    }
                    socket.disconnect();
                }
            }
        }
    }

    fn read_client_packets(&mut self) {
        for slot in self.registry.occupied_slots() {
            loop {
                let Some(entry) = self.registry.get_mut(slot) else {
                    break;
                };
                if !entry.socket.select() {
                    break;
                }
                match entry.socket.read_packet() {
                    Ok(packet) => self.dispatch_packet(slot, packet),
                    Err(error) => {
                        warn!(slot, %error, "read failed, marking connection dead");
                        self.dead.push(slot);
                        break;
                    }
                }
            }
        }
    }

    /// Route one inbound packet. Protocol violations are logged and the
    /// packet discarded; they never terminate the connection.
    fn dispatch_packet(&mut self, slot: i32, packet: Packet) {
        match PacketType::from_byte(packet.header.packet_type) {
            Some(PacketType::Ping) => protocol::server::ping_deserialize(slot),
            Some(PacketType::ClientAttempt) => self.handle_client_attempt(slot, &packet),
            Some(other) if !protocol::receivable(other, protocol::Role::Server) => {
                warn!(slot, packet_type = ?other, "packet not legal in this direction, discarding");
            }
            Some(other) => {
                warn!(slot, packet_type = ?other, "unexpected packet, discarding");
            }
            None => match packet.body() {
                Ok(PacketBody::Game { kind, data }) => {
                    if !self.callbacks.deserialize_from_client(slot, kind, &data) {
                        warn!(slot, kind, "game packet with no deserialize hook, discarding");
                    }
                }
                Ok(body) => {
                    warn!(slot, ?body, "unroutable packet, discarding");
                }
                Err(error) => {
                    warn!(slot, %error, "undecodable packet, discarding");
                }
            },
        }
    }

    fn handle_client_attempt(&mut self, slot: i32, packet: &Packet) {
        let name = match protocol::server::client_attempt_deserialize(packet) {
            Ok(name) => name,
            Err(error) => {
                warn!(slot, %error, "malformed handshake request, discarding");
                return;
            }
        };
        let Some(entry) = self.registry.get_mut(slot) else {
            return;
        };
        if entry.authorized {
            warn!(slot, "handshake request from authorized client, discarding");
            return;
        }
        self.registry.authorize(slot);
        info!(slot, name, "client authorized");
        self.joined.push((slot, name));
        self.outbound.push_back(QueuedPacket {
            body: QueuedBody::Literal(PacketBody::ClientAccept { slot }),
            target: SendTarget::Client(slot),
        });
    }

    /// Evict connections that failed mid-frame or fell silent past the
    /// configured timeout. Runs before the flush so a drop broadcast
    /// queued here still leaves this frame.
    fn evict_stale_clients(&mut self) {
        let mut stale = std::mem::take(&mut self.dead);
        for slot in self.registry.occupied_slots() {
            let Some(entry) = self.registry.get_mut(slot) else {
                continue;
            };
            if entry.socket.idle_for() > self.config.timeout {
                warn!(slot, timeout = ?self.config.timeout, "client timed out");
                stale.push(slot);
            }
        }
        for slot in stale {
            self.drop_client(slot);
        }
    }

    fn queue_keepalives(&mut self) {
        let interval = keepalive_interval(self.config.timeout);
        for slot in self.registry.authorized_slots() {
            let Some(entry) = self.registry.get_mut(slot) else {
                continue;
            };
            if entry.socket.quiet_for() > interval {
                self.outbound.push_back(QueuedPacket {
                    body: QueuedBody::Literal(PacketBody::Ping),
                    target: SendTarget::Client(slot),
                });
            }
        }
    }

    fn flush_outbound(&mut self) {
        let queued: Vec<QueuedPacket> = self.outbound.drain(..).collect();
        for packet in queued {
            let slots = match packet.target {
                SendTarget::Broadcast => self.registry.authorized_slots(),
                SendTarget::BroadcastExcept(except) => self
                    .registry
                    .authorized_slots()
                    .into_iter()
                    .filter(|slot| *slot != except)
                    .collect(),
                SendTarget::Client(slot) => vec![slot],
            };
            for slot in slots {
                self.send_to_slot(slot, &packet.body);
            }
        }
        for slot in std::mem::take(&mut self.dead) {
            self.drop_client(slot);
        }
    }

    fn send_to_slot(&mut self, slot: i32, body: &QueuedBody) {
        let wire = match body {
            QueuedBody::Literal(PacketBody::Ping) => protocol::server::ping_serialize(),
            QueuedBody::Literal(PacketBody::Drop { slot }) => protocol::server::drop_serialize(*slot),
            QueuedBody::Literal(PacketBody::ClientAccept { slot }) => {
                protocol::server::client_accept_serialize(*slot)
            }
            QueuedBody::Literal(PacketBody::ClientDenied { reason }) => {
                protocol::server::client_denied_serialize(*reason)
            }
            QueuedBody::Literal(body) => Packet::from_body(body, HOST_SLOT),
            QueuedBody::Hook { kind } => {
                let Some(data) = self.callbacks.serialize_to_client(slot, *kind) else {
                    warn!(slot, kind, "game packet with no serialize hook, discarding");
                    return;
                };
                if data.len() > MAX_PAYLOAD_SIZE {
                    warn!(slot, kind, len = data.len(), "serialize hook overran the payload limit, discarding");
                    return;
                }
                Packet::from_body(&PacketBody::Game { kind: *kind, data }, HOST_SLOT)
            }
        };
        let Some(entry) = self.registry.get_mut(slot) else {
            trace!(slot, "send target vacated before flush, skipping");
            return;
        };
        if let Err(error) = entry.socket.send_packet(&wire) {
            warn!(slot, %error, "send failed, marking connection dead");
            self.dead.push(slot);
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.netstate != Netstate::NoConnect {
            self.shutdown();
        }
    }
}
