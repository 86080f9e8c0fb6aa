//! Lifecycle callback table.
//!
//! Game modules hook into the transport through a fixed, closed set of
//! hooks. Each hook holds at most one registrant; registering again
//! replaces the previous one (last registration wins), and hooks can be
//! removed individually. The variants are typed per hook, so a mismatched
//! call signature is a compile error rather than a crash at call time.

use std::fmt;

/// Identifiers for the fixed hook set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackHook {
    /// An authorized session ended; save and return to the menu.
    Exit,
    /// Per-tick game logic on the server, after network bookkeeping.
    ServerFrame,
    /// Per-tick game logic on the client, after network bookkeeping.
    ClientFrame,
    /// Server builds the payload of an outbound game packet for a slot.
    SerializeToClient,
    /// Server consumes the payload of an inbound game packet from a slot.
    DeserializeFromClient,
    /// Client builds the payload of an outbound game packet.
    SerializeToServer,
    /// Client consumes the payload of an inbound game packet.
    DeserializeFromServer,
}

impl CallbackHook {
    /// Number of hooks in the set.
    pub const COUNT: usize = 7;

    fn index(self) -> usize {
        match self {
            Self::Exit => 0,
            Self::ServerFrame => 1,
            Self::ClientFrame => 2,
            Self::SerializeToClient => 3,
            Self::DeserializeFromClient => 4,
            Self::SerializeToServer => 5,
            Self::DeserializeFromServer => 6,
        }
    }
}

/// A registered callback, typed per hook.
///
/// Serialize hooks receive the game packet kind (a byte at or above
/// `GAME_PACKET_BASE`) and return the payload to send; deserialize hooks
/// receive the kind and payload of a game packet that arrived.
pub enum NetCallback {
    /// See [`CallbackHook::Exit`].
    Exit(Box<dyn FnMut()>),
    /// See [`CallbackHook::ServerFrame`].
    ServerFrame(Box<dyn FnMut()>),
    /// See [`CallbackHook::ClientFrame`].
    ClientFrame(Box<dyn FnMut()>),
    /// See [`CallbackHook::SerializeToClient`]. Arguments: slot, kind.
    SerializeToClient(Box<dyn FnMut(i32, u8) -> Vec<u8>>),
    /// See [`CallbackHook::DeserializeFromClient`]. Arguments: slot, kind, payload.
    DeserializeFromClient(Box<dyn FnMut(i32, u8, &[u8])>),
    /// See [`CallbackHook::SerializeToServer`]. Argument: kind.
    SerializeToServer(Box<dyn FnMut(u8) -> Vec<u8>>),
    /// See [`CallbackHook::DeserializeFromServer`]. Arguments: kind, payload.
    DeserializeFromServer(Box<dyn FnMut(u8, &[u8])>),
}

impl NetCallback {
    /// The hook this callback registers for.
    pub fn hook(&self) -> CallbackHook {
        match self {
            Self::Exit(_) => CallbackHook::Exit,
            Self::ServerFrame(_) => CallbackHook::ServerFrame,
            Self::ClientFrame(_) => CallbackHook::ClientFrame,
            Self::SerializeToClient(_) => CallbackHook::SerializeToClient,
            Self::DeserializeFromClient(_) => CallbackHook::DeserializeFromClient,
            Self::SerializeToServer(_) => CallbackHook::SerializeToServer,
            Self::DeserializeFromServer(_) => CallbackHook::DeserializeFromServer,
        }
    }
}

impl fmt::Debug for NetCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetCallback::{:?}", self.hook())
    }
}

/// The callback table: one optional registrant per hook.
#[derive(Default)]
pub struct CallbackTable {
    slots: [Option<NetCallback>; CallbackHook::COUNT],
}

impl CallbackTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Replaces any previous registrant for the same
    /// hook; there is no multi-subscriber fan-out.
    pub fn add(&mut self, callback: NetCallback) {
        let index = callback.hook().index();
        self.slots[index] = Some(callback);
    }

    /// Remove the registrant for a hook. Returns `true` if one was present.
    pub fn remove(&mut self, hook: CallbackHook) -> bool {
        self.slots[hook.index()].take().is_some()
    }

    /// Whether a hook currently has a registrant.
    pub fn is_registered(&self, hook: CallbackHook) -> bool {
        self.slots[hook.index()].is_some()
    }

    pub(crate) fn fire_exit(&mut self) {
        if let Some(NetCallback::Exit(f)) = &mut self.slots[CallbackHook::Exit.index()] {
            f();
        }
    }

    pub(crate) fn fire_server_frame(&mut self) {
        if let Some(NetCallback::ServerFrame(f)) = &mut self.slots[CallbackHook::ServerFrame.index()]
        {
            f();
        }
    }

    pub(crate) fn fire_client_frame(&mut self) {
        if let Some(NetCallback::ClientFrame(f)) = &mut self.slots[CallbackHook::ClientFrame.index()]
        {
            f();
        }
    }

    pub(crate) fn serialize_to_client(&mut self, slot: i32, kind: u8) -> Option<Vec<u8>> {
        match &mut self.slots[CallbackHook::SerializeToClient.index()] {
            Some(NetCallback::SerializeToClient(f)) => Some(f(slot, kind)),
            _ => None,
        }
    }

    /// Returns `true` if a registrant consumed the packet.
    pub(crate) fn deserialize_from_client(&mut self, slot: i32, kind: u8, payload: &[u8]) -> bool {
        match &mut self.slots[CallbackHook::DeserializeFromClient.index()] {
            Some(NetCallback::DeserializeFromClient(f)) => {
                f(slot, kind, payload);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn serialize_to_server(&mut self, kind: u8) -> Option<Vec<u8>> {
        match &mut self.slots[CallbackHook::SerializeToServer.index()] {
            Some(NetCallback::SerializeToServer(f)) => Some(f(kind)),
            _ => None,
        }
    }

    /// Returns `true` if a registrant consumed the packet.
    pub(crate) fn deserialize_from_server(&mut self, kind: u8, payload: &[u8]) -> bool {
        match &mut self.slots[CallbackHook::DeserializeFromServer.index()] {
            Some(NetCallback::DeserializeFromServer(f)) => {
                f(kind, payload);
                true
            }
            _ => false,
        }
    }
}

impl fmt::Debug for CallbackTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<CallbackHook> = self
            .slots
            .iter()
            .flatten()
            .map(NetCallback::hook)
            .collect();
        f.debug_struct("CallbackTable")
            .field("registered", &registered)
            .finish()
    }
}
