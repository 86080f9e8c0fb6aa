//! Connection registry: client slots, occupancy, and liveness.
//!
//! Slot 0 is reserved for the host and never allocated; remote clients
//! occupy slots `1..=max_clients`. An entry starts *pending* (accepted,
//! slot reserved, handshake incomplete) and becomes authorized once the
//! client's attempt is granted. The occupancy counters are derived from
//! the map on demand, so they can never drift out of sync with it.

use std::collections::BTreeMap;

use crate::transport::Socket;

/// One occupied client slot.
#[derive(Debug)]
pub struct ClientSlot {
    /// The connection to this client.
    pub socket: Socket,
    /// Whether the handshake has completed. Broadcasts go to authorized
    /// slots only.
    pub authorized: bool,
}

/// Ordered mapping from client slot to connection.
#[derive(Debug)]
pub struct ConnectionRegistry {
    slots: BTreeMap<i32, ClientSlot>,
    max_clients: usize,
}

impl ConnectionRegistry {
    /// Create a registry with room for `max_clients` remote clients.
    pub fn new(max_clients: usize) -> Self {
        Self {
            slots: BTreeMap::new(),
            max_clients,
        }
    }

    /// The lowest unoccupied slot at or above 1, or `None` when full.
    pub fn lowest_free_slot(&self) -> Option<i32> {
        (1..=self.max_clients as i32).find(|slot| !self.slots.contains_key(slot))
    }

    /// Reserve `slot` for a freshly accepted, not yet authorized peer.
    pub fn insert_pending(&mut self, slot: i32, socket: Socket) {
        debug_assert!(!self.slots.contains_key(&slot), "slot {slot} already occupied");
        self.slots.insert(
            slot,
            ClientSlot {
                socket,
                authorized: false,
            },
        );
    }

    /// Mark a pending slot as authorized. Returns `false` for a vacant slot.
    pub fn authorize(&mut self, slot: i32) -> bool {
        match self.slots.get_mut(&slot) {
            Some(entry) => {
                entry.authorized = true;
                true
            }
            None => false,
        }
    }

    /// Vacate a slot, yielding its connection. Vacating an absent slot
    /// returns `None`; callers treat that as a no-op.
    pub fn remove(&mut self, slot: i32) -> Option<ClientSlot> {
        self.slots.remove(&slot)
    }

    /// Access one slot's connection.
    pub fn get_mut(&mut self, slot: i32) -> Option<&mut ClientSlot> {
        self.slots.get_mut(&slot)
    }

    /// Count of occupied slots, pending included.
    pub fn num_connected(&self) -> usize {
        self.slots.len()
    }

    /// Whether every allocatable slot is occupied.
    pub fn is_full(&self) -> bool {
        self.lowest_free_slot().is_none()
    }

    /// Occupied slot numbers, in slot order.
    pub fn occupied_slots(&self) -> Vec<i32> {
        self.slots.keys().copied().collect()
    }

    /// Authorized slot numbers, in slot order.
    pub fn authorized_slots(&self) -> Vec<i32> {
        self.slots
            .iter()
            .filter(|(_, entry)| entry.authorized)
            .map(|(slot, _)| *slot)
            .collect()
    }

    /// Empty the registry, yielding every connection for teardown.
    pub fn drain(&mut self) -> Vec<(i32, ClientSlot)> {
        std::mem::take(&mut self.slots).into_iter().collect()
    }
}
