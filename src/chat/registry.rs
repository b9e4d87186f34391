/// Bounded session registry — the one piece of state shared by every
/// session worker.
///
/// Storage is a fixed-capacity arena: a `Vec` whose length is the live
/// session count. Removal swap-removes, filling the freed slot with the
/// last occupied one so occupied slots stay compact in `[0, len)`. Slot
/// indices are therefore unstable across removals and never leave this
/// module; callers address sessions by [`ConnId`] or nickname.
///
/// The registry has no interior locking. The server wraps it in a single
/// mutex (the registry lock) and every mutation — including the delivery
/// traversals below, which evict dead peers mid-scan — runs with that
/// lock held for the whole traversal.
use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;

/// Opaque connection identity, unique while the session is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One connected client.
///
/// `tx` is the delivery handle to the session's worker task; a failed
/// send means the worker is gone and the peer is treated as dead.
/// Dropping a `Session` drops `tx`, which ends the worker's receive
/// loop and with it the underlying connection.
#[derive(Debug)]
pub struct Session {
    id: ConnId,
    nickname: String,
    tx: mpsc::UnboundedSender<String>,
}

/// Fixed-capacity collection of live sessions.
#[derive(Debug)]
pub struct Registry {
    slots: Vec<Session>,
    capacity: usize,
    next_id: u64,
}

impl Registry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            next_id: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Occupy the next free slot, or `None` when the server is full.
    /// The nickname starts empty; it is set by the handshake.
    pub fn add(&mut self, tx: mpsc::UnboundedSender<String>) -> Option<ConnId> {
        if self.slots.len() == self.capacity {
            return None;
        }
        let id = ConnId(self.next_id);
        self.next_id += 1;
        self.slots.push(Session {
            id,
            nickname: String::new(),
            tx,
        });
        Some(id)
    }

    /// Remove a session, compacting the arena. No-op (returns `false`)
    /// if the id is not present — a worker whose session was already
    /// evicted mid-delivery lands here.
    pub fn remove(&mut self, id: ConnId) -> bool {
        match self.position(id) {
            Some(idx) => {
                self.slots.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// Set the nickname of the matching session. No uniqueness check:
    /// duplicate nicknames are allowed, and direct delivery goes to the
    /// first match in scan order.
    pub fn set_nickname(&mut self, id: ConnId, nickname: &str) {
        if let Some(idx) = self.position(id) {
            self.slots[idx].nickname = nickname.to_owned();
        }
    }

    fn position(&self, id: ConnId) -> Option<usize> {
        self.slots.iter().position(|s| s.id == id)
    }

    /// Consistent view of the occupied slots for debug display.
    pub fn snapshot(&self) -> Vec<(ConnId, String)> {
        self.slots
            .iter()
            .map(|s| (s.id, s.nickname.clone()))
            .collect()
    }

    /// Deliver a line to every occupied slot, sender included.
    ///
    /// A failed send evicts that slot in place. The eviction is the same
    /// swap-remove compaction as [`remove`](Self::remove), done inline so
    /// the scan does not skip the slot that moved into the current
    /// position. Returns the number of successful deliveries.
    pub fn fan_out(&mut self, line: &str) -> usize {
        let mut delivered = 0;
        let mut idx = 0;
        while idx < self.slots.len() {
            if self.slots[idx].tx.send(line.to_owned()).is_ok() {
                delivered += 1;
                idx += 1;
            } else {
                let dead = self.slots.swap_remove(idx);
                debug!(id = %dead.id, nickname = %dead.nickname, "evicted dead session during broadcast");
            }
        }
        delivered
    }

    /// Deliver a line to the first session whose nickname matches.
    ///
    /// Returns whether a match existed at all — even when the matched
    /// peer turned out to be dead and was evicted, in which case the
    /// message is dropped rather than spooled (the recipient was not
    /// offline, its connection was broken).
    pub fn deliver_to(&mut self, recipient: &str, line: &str) -> bool {
        match self.slots.iter().position(|s| s.nickname == recipient) {
            Some(idx) => {
                if self.slots[idx].tx.send(line.to_owned()).is_err() {
                    let dead = self.slots.swap_remove(idx);
                    debug!(id = %dead.id, nickname = %dead.nickname, "evicted dead session during direct delivery");
                }
                true
            }
            None => false,
        }
    }

    /// Drop every remaining session, closing their connections. Used by
    /// the supervisor after all workers have finished.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
