use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    events::{ReceiveMessage, ServerEvent},
    room_id::room_id,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Events a connection may have queued before it counts as stalled.
pub const OUTBOX_CAPACITY: usize = 64;

struct Connection {
    outbox: mpsc::Sender<ServerEvent>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct RelayState {
    rooms: HashMap<String, HashSet<ConnectionId>>,
    connections: HashMap<ConnectionId, Connection>,
}

/// In-memory fan-out of live messages to every connection joined to a room.
///
/// Cloning gives another handle to the same rooms. Nothing here awaits while
/// holding the lock; delivery is a `try_send` onto each connection's bounded
/// outbox, and a connection whose outbox is full is disconnected.
#[derive(Clone, Default)]
pub struct Relay {
    state: Arc<Mutex<RelayState>>,
    next_id: Arc<AtomicU64>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live connection. Events for it arrive on the returned receiver
    /// until [`Relay::disconnect`] is called.
    pub fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (outbox, rx) = mpsc::channel(OUTBOX_CAPACITY);

        self.lock().connections.insert(id, Connection { outbox, rooms: HashSet::new() });
        debug!(%id, "connected");
        (id, rx)
    }

    /// Adds `conn` to the room for `{a, b}`. Joining twice is a no-op; joining
    /// after disconnect is ignored.
    pub fn join(&self, conn: ConnectionId, a: Uuid, b: Uuid) {
        let room = room_id(a, b);
        let mut state = self.lock();

        let Some(connection) = state.connections.get_mut(&conn) else {
            return;
        };
        connection.rooms.insert(room.clone());
        state.rooms.entry(room).or_default().insert(conn);
        debug!(%conn, %a, %b, "joined room");
    }

    pub fn leave(&self, conn: ConnectionId, a: Uuid, b: Uuid) {
        let room = room_id(a, b);
        let mut state = self.lock();

        if let Some(connection) = state.connections.get_mut(&conn) {
            connection.rooms.remove(&room);
        }
        state.remove_member(&room, conn);
    }

    /// Publishes to every member of the pair's room, the sender's own
    /// connections included. Returns how many connections it reached; zero
    /// means nobody was listening, which is not an error.
    ///
    /// Members that stopped draining their outbox are dropped from the relay,
    /// which closes their receiver.
    pub fn send(&self, message: ReceiveMessage) -> usize {
        let room = room_id(message.sender_id, message.receiver_id);
        let mut state = self.lock();

        let Some(members) = state.rooms.get(&room) else {
            return 0;
        };

        let event = ServerEvent::ReceiveMessage(message);
        let mut delivered = 0;
        let mut stalled = Vec::new();
        for member in members {
            let Some(connection) = state.connections.get(member) else {
                continue;
            };
            match connection.outbox.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => stalled.push(*member),
                Err(TrySendError::Closed(_)) => {}
            }
        }

        for conn in stalled {
            warn!(%conn, "outbox full, dropping connection");
            state.remove_connection(conn);
        }
        delivered
    }

    /// Delivers to one connection only. Returns false if it is gone or its
    /// outbox is full.
    pub fn notify(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        self.lock()
            .connections
            .get(&conn)
            .is_some_and(|connection| connection.outbox.try_send(event).is_ok())
    }

    /// Drops `conn` from every room it joined. Idempotent.
    pub fn disconnect(&self, conn: ConnectionId) {
        self.lock().remove_connection(conn);
    }

    pub fn room_size(&self, a: Uuid, b: Uuid) -> usize {
        self.lock().rooms.get(&room_id(a, b)).map_or(0, HashSet::len)
    }

    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        // no mutation can leave the maps half updated, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RelayState {
    fn remove_connection(&mut self, conn: ConnectionId) {
        let Some(connection) = self.connections.remove(&conn) else {
            return;
        };
        for room in &connection.rooms {
            self.remove_member(room, conn);
        }
        debug!(%conn, rooms = connection.rooms.len(), "disconnected");
    }

    fn remove_member(&mut self, room: &str, conn: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&conn);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }
}
