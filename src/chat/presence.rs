use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;

pub type ConnId = u64;

/// Which live connections are reachable under which user identity.
/// Constructed once at startup and handed to the gateway and the delivery
/// path; tests build a fresh one each. Membership is purely in-memory and
/// dies with the connection, so a reconnecting client must join again.
#[derive(Clone, Default)]
pub struct Presence {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    next_conn_id: ConnId,
    senders: HashMap<ConnId, UnboundedSender<String>>,
    rooms: HashMap<String, HashSet<ConnId>>,
    joined: HashMap<ConnId, HashSet<String>>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// New transport connection. The returned id identifies it until
    /// `leave`; outbound frames for it go through `tx`.
    pub fn register(&self, tx: UnboundedSender<String>) -> ConnId {
        let mut inner = self.inner.lock().unwrap();
        let conn_id = inner.next_conn_id;
        inner.next_conn_id += 1;
        inner.senders.insert(conn_id, tx);
        conn_id
    }

    /// Idempotent: joining the same pair twice changes nothing.
    pub fn join(&self, user_id: &str, conn_id: ConnId) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .rooms
            .entry(user_id.to_owned())
            .or_default()
            .insert(conn_id);
        inner
            .joined
            .entry(conn_id)
            .or_default()
            .insert(user_id.to_owned());
    }

    /// Removes the connection from every room it joined. Called once per
    /// connection on disconnect; a connection that never joined anything
    /// leaves without effect.
    pub fn leave(&self, conn_id: ConnId) {
        let mut inner = self.inner.lock().unwrap();
        inner.senders.remove(&conn_id);
        let Some(user_ids) = inner.joined.remove(&conn_id) else {
            return;
        };
        for user_id in user_ids {
            if let Some(room) = inner.rooms.get_mut(&user_id) {
                room.remove(&conn_id);
                if room.is_empty() {
                    inner.rooms.remove(&user_id);
                }
            }
        }
    }

    /// Empty set is the normal "user offline" case, not an error.
    pub fn members_of(&self, user_id: &str) -> HashSet<ConnId> {
        self.inner
            .lock()
            .unwrap()
            .rooms
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Best-effort fan-out of one serialized frame to every member of
    /// the room. A connection whose channel closed between lookup and
    /// send is skipped, not retried.
    pub fn emit(&self, user_id: &str, frame: &str) {
        let inner = self.inner.lock().unwrap();
        let Some(room) = inner.rooms.get(user_id) else {
            return;
        };
        for conn_id in room {
            if let Some(tx) = inner.senders.get(conn_id) {
                let _ = tx.send(frame.to_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn join_is_idempotent() {
        let presence = Presence::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = presence.register(tx);

        presence.join("u1", conn);
        presence.join("u1", conn);
        assert_eq!(presence.members_of("u1").len(), 1);

        presence.emit("u1", "frame");
        assert_eq!(rx.try_recv().unwrap(), "frame");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn double_join_single_leave_does_not_linger() {
        let presence = Presence::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = presence.register(tx);

        presence.join("u1", conn);
        presence.join("u1", conn);
        presence.leave(conn);
        assert!(presence.members_of("u1").is_empty());
    }

    #[test]
    fn leave_clears_every_joined_identity() {
        let presence = Presence::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = presence.register(tx);

        presence.join("u1", conn);
        presence.join("u2", conn);
        presence.leave(conn);
        assert!(presence.members_of("u1").is_empty());
        assert!(presence.members_of("u2").is_empty());
    }

    #[test]
    fn leave_of_unjoined_connection_is_a_no_op() {
        let presence = Presence::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = presence.register(tx);
        presence.leave(conn);
        presence.leave(conn + 1);
    }

    #[test]
    fn emit_to_empty_room_does_nothing() {
        let presence = Presence::new();
        presence.emit("offline", "frame");
        assert!(presence.members_of("offline").is_empty());
    }

    #[test]
    fn emit_skips_closed_channels() {
        let presence = Presence::new();
        let (tx_gone, rx_gone) = mpsc::unbounded_channel();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        let gone = presence.register(tx_gone);
        let live = presence.register(tx_live);
        presence.join("u1", gone);
        presence.join("u1", live);

        drop(rx_gone);
        presence.emit("u1", "frame");
        assert_eq!(rx_live.try_recv().unwrap(), "frame");
    }
}
