//! In-process hub for real-time class rooms.
//!
//! Each room keeps its member presence and typing set behind the hub mutex
//! and owns a broadcast channel that every connected member subscribes to.
//! A user may be connected more than once (several tabs); presence is kept
//! until their last connection leaves. A room disappears when its last
//! member leaves.

use chrono::Utc;
use parking_lot::Mutex;
use shared::events::{Presence, RoomEvent};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::broadcast;

const ROOM_CHANNEL_CAPACITY: usize = 256;

struct Member {
    presence: Presence,
    /// Open connections of this user in the room
    connections: usize,
}

struct Room {
    members: BTreeMap<String, Member>,
    typing: BTreeSet<String>,
    tx: broadcast::Sender<RoomEvent>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        Self {
            members: BTreeMap::new(),
            typing: BTreeSet::new(),
            tx,
        }
    }

    fn state(&self, room_id: &str) -> RoomEvent {
        RoomEvent::RoomState {
            room_id: room_id.to_string(),
            members: self.members.values().map(|m| m.presence.clone()).collect(),
            typing: self.typing.iter().cloned().collect(),
        }
    }

    fn typing_event(&self, room_id: &str) -> RoomEvent {
        RoomEvent::Typing {
            room_id: room_id.to_string(),
            user_ids: self.typing.iter().cloned().collect(),
        }
    }

    fn send(&self, event: RoomEvent) {
        // no receivers just means nobody is listening right now
        let _ = self.tx.send(event);
    }
}

#[derive(Default)]
pub struct RoomHub {
    rooms: Mutex<HashMap<String, Room>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection for a member and subscribe it to the room.
    ///
    /// The first connection of a user announces `user-joined` to the others;
    /// later ones only refresh the presence. The caller gets the receiver
    /// plus a `room-state` snapshot that already includes itself.
    pub fn join(
        &self,
        room_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> (broadcast::Receiver<RoomEvent>, RoomEvent) {
        let mut rooms = self.rooms.lock();
        let room = rooms.entry(room_id.to_string()).or_insert_with(Room::new);
        let presence = Presence {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            status: "online".to_string(),
            last_seen: Utc::now(),
        };
        let member = room
            .members
            .entry(user_id.to_string())
            .or_insert_with(|| Member {
                presence: presence.clone(),
                connections: 0,
            });
        member.connections += 1;
        if member.connections == 1 {
            room.send(RoomEvent::UserJoined {
                room_id: room_id.to_string(),
                presence,
            });
        } else {
            member.presence = presence;
        }
        let rx = room.tx.subscribe();
        tracing::debug!("{} joined room {} ({} members)", user_id, room_id, room.members.len());
        (rx, room.state(room_id))
    }

    /// Drop one connection of a member. The member is removed, and others
    /// see `user-left`, only when it was their last connection. Returns
    /// false if they were not in the room.
    pub fn leave(&self, room_id: &str, user_id: &str) -> bool {
        let mut rooms = self.rooms.lock();
        let Some(room) = rooms.get_mut(room_id) else {
            return false;
        };
        let Some(member) = room.members.get_mut(user_id) else {
            return false;
        };
        member.connections = member.connections.saturating_sub(1);
        if member.connections > 0 {
            tracing::debug!("{} closed one of {} connections to {}", user_id, member.connections + 1, room_id);
            return true;
        }
        room.members.remove(user_id);
        let was_typing = room.typing.remove(user_id);
        room.send(RoomEvent::UserLeft {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        });
        if was_typing {
            room.send(room.typing_event(room_id));
        }
        if room.members.is_empty() {
            rooms.remove(room_id);
            tracing::debug!("room {} is empty, dropped", room_id);
        }
        true
    }

    /// Mark a member as typing or not. Broadcasts the full typing list when
    /// it changes.
    pub fn set_typing(&self, room_id: &str, user_id: &str, typing: bool) {
        let mut rooms = self.rooms.lock();
        let Some(room) = rooms.get_mut(room_id) else {
            return;
        };
        if !room.members.contains_key(user_id) {
            return;
        }
        let changed = if typing {
            room.typing.insert(user_id.to_string())
        } else {
            room.typing.remove(user_id)
        };
        if changed {
            room.send(room.typing_event(room_id));
        }
    }

    pub fn update_presence(&self, room_id: &str, user_id: &str, status: &str) -> Option<Presence> {
        let mut rooms = self.rooms.lock();
        let room = rooms.get_mut(room_id)?;
        let presence = &mut room.members.get_mut(user_id)?.presence;
        presence.status = status.to_string();
        presence.last_seen = Utc::now();
        let presence = presence.clone();
        room.send(RoomEvent::PresenceUpdate {
            room_id: room_id.to_string(),
            presence: presence.clone(),
        });
        Some(presence)
    }

    /// Broadcast to everyone in the room. Returns false if the room does not exist.
    pub fn publish(&self, room_id: &str, event: RoomEvent) -> bool {
        let rooms = self.rooms.lock();
        match rooms.get(room_id) {
            Some(room) => {
                room.send(event);
                true
            }
            None => false,
        }
    }

    pub fn is_member(&self, room_id: &str, user_id: &str) -> bool {
        self.rooms
            .lock()
            .get(room_id)
            .is_some_and(|r| r.members.contains_key(user_id))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::events::RoomMessage;

    #[test]
    fn join_returns_snapshot_and_notifies_others() {
        let hub = RoomHub::new();
        let (mut first, _) = hub.join("cs101", "u1", "Ana");
        let (_second, state) = hub.join("cs101", "u2", "Ben");

        match state {
            RoomEvent::RoomState { members, .. } => assert_eq!(members.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        match first.try_recv().unwrap() {
            RoomEvent::UserJoined { presence, .. } => assert_eq!(presence.user_name, "Ben"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn typing_changes_are_broadcast_once() {
        let hub = RoomHub::new();
        let (mut rx, _) = hub.join("cs101", "u1", "Ana");
        hub.set_typing("cs101", "u1", true);
        hub.set_typing("cs101", "u1", true);
        hub.set_typing("cs101", "u1", false);

        let events: Vec<RoomEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            RoomEvent::Typing {
                room_id: "cs101".into(),
                user_ids: vec!["u1".into()]
            }
        );
    }

    #[test]
    fn strangers_cannot_type() {
        let hub = RoomHub::new();
        let (mut rx, _) = hub.join("cs101", "u1", "Ana");
        hub.set_typing("cs101", "ghost", true);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn last_member_leaving_drops_room() {
        let hub = RoomHub::new();
        let _a = hub.join("cs101", "u1", "Ana");
        let (mut rx, _) = hub.join("cs101", "u2", "Ben");
        assert!(hub.leave("cs101", "u1"));
        assert!(matches!(rx.try_recv().unwrap(), RoomEvent::UserLeft { .. }));
        assert_eq!(hub.room_count(), 1);
        assert!(hub.leave("cs101", "u2"));
        assert_eq!(hub.room_count(), 0);
        assert!(!hub.leave("cs101", "u2"));
    }

    #[test]
    fn member_stays_until_last_connection_leaves() {
        let hub = RoomHub::new();
        let (mut other, _) = hub.join("cs101", "u2", "Ben");
        let (_tab_a, _) = hub.join("cs101", "u1", "Ana");
        let (mut tab_b, state) = hub.join("cs101", "u1", "Ana");
        match state {
            RoomEvent::RoomState { members, .. } => assert_eq!(members.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        // only the first tab is announced
        assert!(matches!(other.try_recv().unwrap(), RoomEvent::UserJoined { .. }));
        assert!(other.try_recv().is_err());

        assert!(hub.leave("cs101", "u1"));
        assert!(hub.is_member("cs101", "u1"));
        assert!(other.try_recv().is_err());

        let msg = RoomMessage::from_user("cs101", "Ana", "still here");
        assert!(hub.publish("cs101", RoomEvent::NewMessage(msg.clone())));
        assert_eq!(tab_b.try_recv().unwrap(), RoomEvent::NewMessage(msg));

        assert!(hub.leave("cs101", "u1"));
        assert!(!hub.is_member("cs101", "u1"));
        assert!(matches!(other.try_recv().unwrap(), RoomEvent::NewMessage(_)));
        assert!(matches!(other.try_recv().unwrap(), RoomEvent::UserLeft { .. }));
    }

    #[test]
    fn shared_user_keeps_room_alive() {
        let hub = RoomHub::new();
        let _a = hub.join("cs101", "u1", "Ana");
        let _b = hub.join("cs101", "u1", "Ana");
        assert!(hub.leave("cs101", "u1"));
        assert_eq!(hub.room_count(), 1);
        assert!(hub.leave("cs101", "u1"));
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn presence_and_publish() {
        let hub = RoomHub::new();
        let (mut rx, _) = hub.join("cs101", "u1", "Ana");
        let presence = hub.update_presence("cs101", "u1", "away").unwrap();
        assert_eq!(presence.status, "away");
        assert!(matches!(rx.try_recv().unwrap(), RoomEvent::PresenceUpdate { .. }));

        let msg = RoomMessage::from_user("cs101", "Ana", "hi all");
        assert!(hub.publish("cs101", RoomEvent::NewMessage(msg.clone())));
        assert_eq!(rx.try_recv().unwrap(), RoomEvent::NewMessage(msg));
        assert!(!hub.publish("nowhere", RoomEvent::Error { message: "x".into() }));
    }
}
