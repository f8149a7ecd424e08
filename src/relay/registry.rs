use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::mpsc;

use crate::signaling::{bye_reasons, ClientSignal, SignalingMessage};

/// A room never holds more than the two parties of one call
pub const ROOM_CAPACITY: usize = 2;

const RANDOM_ROOM_PREFIX: &str = "random";

/// Client connection handle for sending messages
#[derive(Clone)]
pub struct ClientHandle {
    pub conn_id: String,
    sender: mpsc::UnboundedSender<SignalingMessage>,
}

impl ClientHandle {
    pub fn new(conn_id: String, sender: mpsc::UnboundedSender<SignalingMessage>) -> Self {
        Self { conn_id, sender }
    }

    pub fn send(&self, msg: SignalingMessage) -> bool {
        let kind = msg.kind();
        if self.sender.send(msg).is_err() {
            tracing::trace!(conn_id = %self.conn_id, kind, "Client gone, message dropped");
            return false;
        }
        true
    }
}

struct RoomMembers {
    members: Vec<ClientHandle>,
    random: bool,
}

enum Admission {
    Joined { others: Vec<ClientHandle> },
    AlreadyMember,
    Full,
}

/// Tracks every room and which room each connection is in.
///
/// Capacity checks and inserts happen under one map entry, so two clients
/// racing for the last seat cannot both get in.
pub struct RoomRegistry {
    rooms: DashMap<String, RoomMembers>, // room -> members
    memberships: DashMap<String, String>, // conn_id -> room
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    /// Dispatch one client request.
    pub fn handle(&self, client: &ClientHandle, signal: ClientSignal) {
        tracing::debug!(conn_id = %client.conn_id, kind = signal.kind(), "Client signal");

        match signal {
            ClientSignal::JoinRoom { room } => self.join(client, &room),
            ClientSignal::JoinRandom => self.join_random(client),
            ClientSignal::LeaveRoom { room } => self.leave(&client.conn_id, &room),
            ClientSignal::Offer {
                sdp,
                room,
                sender_label,
            } => {
                let msg = SignalingMessage::Offer {
                    sdp,
                    room: room.clone(),
                    sender_label,
                };
                self.forward(client, &room, msg);
            }
            ClientSignal::Answer {
                sdp,
                room,
                sender_label,
            } => self.forward(client, &room, SignalingMessage::Answer { sdp, sender_label }),
            ClientSignal::Ice { candidate, room } => {
                self.forward(client, &room, SignalingMessage::Candidate { candidate })
            }
        }
    }

    /// Join a named room. A full room answers `room_full` to the joiner only.
    pub fn join(&self, client: &ClientHandle, room: &str) {
        self.leave_current(client, room);

        match self.admit(client, room, false) {
            Admission::Full => {
                tracing::info!(conn_id = %client.conn_id, room = %room, "Room full, join refused");
                client.send(SignalingMessage::RoomFull);
            }
            Admission::AlreadyMember => {
                tracing::debug!(conn_id = %client.conn_id, room = %room, "Repeated join ignored");
            }
            Admission::Joined { others } => self.announce(client, room, others),
        }
    }

    /// Pair the client with someone waiting in a random room, or open a new one.
    pub fn join_random(&self, client: &ClientHandle) {
        if let Some(current) = self.room_of(&client.conn_id) {
            self.leave(&client.conn_id, &current);
        }

        let waiting: Vec<String> = self
            .rooms
            .iter()
            .filter(|r| r.random && r.members.len() < ROOM_CAPACITY)
            .map(|r| r.key().clone())
            .collect();

        for room in waiting {
            if let Admission::Joined { others } = self.admit(client, &room, true) {
                self.announce(client, &room, others);
                return;
            }
        }

        loop {
            let room = generate_room_name();
            if let Entry::Vacant(entry) = self.rooms.entry(room.clone()) {
                entry.insert(RoomMembers {
                    members: vec![client.clone()],
                    random: true,
                });
                self.announce(client, &room, Vec::new());
                return;
            }
        }
    }

    /// Voluntary departure; the remaining member gets `bye`.
    pub fn leave(&self, conn_id: &str, room: &str) {
        let removed = self
            .memberships
            .remove_if(conn_id, |_, current| current == room)
            .is_some();
        if !removed {
            tracing::debug!(conn_id = %conn_id, room = %room, "Leave for a room the client is not in");
            return;
        }
        self.remove_member(room, conn_id, bye_reasons::PEER_LEFT);
    }

    /// Connection closed; behaves like a leave of whatever room it was in.
    pub fn disconnect(&self, conn_id: &str) {
        if let Some((_, room)) = self.memberships.remove(conn_id) {
            self.remove_member(&room, conn_id, bye_reasons::PEER_DISCONNECTED);
        }
    }

    pub fn room_of(&self, conn_id: &str) -> Option<String> {
        self.memberships.get(conn_id).map(|r| r.clone())
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|r| r.members.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn admit(&self, client: &ClientHandle, room: &str, random: bool) -> Admission {
        match self.rooms.entry(room.to_string()) {
            Entry::Occupied(mut entry) => {
                let members = entry.get_mut();
                if members.members.iter().any(|m| m.conn_id == client.conn_id) {
                    return Admission::AlreadyMember;
                }
                if members.members.len() >= ROOM_CAPACITY {
                    return Admission::Full;
                }
                let others = members.members.clone();
                members.members.push(client.clone());
                Admission::Joined { others }
            }
            Entry::Vacant(entry) => {
                entry.insert(RoomMembers {
                    members: vec![client.clone()],
                    random,
                });
                Admission::Joined { others: Vec::new() }
            }
        }
    }

    fn announce(&self, client: &ClientHandle, room: &str, others: Vec<ClientHandle>) {
        self.memberships
            .insert(client.conn_id.clone(), room.to_string());

        tracing::info!(
            conn_id = %client.conn_id,
            room = %room,
            members = others.len() + 1,
            "Client joined room"
        );

        client.send(SignalingMessage::RoomAssigned {
            room: room.to_string(),
        });
        for other in others {
            other.send(SignalingMessage::Welcome);
        }
    }

    fn leave_current(&self, client: &ClientHandle, next: &str) {
        if let Some(current) = self.room_of(&client.conn_id) {
            if current != next {
                self.leave(&client.conn_id, &current);
            }
        }
    }

    fn forward(&self, sender: &ClientHandle, room: &str, msg: SignalingMessage) {
        let recipients: Vec<ClientHandle> = match self.rooms.get(room) {
            Some(r) if r.members.iter().any(|m| m.conn_id == sender.conn_id) => r
                .members
                .iter()
                .filter(|m| m.conn_id != sender.conn_id)
                .cloned()
                .collect(),
            _ => {
                tracing::warn!(
                    conn_id = %sender.conn_id,
                    room = %room,
                    kind = msg.kind(),
                    "Signal for a room the sender is not in, dropped"
                );
                return;
            }
        };

        for recipient in recipients {
            recipient.send(msg.clone());
        }
    }

    fn remove_member(&self, room: &str, conn_id: &str, reason: &str) {
        let remaining = {
            let Some(mut entry) = self.rooms.get_mut(room) else {
                return;
            };
            entry.members.retain(|m| m.conn_id != conn_id);
            entry.members.clone()
        };

        // Clean up empty rooms
        self.rooms.remove_if(room, |_, r| r.members.is_empty());

        tracing::info!(conn_id = %conn_id, room = %room, reason, "Client left room");

        for member in remaining {
            member.send(SignalingMessage::Bye {
                reason: reason.to_string(),
            });
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Relay-chosen name for a random room (e.g. "random-7K2P-9QXH").
/// Uppercase only, no confusable characters.
pub fn generate_room_name() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::rng();

    let mut raw = String::with_capacity(8);
    for _ in 0..8 {
        let idx = rng.random_range(0..CHARSET.len());
        raw.push(CHARSET[idx] as char);
    }

    format!("{}-{}-{}", RANDOM_ROOM_PREFIX, &raw[0..4], &raw[4..8])
}
