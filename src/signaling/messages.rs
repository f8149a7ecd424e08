use serde::{Deserialize, Serialize};

use crate::models::{IceCandidate, SessionDescription};

// ==================== Client -> Relay Messages ====================

/// Requests a client sends to the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientSignal {
    JoinRoom {
        room: String,
    },
    JoinRandom,
    LeaveRoom {
        room: String,
    },
    Offer {
        sdp: SessionDescription,
        room: String,
        sender_label: String,
    },
    Answer {
        sdp: SessionDescription,
        room: String,
        sender_label: String,
    },
    Ice {
        candidate: IceCandidate,
        room: String,
    },
}

impl ClientSignal {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientSignal::JoinRoom { .. } => msg_types::JOIN_ROOM,
            ClientSignal::JoinRandom => msg_types::JOIN_RANDOM,
            ClientSignal::LeaveRoom { .. } => msg_types::LEAVE_ROOM,
            ClientSignal::Offer { .. } => msg_types::OFFER,
            ClientSignal::Answer { .. } => msg_types::ANSWER,
            ClientSignal::Ice { .. } => msg_types::ICE,
        }
    }
}

// ==================== Relay -> Client Messages ====================

/// Events the relay delivers to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingMessage {
    /// Another member is already in the room; the receiver becomes the caller
    Welcome,
    RoomAssigned {
        room: String,
    },
    Offer {
        sdp: SessionDescription,
        room: String,
        sender_label: String,
    },
    Answer {
        sdp: SessionDescription,
        sender_label: String,
    },
    #[serde(rename = "ice")]
    Candidate {
        candidate: IceCandidate,
    },
    Bye {
        reason: String,
    },
    RoomFull,
}

impl SignalingMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::Welcome => msg_types::WELCOME,
            SignalingMessage::RoomAssigned { .. } => msg_types::ROOM_ASSIGNED,
            SignalingMessage::Offer { .. } => msg_types::OFFER,
            SignalingMessage::Answer { .. } => msg_types::ANSWER,
            SignalingMessage::Candidate { .. } => msg_types::ICE,
            SignalingMessage::Bye { .. } => msg_types::BYE,
            SignalingMessage::RoomFull => msg_types::ROOM_FULL,
        }
    }
}

/// Wire names of the `type` tag
pub mod msg_types {
    pub const JOIN_ROOM: &str = "join_room";
    pub const JOIN_RANDOM: &str = "join_random";
    pub const LEAVE_ROOM: &str = "leave_room";
    pub const OFFER: &str = "offer";
    pub const ANSWER: &str = "answer";
    pub const ICE: &str = "ice";

    // Relay -> Client
    pub const WELCOME: &str = "welcome";
    pub const ROOM_ASSIGNED: &str = "room_assigned";
    pub const BYE: &str = "bye";
    pub const ROOM_FULL: &str = "room_full";
}

/// Reasons carried by `bye`
pub mod bye_reasons {
    pub const PEER_LEFT: &str = "peer_left";
    pub const PEER_DISCONNECTED: &str = "peer_disconnected";
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_client_signals_use_snake_case_tags() {
        let join = serde_json::to_value(ClientSignal::JoinRoom {
            room: "a@b.io".into(),
        })
        .expect("Should serialize");
        assert_eq!(join, json!({"type": "join_room", "room": "a@b.io"}));

        let random = serde_json::to_value(ClientSignal::JoinRandom).expect("Should serialize");
        assert_eq!(random, json!({"type": "join_random"}));
    }

    #[test]
    fn test_offer_carries_description_object() {
        let offer = ClientSignal::Offer {
            sdp: SessionDescription::offer("v=0"),
            room: "r1@rooms.io".into(),
            sender_label: "alice@example.com".into(),
        };
        let value = serde_json::to_value(&offer).expect("Should serialize");
        assert_eq!(
            value,
            json!({
                "type": "offer",
                "sdp": {"type": "offer", "sdp": "v=0"},
                "room": "r1@rooms.io",
                "sender_label": "alice@example.com"
            })
        );
    }

    #[test]
    fn test_relay_candidate_uses_ice_tag() {
        let raw = json!({
            "type": "ice",
            "candidate": {
                "candidate": "candidate:1 1 udp 2122252543 10.0.0.1 50000 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0
            }
        });
        let message: SignalingMessage = serde_json::from_value(raw).expect("Should decode ice");
        match message {
            SignalingMessage::Candidate { candidate } => {
                assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
                assert_eq!(candidate.sdp_mline_index, Some(0));
            }
            other => panic!("Expected candidate, got {:?}", other),
        }
    }

    #[test]
    fn test_unit_variants_and_unknown_types() {
        let full: SignalingMessage =
            serde_json::from_str(r#"{"type":"room_full"}"#).expect("Should decode room_full");
        assert_eq!(full, SignalingMessage::RoomFull);
        assert_eq!(full.kind(), msg_types::ROOM_FULL);

        assert!(serde_json::from_str::<SignalingMessage>(r#"{"type":"publish"}"#).is_err());
        assert!(serde_json::from_str::<SignalingMessage>(r#"{"type":"bye"}"#).is_err());
    }
}
