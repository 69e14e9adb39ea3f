use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A member of the social app as the directory service reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// Snapshot of a live audio room.
///
/// Owned by the directory service. The screen never edits one in place; every
/// snapshot replaces the previous one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub topic: String,
    pub host: User,
    #[serde(default)]
    pub speakers: Vec<User>,
    #[serde(default)]
    pub listeners: Vec<User>,
    #[serde(default)]
    pub raised_hands: Vec<String>,
}

impl Room {
    pub fn is_host(&self, user_id: &str) -> bool {
        self.host.id == user_id
    }

    pub fn is_speaker(&self, user_id: &str) -> bool {
        self.speakers.iter().any(|u| u.id == user_id)
    }

    pub fn is_listener(&self, user_id: &str) -> bool {
        self.listeners.iter().any(|u| u.id == user_id)
    }

    /// Look a member up among listeners first, then speakers.
    pub fn member(&self, user_id: &str) -> Option<&User> {
        self.listeners
            .iter()
            .chain(self.speakers.iter())
            .find(|u| u.id == user_id)
    }
}

/// One item of the room subscription stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomUpdate {
    Snapshot(Room),
    /// The room no longer exists.
    Ended,
}

/// A chat message in the room's side panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender: User,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub is_speaker: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            name: id.to_uppercase(),
            username: format!("@{id}"),
            avatar_url: String::new(),
        }
    }

    #[test]
    fn membership_tests() {
        let room = Room {
            id: "r1".into(),
            topic: "Rust".into(),
            host: user("h"),
            speakers: vec![user("h"), user("s")],
            listeners: vec![user("l")],
            raised_hands: vec![],
        };
        assert!(room.is_host("h"));
        assert!(!room.is_host("s"));
        assert!(room.is_speaker("s"));
        assert!(!room.is_speaker("l"));
        assert!(room.is_listener("l"));
        assert_eq!(room.member("l").map(|u| u.name.as_str()), Some("L"));
        assert!(room.member("nobody").is_none());
    }

    #[test]
    fn member_prefers_listener_entry() {
        let mut stale = user("x");
        stale.name = "Old".into();
        let room = Room {
            id: "r1".into(),
            topic: "Rust".into(),
            host: user("h"),
            speakers: vec![user("h"), stale],
            listeners: vec![user("x")],
            raised_hands: vec![],
        };
        assert_eq!(room.member("x").map(|u| u.name.as_str()), Some("X"));
    }

    #[test]
    fn room_deserializes_from_camel_case_with_defaults() {
        let json = r#"{
            "id": "r1",
            "topic": "Late night jazz",
            "host": {"id": "h", "name": "Host", "avatarUrl": "https://a/h.png"},
            "raisedHands": ["l"]
        }"#;
        let room: Room = serde_json::from_str(json).unwrap();
        assert_eq!(room.host.avatar_url, "https://a/h.png");
        assert!(room.speakers.is_empty());
        assert_eq!(room.raised_hands, vec!["l".to_string()]);
    }

    #[test]
    fn message_parses_timestamp_and_flags() {
        let json = r#"{
            "id": "m1",
            "sender": {"id": "h", "name": "Host"},
            "text": "welcome",
            "createdAt": "2026-03-01T20:15:00Z",
            "isHost": true
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(msg.is_host);
        assert!(!msg.is_speaker);
        assert_eq!(msg.created_at.timestamp(), 1_772_396_100);
    }
}
