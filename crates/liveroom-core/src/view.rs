//! Render-ready view of the room screen.
//!
//! Everything a shell needs to draw one frame, derived from the latest
//! snapshot and local session state. Nothing here is stored.

use chrono::{DateTime, Local, Utc};

use crate::hand_raise::RaisedHands;
use crate::models::{Message, Room, User};
use crate::participants::{Role, can_moderate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileAction {
    /// Host only: move this speaker back to the audience.
    MoveToAudience(String),
    OpenProfile(String), // username
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantTile {
    pub user: User,
    pub is_host: bool,
    pub is_muted: bool,
    pub is_speaking: bool,
    pub action: TileAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicIcon {
    Microphone,
    MicrophoneSlash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicButton {
    pub muted: bool,
    pub icon: MicIcon,
    /// Pulses while the user's hand is up.
    pub pulsing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageLine {
    pub id: String,
    pub sender_name: String,
    pub sender_avatar_url: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// `HH:MM` in local time.
    pub time_label: String,
}

impl From<&Message> for MessageLine {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            sender_name: msg.sender.name.clone(),
            sender_avatar_url: msg.sender.avatar_url.clone(),
            text: msg.text.clone(),
            created_at: msg.created_at,
            time_label: msg.created_at.with_timezone(&Local).format("%H:%M").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatView {
    pub open: bool,
    pub draft: String,
    pub lines: Vec<MessageLine>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomView {
    pub topic: String,
    pub is_host: bool,
    pub leave_label: &'static str,
    pub speakers: Vec<ParticipantTile>,
    pub listeners: Vec<ParticipantTile>,
    /// Only populated for the host.
    pub raised_hands: Vec<User>,
    /// Queued ids including unresolved ones; zero unless host.
    pub raised_hand_count: usize,
    pub mic: MicButton,
    pub chat: ChatView,
}

/// Local inputs to [`RoomView::derive`] besides the snapshot itself.
pub struct SessionView<'a> {
    pub current_user_id: &'a str,
    pub is_muted: bool,
    pub is_speaker: bool,
    pub active_speaker: Option<&'a str>,
    pub chat_open: bool,
    pub draft: &'a str,
    pub messages: &'a [Message],
}

impl RoomView {
    pub fn derive(room: &Room, session: &SessionView<'_>) -> Self {
        let me = session.current_user_id;
        let is_host = Role::of(room, me) == Role::Host;
        let hands = RaisedHands::new(room);

        let speakers = room
            .speakers
            .iter()
            .map(|s| ParticipantTile {
                user: s.clone(),
                is_host: room.is_host(&s.id),
                is_muted: s.id == me && session.is_muted,
                is_speaking: session.active_speaker == Some(s.id.as_str()),
                action: if can_moderate(room, me, &s.id) {
                    TileAction::MoveToAudience(s.id.clone())
                } else {
                    TileAction::None
                },
            })
            .collect();

        let listeners = room
            .listeners
            .iter()
            .map(|l| ParticipantTile {
                user: l.clone(),
                is_host: false,
                is_muted: true,
                is_speaking: false,
                action: TileAction::OpenProfile(l.username.clone()),
            })
            .collect();

        let icon = if session.is_muted && session.is_speaker {
            MicIcon::MicrophoneSlash
        } else {
            MicIcon::Microphone
        };

        RoomView {
            topic: room.topic.clone(),
            is_host,
            leave_label: if is_host { "End Room" } else { "Leave Quietly" },
            speakers,
            listeners,
            raised_hands: if is_host && !hands.is_empty() {
                hands.users()
            } else {
                Vec::new()
            },
            raised_hand_count: if is_host { hands.len() } else { 0 },
            mic: MicButton {
                muted: session.is_muted,
                icon,
                pulsing: hands.has_raised_hand(me),
            },
            chat: ChatView {
                open: session.chat_open,
                draft: session.draft.to_string(),
                lines: session.messages.iter().map(MessageLine::from).collect(),
            },
        }
    }
}
