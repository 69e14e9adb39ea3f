use crate::models::Room;

/// A user's role in a room, derived from membership.
///
/// Never stored: recomputed from the latest snapshot whenever it is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Speaker,
    Listener,
    /// Not (yet) in the snapshot, e.g. right after joining.
    Absent,
}

impl Role {
    pub fn of(room: &Room, user_id: &str) -> Self {
        if room.is_host(user_id) {
            Role::Host
        } else if room.is_speaker(user_id) {
            Role::Speaker
        } else if room.is_listener(user_id) {
            Role::Listener
        } else {
            Role::Absent
        }
    }
}

/// Whether `moderator_id` may move `target_id` between stage and audience.
pub fn can_moderate(room: &Room, moderator_id: &str, target_id: &str) -> bool {
    room.is_host(moderator_id) && !room.is_host(target_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            name: id.to_string(),
            username: id.to_string(),
            avatar_url: String::new(),
        }
    }

    fn room() -> Room {
        Room {
            id: "r1".into(),
            topic: "t".into(),
            host: user("h"),
            speakers: vec![user("h"), user("s")],
            listeners: vec![user("l")],
            raised_hands: vec![],
        }
    }

    #[test]
    fn role_derivation() {
        let room = room();
        assert_eq!(Role::of(&room, "h"), Role::Host);
        assert_eq!(Role::of(&room, "s"), Role::Speaker);
        assert_eq!(Role::of(&room, "l"), Role::Listener);
        assert_eq!(Role::of(&room, "x"), Role::Absent);
    }

    #[test]
    fn host_off_stage_is_still_host() {
        let mut room = room();
        room.speakers.retain(|u| u.id != "h");
        assert_eq!(Role::of(&room, "h"), Role::Host);
        assert!(!room.is_speaker("h"));
        assert_eq!(Role::of(&room, "l"), Role::Listener);
    }

    #[test]
    fn only_host_moderates_and_never_themselves() {
        let room = room();
        assert!(can_moderate(&room, "h", "s"));
        assert!(can_moderate(&room, "h", "l"));
        assert!(!can_moderate(&room, "h", "h"));
        assert!(!can_moderate(&room, "s", "l"));
    }
}
