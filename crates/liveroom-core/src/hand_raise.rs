use crate::models::{Room, User};

/// Read-only view over a snapshot's raised-hands queue.
///
/// The directory service owns the queue and its order. Raising a hand is a
/// request to the service; the queue only changes when the next snapshot
/// arrives.
pub struct RaisedHands<'a> {
    room: &'a Room,
}

impl<'a> RaisedHands<'a> {
    pub fn new(room: &'a Room) -> Self {
        Self { room }
    }

    pub fn len(&self) -> usize {
        self.room.raised_hands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.room.raised_hands.is_empty()
    }

    pub fn has_raised_hand(&self, user_id: &str) -> bool {
        self.room.raised_hands.iter().any(|id| id == user_id)
    }

    /// Resolve queued ids to room members in queue order, listeners first
    /// when an id is listed on both sides.
    ///
    /// Ids that are neither speakers nor listeners (e.g. the user left
    /// between the hand raise and this snapshot) are skipped.
    pub fn users(&self) -> Vec<User> {
        self.room
            .raised_hands
            .iter()
            .filter_map(|id| {
                let user = self.room.member(id);
                if user.is_none() {
                    tracing::debug!("raised hand for unknown member {id} skipped");
                }
                user.cloned()
            })
            .collect()
    }
}
