//! Contract of the room directory service.
//!
//! The directory owns every piece of room state: membership, the hand-raise
//! queue and chat history. The screen only reads it through subscriptions
//! and changes it through requests.

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::errors::RoomError;
use crate::models::{Message, RoomUpdate, User};

#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Stream of room snapshots. Dropping the receiver unsubscribes.
    async fn subscribe_room(&self, room_id: &str)
    -> Result<UnboundedReceiver<RoomUpdate>, RoomError>;

    /// Stream of full message lists. Dropping the receiver unsubscribes.
    async fn subscribe_messages(
        &self,
        room_id: &str,
    ) -> Result<UnboundedReceiver<Vec<Message>>, RoomError>;

    async fn join_room(&self, user_id: &str, room_id: &str) -> Result<(), RoomError>;

    async fn leave_room(&self, user_id: &str, room_id: &str) -> Result<(), RoomError>;

    async fn end_room(&self, host_id: &str, room_id: &str) -> Result<(), RoomError>;

    async fn raise_hand(&self, user_id: &str, room_id: &str) -> Result<(), RoomError>;

    async fn invite_to_speak(
        &self,
        inviter_id: &str,
        user_id: &str,
        room_id: &str,
    ) -> Result<(), RoomError>;

    async fn demote_to_listener(
        &self,
        demoter_id: &str,
        user_id: &str,
        room_id: &str,
    ) -> Result<(), RoomError>;

    async fn send_message(
        &self,
        room_id: &str,
        sender: &User,
        text: &str,
        is_host: bool,
        is_speaker: bool,
    ) -> Result<(), RoomError>;

    /// Access token for the audio transport channel of `room_id`.
    ///
    /// `Ok(None)` means the service answered but issued no token.
    async fn transport_token(&self, room_id: &str, user_id: &str)
    -> Result<Option<String>, RoomError>;
}
