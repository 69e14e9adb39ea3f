//! Contract of the real-time audio SDK.
//!
//! Connection lifecycle, track encoding and speaker-volume detection all
//! happen inside the SDK. The screen only sequences calls and reacts to the
//! two events it cares about.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::errors::RoomError;
use crate::speaker::VolumeLevel;

/// Capture settings for the local microphone track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub sample_rate: u32,
    pub channels: u32,
    pub voice_processing: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
            voice_processing: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUser {
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    UserPublished { user: RemoteUser, kind: MediaKind },
    VolumeIndicator(Vec<VolumeLevel>),
}

/// Entry point of the SDK.
pub trait AudioTransport: Send + Sync {
    fn create_client(&self, config: &ClientConfig) -> Arc<dyn TransportClient>;
}

#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Register the event handler. A later call replaces the earlier one.
    fn events(&self) -> UnboundedReceiver<TransportEvent>;

    /// Unregister the event handler; its receiver drains and closes.
    fn off_events(&self);

    /// Start periodic `VolumeIndicator` events.
    fn enable_volume_indicator(&self);

    async fn join(
        &self,
        app_id: &str,
        channel: &str,
        token: &str,
        user_id: &str,
    ) -> Result<(), RoomError>;

    async fn create_mic_track(&self) -> Result<Arc<dyn MicTrack>, RoomError>;

    async fn publish(&self, tracks: &[Arc<dyn MicTrack>]) -> Result<(), RoomError>;

    /// Subscribe to a remote user's media; subscribed audio starts playing.
    async fn subscribe(&self, user: &RemoteUser, kind: MediaKind) -> Result<(), RoomError>;

    async fn leave(&self) -> Result<(), RoomError>;
}

/// Local microphone track created by a [`TransportClient`].
#[async_trait]
pub trait MicTrack: Send + Sync {
    fn id(&self) -> &str;

    async fn set_muted(&self, muted: bool) -> Result<(), RoomError>;

    fn is_muted(&self) -> bool;

    /// Stop capturing.
    async fn stop(&self);

    /// Release the track; it cannot be published again.
    async fn close(&self);
}
