//! Live audio room screen core.
//!
//! Mirrors a room held by the directory service, drives the audio transport
//! from it, and exposes the result to native UI shells as events and views.

pub mod audio_playout;
pub mod chat;
pub mod directory;
pub mod errors;
pub mod events;
pub mod hand_raise;
pub mod http_directory;
pub mod livekit_transport;
pub mod logging;
pub mod models;
pub mod participants;
pub mod room;
pub mod settings;
pub mod speaker;
pub mod transport;
pub mod view;

#[cfg(test)]
mod testing;

pub use directory::RoomDirectory;
pub use errors::RoomError;
pub use events::{ScreenEvent, ScreenEventListener};
pub use http_directory::HttpDirectory;
pub use livekit_transport::LiveKitTransport;
pub use logging::init_logging;
pub use models::{Message, Room, RoomUpdate, User};
pub use room::RoomScreen;
pub use settings::{Settings, SettingsStore, SpeakerMutePolicy};
pub use transport::{AudioTransport, MicTrack, TransportClient};
pub use view::RoomView;
