use std::sync::{Arc, PoisonError, RwLock};

use crate::models::{Message, Room};

/// Events emitted by the room screen to native UI listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenEvent {
    RoomChanged(Room),
    MessagesChanged(Vec<Message>),
    MuteChanged(bool),
    ActiveSpeakerChanged(Option<String>), // user id
    /// A single human-readable line for the shell to show or speak.
    Notice(String),
    /// The screen is done; the shell should navigate back.
    Exited,
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait ScreenEventListener: Send + Sync {
    fn on_event(&self, event: ScreenEvent);
}

/// Internal event emitter that dispatches to registered listeners.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<RwLock<Vec<Arc<dyn ScreenEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn ScreenEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn emit(&self, event: ScreenEvent) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}
