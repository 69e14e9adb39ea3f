use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::Message;

/// Shared message store between the chat subscription loop and the screen.
pub type MessageStore = Arc<Mutex<Vec<Message>>>;

/// Local state of the chat side panel.
///
/// The message list mirrors the last list the directory delivered; sending
/// goes through the directory and the sent message only appears once the
/// subscription echoes it back.
#[derive(Clone, Default)]
pub struct ChatPanel {
    messages: MessageStore,
    draft: Arc<Mutex<String>>,
    open: Arc<Mutex<bool>>,
}

impl ChatPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the mirrored list with the latest delivery.
    pub async fn replace_messages(&self, messages: Vec<Message>) {
        *self.messages.lock().await = messages;
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    pub async fn set_draft(&self, text: &str) {
        *self.draft.lock().await = text.to_string();
    }

    pub async fn draft(&self) -> String {
        self.draft.lock().await.clone()
    }

    /// Clear the draft only if it still reads `sent`. Returns whether it did.
    pub async fn clear_draft_if(&self, sent: &str) -> bool {
        let mut draft = self.draft.lock().await;
        if *draft != sent {
            return false;
        }
        draft.clear();
        true
    }

    /// Flip the panel and return the new state.
    pub async fn toggle(&self) -> bool {
        let mut open = self.open.lock().await;
        *open = !*open;
        *open
    }

    pub async fn is_open(&self) -> bool {
        *self.open.lock().await
    }
}
