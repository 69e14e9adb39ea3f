use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Mutex, watch};

use crate::chat::ChatPanel;
use crate::directory::RoomDirectory;
use crate::errors::RoomError;
use crate::events::{EventEmitter, ScreenEvent, ScreenEventListener};
use crate::models::{Message, Room, RoomUpdate, User};
use crate::participants::{Role, can_moderate};
use crate::settings::{Settings, SpeakerMutePolicy};
use crate::speaker::{VolumeLevel, select_active_speaker};
use crate::transport::{
    AudioTransport, ClientConfig, MediaKind, MicTrack, TransportClient, TransportEvent,
};
use crate::view::{RoomView, SessionView};

const NOTICE_MISSING_APP_ID: &str = "Audio transport app id is not configured.";
const NOTICE_ROOM_ENDED: &str = "This room has ended.";
const NOTICE_HAND_RAISED: &str = "You've raised your hand to speak.";

#[derive(Debug, Clone)]
struct ScreenState {
    room: Option<Room>,
    is_muted: bool,
    is_speaker: bool,
    active_speaker: Option<String>,
    /// Last mute choice the user made while on stage.
    last_speaker_choice: Option<bool>,
}

impl Default for ScreenState {
    fn default() -> Self {
        Self {
            room: None,
            is_muted: true,
            is_speaker: false,
            active_speaker: None,
            last_speaker_choice: None,
        }
    }
}

/// Controller behind the live audio room screen.
///
/// Mirrors the directory's room and chat streams into local state, drives the
/// audio transport from that state, and forwards user actions to the
/// directory. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct RoomScreen {
    current_user: User,
    room_id: String,
    settings: Settings,
    directory: Arc<dyn RoomDirectory>,
    transport: Arc<dyn AudioTransport>,
    emitter: EventEmitter,
    state: Arc<Mutex<ScreenState>>,
    chat: ChatPanel,
    client: Arc<Mutex<Option<Arc<dyn TransportClient>>>>,
    mic: Arc<Mutex<Option<Arc<dyn MicTrack>>>>,
    /// Serializes every change of the microphone's muted flag.
    mute_lock: Arc<Mutex<()>>,
    activated: Arc<AtomicBool>,
    directory_joined: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl RoomScreen {
    pub fn new(
        current_user: User,
        room_id: impl Into<String>,
        settings: Settings,
        directory: Arc<dyn RoomDirectory>,
        transport: Arc<dyn AudioTransport>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            current_user,
            room_id: room_id.into(),
            settings,
            directory,
            transport,
            emitter: EventEmitter::new(),
            state: Arc::new(Mutex::new(ScreenState::default())),
            chat: ChatPanel::new(),
            client: Arc::new(Mutex::new(None)),
            mic: Arc::new(Mutex::new(None)),
            mute_lock: Arc::new(Mutex::new(())),
            activated: Arc::new(AtomicBool::new(false)),
            directory_joined: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
            exited: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Register a listener for screen events.
    pub fn add_listener(&self, listener: Arc<dyn ScreenEventListener>) {
        self.emitter.add_listener(listener);
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn current_user(&self) -> &User {
        &self.current_user
    }

    // ── Read side ───────────────────────────────────────────────────────

    pub async fn room(&self) -> Option<Room> {
        self.state.lock().await.room.clone()
    }

    /// True until the first snapshot arrives.
    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.room.is_none()
    }

    pub async fn is_muted(&self) -> bool {
        self.state.lock().await.is_muted
    }

    pub async fn is_speaker(&self) -> bool {
        self.state.lock().await.is_speaker
    }

    pub async fn is_host(&self) -> bool {
        self.state
            .lock()
            .await
            .room
            .as_ref()
            .is_some_and(|r| r.is_host(&self.current_user.id))
    }

    pub async fn role(&self) -> Role {
        match self.state.lock().await.room.as_ref() {
            Some(room) => Role::of(room, &self.current_user.id),
            None => Role::Absent,
        }
    }

    pub async fn active_speaker(&self) -> Option<String> {
        self.state.lock().await.active_speaker.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.chat.messages().await
    }

    pub async fn draft(&self) -> String {
        self.chat.draft().await
    }

    pub async fn is_chat_open(&self) -> bool {
        self.chat.is_open().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Everything needed to draw the screen, or `None` while loading.
    pub async fn view(&self) -> Option<RoomView> {
        let state = self.state.lock().await.clone();
        let room = state.room.as_ref()?;
        let messages = self.chat.messages().await;
        let draft = self.chat.draft().await;
        let chat_open = self.chat.is_open().await;
        Some(RoomView::derive(
            room,
            &SessionView {
                current_user_id: &self.current_user.id,
                is_muted: state.is_muted,
                is_speaker: state.is_speaker,
                active_speaker: state.active_speaker.as_deref(),
                chat_open,
                draft: &draft,
                messages: &messages,
            },
        ))
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Subscribe to the room and its chat, then join and publish audio.
    ///
    /// A failed join is reported through a [`ScreenEvent::Notice`], the
    /// screen exits, and the error is returned as well.
    pub async fn activate(&self) -> Result<(), RoomError> {
        if self.activated.swap(true, Ordering::SeqCst) {
            tracing::debug!("room screen {} already active", self.room_id);
            return Ok(());
        }
        tracing::info!(
            "activating room screen {} for {}",
            self.room_id,
            self.current_user.id
        );

        match self.start().await {
            Ok(()) => Ok(()),
            Err(RoomError::Closed) => {
                tracing::info!("room screen closed before the join completed");
                Ok(())
            }
            Err(e) if self.is_closed() => {
                tracing::info!("join step failed after the screen closed: {e}");
                Ok(())
            }
            Err(e) => {
                tracing::error!("joining room {} failed: {e}", self.room_id);
                let notice = match &e {
                    RoomError::Config(_) => NOTICE_MISSING_APP_ID.to_string(),
                    other => format!("Could not join the room: {other}"),
                };
                self.notice(notice);
                self.exit().await;
                Err(e)
            }
        }
    }

    async fn start(&self) -> Result<(), RoomError> {
        if self.is_closed() {
            return Err(RoomError::Closed);
        }
        let updates = self.directory.subscribe_room(&self.room_id).await?;
        self.spawn_room_loop(updates);

        let messages = self.directory.subscribe_messages(&self.room_id).await?;
        self.spawn_chat_loop(messages);

        self.join_and_publish().await
    }

    async fn join_and_publish(&self) -> Result<(), RoomError> {
        let app_id = self
            .settings
            .app_id()
            .ok_or_else(|| RoomError::Config("audio transport app id is not configured".into()))?
            .to_string();
        let user_id = self.current_user.id.as_str();

        let client = self.transport.create_client(&ClientConfig::default());
        *self.client.lock().await = Some(client.clone());
        self.spawn_transport_loop(client.clone(), client.events());
        client.enable_volume_indicator();

        // Every step checks for teardown before its own error propagates.
        self.directory_joined.store(true, Ordering::SeqCst);
        let joined = self.directory.join_room(user_id, &self.room_id).await;
        if joined.is_ok() && self.is_closed() {
            // The departure sent by deactivate may have reached the
            // directory before this join did.
            self.leave_directory().await;
        }
        self.bail_if_closed(&client, false, None).await?;
        joined?;

        let token = self.directory.transport_token(&self.room_id, user_id).await;
        self.bail_if_closed(&client, false, None).await?;
        let token = token?
            .filter(|token| !token.is_empty())
            .ok_or_else(|| RoomError::Directory("failed to get transport token".into()))?;

        let connected = client.join(&app_id, &self.room_id, &token, user_id).await;
        self.bail_if_closed(&client, connected.is_ok(), None).await?;
        connected?;

        let track = client.create_mic_track().await;
        self.bail_if_closed(&client, true, track.as_ref().ok()).await?;
        let track = track?;
        *self.mic.lock().await = Some(track.clone());

        let published = client.publish(std::slice::from_ref(&track)).await;
        self.bail_if_closed(&client, true, Some(&track)).await?;
        published?;

        // Non-speakers always join muted.
        let _guard = self.mute_lock.lock().await;
        let (am_speaker, muted) = {
            let state = self.state.lock().await;
            let am_speaker = state
                .room
                .as_ref()
                .is_some_and(|room| room.is_speaker(user_id));
            let muted = match (am_speaker, state.is_speaker) {
                (false, _) => true,
                (true, true) => state.is_muted,
                (true, false) => self.promoted_mute(&state),
            };
            (am_speaker, muted)
        };
        track.set_muted(muted).await?;
        {
            let mut state = self.state.lock().await;
            state.is_speaker = am_speaker;
            state.is_muted = muted;
        }
        tracing::info!("joined room {} (speaker: {am_speaker}, muted: {muted})", self.room_id);
        self.emitter.emit(ScreenEvent::MuteChanged(muted));
        Ok(())
    }

    /// Release what a join step created after the screen was torn down.
    async fn bail_if_closed(
        &self,
        client: &Arc<dyn TransportClient>,
        joined: bool,
        track: Option<&Arc<dyn MicTrack>>,
    ) -> Result<(), RoomError> {
        if !self.is_closed() {
            return Ok(());
        }
        if let Some(track) = track {
            self.mic.lock().await.take();
            track.stop().await;
            track.close().await;
        }
        if joined {
            client.off_events();
            if let Err(e) = client.leave().await {
                tracing::warn!("leaving transport after late join: {e}");
            }
        }
        Err(RoomError::Closed)
    }

    /// Tear down subscriptions and the transport, and tell the directory we
    /// left. Safe to call more than once; only the first call does anything.
    pub async fn deactivate(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("deactivating room screen {}", self.room_id);
        self.shutdown.send_replace(true);

        let client = self.client.lock().await.take();
        if let Some(client) = &client {
            client.off_events();
        }

        let track = self.mic.lock().await.take();
        if let Some(track) = track {
            track.stop().await;
            track.close().await;
        }

        if let Some(client) = client {
            if let Err(e) = client.leave().await {
                tracing::warn!("leaving transport channel: {e}");
            }
        }

        if self.directory_joined.load(Ordering::SeqCst) {
            self.leave_directory().await;
        }
    }

    async fn leave_directory(&self) {
        if let Err(e) = self
            .directory
            .leave_room(&self.current_user.id, &self.room_id)
            .await
        {
            tracing::warn!("notifying directory of departure: {e}");
        }
    }

    /// Deactivate and tell the shell to navigate away.
    async fn exit(&self) {
        self.deactivate().await;
        if !self.exited.swap(true, Ordering::SeqCst) {
            self.emitter.emit(ScreenEvent::Exited);
        }
    }

    fn notice(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!("notice: {text}");
        self.emitter.emit(ScreenEvent::Notice(text));
    }

    // ── Event loops ─────────────────────────────────────────────────────

    fn spawn_room_loop(&self, mut updates: UnboundedReceiver<RoomUpdate>) {
        let screen = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            while !*shutdown.borrow() {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    update = updates.recv() => match update {
                        Some(update) => screen.handle_room_update(update).await,
                        None => break,
                    },
                }
            }
            tracing::debug!("room loop ended");
        });
    }

    fn spawn_chat_loop(&self, mut lists: UnboundedReceiver<Vec<Message>>) {
        let screen = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            while !*shutdown.borrow() {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    list = lists.recv() => match list {
                        Some(list) => screen.handle_messages(list).await,
                        None => break,
                    },
                }
            }
            tracing::debug!("chat loop ended");
        });
    }

    fn spawn_transport_loop(
        &self,
        client: Arc<dyn TransportClient>,
        mut events: UnboundedReceiver<TransportEvent>,
    ) {
        let screen = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            while !*shutdown.borrow() {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    event = events.recv() => match event {
                        Some(TransportEvent::UserPublished { user, kind: MediaKind::Audio }) => {
                            if let Err(e) = client.subscribe(&user, MediaKind::Audio).await {
                                tracing::warn!("subscribing to {}: {e}", user.uid);
                            }
                        }
                        Some(TransportEvent::UserPublished { user, kind }) => {
                            tracing::debug!("ignoring {kind:?} published by {}", user.uid);
                        }
                        Some(TransportEvent::VolumeIndicator(levels)) => {
                            screen.handle_volume_report(&levels).await;
                        }
                        None => break,
                    },
                }
            }
            tracing::debug!("transport loop ended");
        });
    }

    /// Apply one item of the room stream.
    pub async fn handle_room_update(&self, update: RoomUpdate) {
        if self.is_closed() {
            return;
        }
        match update {
            RoomUpdate::Ended => {
                tracing::info!("room {} ended", self.room_id);
                self.notice(NOTICE_ROOM_ENDED);
                self.exit().await;
            }
            RoomUpdate::Snapshot(room) => {
                let am_speaker = room.is_speaker(&self.current_user.id);
                self.state.lock().await.room = Some(room.clone());
                self.emitter.emit(ScreenEvent::RoomChanged(room));
                self.reconcile_role(am_speaker).await;
            }
        }
    }

    /// Apply one delivered message list.
    pub async fn handle_messages(&self, messages: Vec<Message>) {
        tracing::debug!("{} chat messages", messages.len());
        self.chat.replace_messages(messages.clone()).await;
        self.emitter.emit(ScreenEvent::MessagesChanged(messages));
    }

    /// Apply one volume report from the transport.
    pub async fn handle_volume_report(&self, levels: &[VolumeLevel]) {
        let active = select_active_speaker(levels, self.settings.active_speaker_threshold);
        let changed = {
            let mut state = self.state.lock().await;
            if state.active_speaker == active {
                false
            } else {
                state.active_speaker = active.clone();
                true
            }
        };
        if changed {
            self.emitter.emit(ScreenEvent::ActiveSpeakerChanged(active));
        }
    }

    fn promoted_mute(&self, state: &ScreenState) -> bool {
        match self.settings.speaker_mute_policy {
            SpeakerMutePolicy::Unmute => false,
            SpeakerMutePolicy::PreserveLastChoice => state.last_speaker_choice.unwrap_or(false),
        }
    }

    /// Follow a change of stage membership with the microphone.
    async fn reconcile_role(&self, am_speaker: bool) {
        let _guard = self.mute_lock.lock().await;
        let muted = {
            let state = self.state.lock().await;
            if state.is_speaker == am_speaker {
                return;
            }
            if am_speaker {
                self.promoted_mute(&state)
            } else {
                true
            }
        };
        tracing::info!("role changed (speaker: {am_speaker}); muted: {muted}");

        let track = self.mic.lock().await.clone();
        if let Some(track) = track {
            if let Err(e) = track.set_muted(muted).await {
                tracing::warn!("applying mute after role change: {e}");
            }
        }
        {
            let mut state = self.state.lock().await;
            state.is_speaker = am_speaker;
            state.is_muted = muted;
        }
        self.emitter.emit(ScreenEvent::MuteChanged(muted));
    }

    // ── User actions ────────────────────────────────────────────────────

    /// Speakers flip their microphone; everybody else raises a hand.
    pub async fn toggle_mute(&self) -> Result<(), RoomError> {
        let guard = self.mute_lock.lock().await;
        let (is_speaker, muted) = {
            let state = self.state.lock().await;
            (state.is_speaker, !state.is_muted)
        };
        if !is_speaker {
            drop(guard);
            return self.raise_hand().await;
        }

        let track = self.mic.lock().await.clone();
        if let Some(track) = track {
            track.set_muted(muted).await?;
        }
        {
            let mut state = self.state.lock().await;
            state.is_muted = muted;
            state.last_speaker_choice = Some(muted);
        }
        self.emitter.emit(ScreenEvent::MuteChanged(muted));
        Ok(())
    }

    pub async fn raise_hand(&self) -> Result<(), RoomError> {
        self.directory
            .raise_hand(&self.current_user.id, &self.room_id)
            .await?;
        self.notice(NOTICE_HAND_RAISED);
        Ok(())
    }

    pub async fn invite_to_speak(&self, user_id: &str) -> Result<(), RoomError> {
        self.ensure_moderator(user_id, "invite listeners to speak").await?;
        tracing::info!("inviting {user_id} to speak");
        self.directory
            .invite_to_speak(&self.current_user.id, user_id, &self.room_id)
            .await
    }

    pub async fn demote_to_listener(&self, user_id: &str) -> Result<(), RoomError> {
        self.ensure_moderator(user_id, "move speakers to the audience").await?;
        tracing::info!("moving {user_id} to the audience");
        self.directory
            .demote_to_listener(&self.current_user.id, user_id, &self.room_id)
            .await
    }

    async fn ensure_moderator(&self, target_id: &str, action: &'static str) -> Result<(), RoomError> {
        let state = self.state.lock().await;
        let Some(room) = state.room.as_ref() else {
            return Err(RoomError::NotHost(action));
        };
        if !room.is_host(&self.current_user.id) {
            return Err(RoomError::NotHost(action));
        }
        if !can_moderate(room, &self.current_user.id, target_id) {
            return Err(RoomError::InvalidAction(format!(
                "{action}: the host cannot target themselves"
            )));
        }
        Ok(())
    }

    /// Close the room for everyone, then leave the screen. Host only.
    pub async fn end_room(&self) -> Result<(), RoomError> {
        if !self.is_host().await {
            return Err(RoomError::NotHost("end the room"));
        }
        tracing::info!("ending room {}", self.room_id);
        let result = self
            .directory
            .end_room(&self.current_user.id, &self.room_id)
            .await;
        self.exit().await;
        result
    }

    /// Leave the screen. A host leaving ends the room first.
    pub async fn leave(&self) -> Result<(), RoomError> {
        if self.is_host().await {
            return self.end_room().await;
        }
        self.exit().await;
        Ok(())
    }

    pub async fn toggle_chat(&self) -> bool {
        self.chat.toggle().await
    }

    pub async fn set_draft(&self, text: &str) {
        self.chat.set_draft(text).await;
    }

    /// Send `text` tagged with the sender's current host/speaker status.
    ///
    /// Returns `Ok(false)` without calling the directory when the trimmed
    /// text is empty or no snapshot has arrived yet.
    pub async fn send_message(&self, text: &str) -> Result<bool, RoomError> {
        let text = text.trim();
        let (has_room, is_host, is_speaker) = {
            let state = self.state.lock().await;
            (
                state.room.is_some(),
                state
                    .room
                    .as_ref()
                    .is_some_and(|r| r.is_host(&self.current_user.id)),
                state.is_speaker,
            )
        };
        if text.is_empty() || !has_room {
            return Ok(false);
        }

        match self
            .directory
            .send_message(&self.room_id, &self.current_user, text, is_host, is_speaker)
            .await
        {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::warn!("sending chat message: {e}");
                self.notice(format!("Could not send message: {e}"));
                Err(e)
            }
        }
    }

    /// Send the draft. It is cleared once the directory accepted it, unless
    /// it was edited while the send was in flight.
    pub async fn send_draft(&self) -> Result<bool, RoomError> {
        let draft = self.chat.draft().await;
        let sent = self.send_message(&draft).await?;
        if sent && !self.chat.clear_draft_if(&draft).await {
            tracing::debug!("draft edited while sending; kept");
        }
        Ok(sent)
    }
}
