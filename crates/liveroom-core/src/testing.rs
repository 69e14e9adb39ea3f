//! In-memory collaborators for exercising [`crate::room::RoomScreen`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::directory::RoomDirectory;
use crate::errors::RoomError;
use crate::events::{ScreenEvent, ScreenEventListener};
use crate::models::{Message, Room, RoomUpdate, User};
use crate::transport::{
    AudioTransport, ClientConfig, MediaKind, MicTrack, RemoteUser, TransportClient, TransportEvent,
};

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        name: format!("Name {id}"),
        username: format!("user_{id}"),
        avatar_url: String::new(),
    }
}

pub fn room(host: &str, speakers: &[&str], listeners: &[&str]) -> Room {
    Room {
        id: "r1".into(),
        topic: "Friday jam".into(),
        host: user(host),
        speakers: speakers.iter().map(|id| user(id)).collect(),
        listeners: listeners.iter().map(|id| user(id)).collect(),
        raised_hands: Vec::new(),
    }
}

pub fn message(id: &str, sender: &str, text: &str) -> Message {
    Message {
        id: id.into(),
        sender: user(sender),
        text: text.into(),
        created_at: Utc.with_ymd_and_hms(2026, 5, 4, 18, 30, 0).unwrap(),
        is_host: false,
        is_speaker: false,
    }
}

/// Poll `check` until it holds, failing the test after about a second.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<ScreenEvent>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<ScreenEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn contains(&self, event: &ScreenEvent) -> bool {
        self.events.lock().unwrap().contains(event)
    }

    pub fn count(&self, event: &ScreenEvent) -> usize {
        self.events.lock().unwrap().iter().filter(|e| *e == event).count()
    }
}

impl ScreenEventListener for EventLog {
    fn on_event(&self, event: ScreenEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Holds one named collaborator step until the test releases it.
#[derive(Default)]
pub struct StepGate {
    armed: Mutex<Option<&'static str>>,
    reached: Notify,
    release: Notify,
}

impl StepGate {
    pub fn arm(&self, step: &'static str) {
        *self.armed.lock().unwrap() = Some(step);
    }

    /// Wait until the armed step is entered.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self, step: &str) {
        let hit = {
            let mut armed = self.armed.lock().unwrap();
            if *armed == Some(step) {
                armed.take();
                true
            } else {
                false
            }
        };
        if hit {
            self.reached.notify_one();
            self.release.notified().await;
        }
    }
}

// ── Directory ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryCall {
    Join(String),
    Leave(String),
    End(String),
    RaiseHand(String),
    Invite { inviter: String, user: String },
    Demote { demoter: String, user: String },
    Send {
        sender: String,
        text: String,
        is_host: bool,
        is_speaker: bool,
    },
    Token(String),
}

#[derive(Default)]
pub struct MockDirectory {
    calls: Mutex<Vec<DirectoryCall>>,
    rooms: Mutex<Option<UnboundedSender<RoomUpdate>>>,
    messages: Mutex<Option<UnboundedSender<Vec<Message>>>>,
    pub no_token: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_end: AtomicBool,
    pub gate: StepGate,
}

impl MockDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: DirectoryCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn push_room(&self, update: RoomUpdate) {
        if let Some(tx) = self.rooms.lock().unwrap().as_ref() {
            let _ = tx.send(update);
        }
    }

    pub fn push_messages(&self, messages: Vec<Message>) {
        if let Some(tx) = self.messages.lock().unwrap().as_ref() {
            let _ = tx.send(messages);
        }
    }
}

#[async_trait]
impl RoomDirectory for MockDirectory {
    async fn subscribe_room(
        &self,
        _room_id: &str,
    ) -> Result<UnboundedReceiver<RoomUpdate>, RoomError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.rooms.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn subscribe_messages(
        &self,
        _room_id: &str,
    ) -> Result<UnboundedReceiver<Vec<Message>>, RoomError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.messages.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn join_room(&self, user_id: &str, _room_id: &str) -> Result<(), RoomError> {
        self.gate.pass("join_room").await;
        self.record(DirectoryCall::Join(user_id.into()));
        Ok(())
    }

    async fn leave_room(&self, user_id: &str, _room_id: &str) -> Result<(), RoomError> {
        self.record(DirectoryCall::Leave(user_id.into()));
        Ok(())
    }

    async fn end_room(&self, host_id: &str, _room_id: &str) -> Result<(), RoomError> {
        self.record(DirectoryCall::End(host_id.into()));
        if self.fail_end.load(Ordering::SeqCst) {
            return Err(RoomError::Directory("end rejected".into()));
        }
        Ok(())
    }

    async fn raise_hand(&self, user_id: &str, _room_id: &str) -> Result<(), RoomError> {
        self.record(DirectoryCall::RaiseHand(user_id.into()));
        Ok(())
    }

    async fn invite_to_speak(
        &self,
        inviter_id: &str,
        user_id: &str,
        _room_id: &str,
    ) -> Result<(), RoomError> {
        self.record(DirectoryCall::Invite {
            inviter: inviter_id.into(),
            user: user_id.into(),
        });
        Ok(())
    }

    async fn demote_to_listener(
        &self,
        demoter_id: &str,
        user_id: &str,
        _room_id: &str,
    ) -> Result<(), RoomError> {
        self.record(DirectoryCall::Demote {
            demoter: demoter_id.into(),
            user: user_id.into(),
        });
        Ok(())
    }

    async fn send_message(
        &self,
        _room_id: &str,
        sender: &User,
        text: &str,
        is_host: bool,
        is_speaker: bool,
    ) -> Result<(), RoomError> {
        self.gate.pass("send_message").await;
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(RoomError::Http("connection reset".into()));
        }
        self.record(DirectoryCall::Send {
            sender: sender.id.clone(),
            text: text.into(),
            is_host,
            is_speaker,
        });
        Ok(())
    }

    async fn transport_token(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<String>, RoomError> {
        self.record(DirectoryCall::Token(user_id.into()));
        if self.no_token.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(format!("token-{room_id}-{user_id}")))
    }
}

// ── Transport ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Events,
    OffEvents,
    EnableVolumeIndicator,
    Join {
        app_id: String,
        channel: String,
        token: String,
        user_id: String,
    },
    CreateMicTrack,
    Publish(Vec<String>),
    Subscribe(String, MediaKind),
    Leave,
}

#[derive(Default)]
pub struct MockTransport {
    clients: Mutex<Vec<Arc<MockClient>>>,
    pub fail_publish: AtomicBool,
    pub gate: Arc<StepGate>,
}

impl MockTransport {
    /// Most recently created client.
    pub fn client(&self) -> Option<Arc<MockClient>> {
        self.clients.lock().unwrap().last().cloned()
    }
}

impl AudioTransport for MockTransport {
    fn create_client(&self, _config: &ClientConfig) -> Arc<dyn TransportClient> {
        let client = Arc::new(MockClient {
            fail_publish: self.fail_publish.load(Ordering::SeqCst),
            gate: self.gate.clone(),
            ..MockClient::default()
        });
        self.clients.lock().unwrap().push(client.clone());
        client
    }
}

#[derive(Default)]
pub struct MockClient {
    calls: Mutex<Vec<TransportCall>>,
    handler: Mutex<Option<UnboundedSender<TransportEvent>>>,
    tracks: Mutex<Vec<Arc<MockMicTrack>>>,
    next_track: AtomicUsize,
    fail_publish: bool,
    gate: Arc<StepGate>,
}

impl MockClient {
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Deliver an event to the registered handler, if any.
    pub fn emit(&self, event: TransportEvent) {
        if let Some(tx) = self.handler.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Most recently created microphone track.
    pub fn track(&self) -> Option<Arc<MockMicTrack>> {
        self.tracks.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TransportClient for MockClient {
    fn events(&self) -> UnboundedReceiver<TransportEvent> {
        self.record(TransportCall::Events);
        let (tx, rx) = mpsc::unbounded_channel();
        *self.handler.lock().unwrap() = Some(tx);
        rx
    }

    fn off_events(&self) {
        self.record(TransportCall::OffEvents);
        self.handler.lock().unwrap().take();
    }

    fn enable_volume_indicator(&self) {
        self.record(TransportCall::EnableVolumeIndicator);
    }

    async fn join(
        &self,
        app_id: &str,
        channel: &str,
        token: &str,
        user_id: &str,
    ) -> Result<(), RoomError> {
        self.record(TransportCall::Join {
            app_id: app_id.into(),
            channel: channel.into(),
            token: token.into(),
            user_id: user_id.into(),
        });
        Ok(())
    }

    async fn create_mic_track(&self) -> Result<Arc<dyn MicTrack>, RoomError> {
        self.record(TransportCall::CreateMicTrack);
        let n = self.next_track.fetch_add(1, Ordering::SeqCst) + 1;
        let track = Arc::new(MockMicTrack::new(format!("mic-{n}")));
        self.tracks.lock().unwrap().push(track.clone());
        self.gate.pass("create_mic_track").await;
        Ok(track)
    }

    async fn publish(&self, tracks: &[Arc<dyn MicTrack>]) -> Result<(), RoomError> {
        self.record(TransportCall::Publish(
            tracks.iter().map(|t| t.id().to_string()).collect(),
        ));
        self.gate.pass("publish").await;
        if self.fail_publish {
            return Err(RoomError::Transport("publish rejected".into()));
        }
        Ok(())
    }

    async fn subscribe(&self, user: &RemoteUser, kind: MediaKind) -> Result<(), RoomError> {
        self.record(TransportCall::Subscribe(user.uid.clone(), kind));
        Ok(())
    }

    async fn leave(&self) -> Result<(), RoomError> {
        self.record(TransportCall::Leave);
        Ok(())
    }
}

pub struct MockMicTrack {
    id: String,
    muted: AtomicBool,
    history: Mutex<Vec<bool>>,
    stopped: AtomicBool,
    closed: AtomicBool,
}

impl MockMicTrack {
    fn new(id: String) -> Self {
        Self {
            id,
            muted: AtomicBool::new(false),
            history: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Every value passed to `set_muted`, in order.
    pub fn history(&self) -> Vec<bool> {
        self.history.lock().unwrap().clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MicTrack for MockMicTrack {
    fn id(&self) -> &str {
        &self.id
    }

    async fn set_muted(&self, muted: bool) -> Result<(), RoomError> {
        self.muted.store(muted, Ordering::SeqCst);
        self.history.lock().unwrap().push(muted);
        Ok(())
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
