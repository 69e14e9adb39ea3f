//! [`AudioTransport`] backed by the LiveKit Rust SDK.
//!
//! LiveKit has no app id: the `app_id` passed to [`TransportClient::join`] is
//! the server URL, and the channel and user id are carried by the token.
//! Native shells feed microphone PCM into [`LiveKitTransport::capture_source`]
//! and pull decoded room audio from [`LiveKitTransport::playout_buffer`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use futures_util::StreamExt;
use livekit::options::TrackPublishOptions;
use livekit::prelude::*;
use livekit::track::{TrackKind as LkTrackKind, TrackSource as LkTrackSource};
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::audio_stream::native::NativeAudioStream;
use livekit::webrtc::prelude::*;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::audio_playout::AudioPlayoutBuffer;
use crate::errors::RoomError;
use crate::speaker::VolumeLevel;
use crate::transport::{
    AudioTransport, ClientConfig, MediaKind, MicTrack, RemoteUser, TransportClient,
    TransportEvent,
};

const AUDIO_QUEUE_SIZE_MS: u32 = 100;

type Handler = Arc<StdMutex<Option<mpsc::UnboundedSender<TransportEvent>>>>;
type SharedRoom = Arc<Mutex<Option<Arc<Room>>>>;

pub struct LiveKitTransport {
    playout_buffer: Arc<AudioPlayoutBuffer>,
    capture_source: Arc<StdMutex<Option<NativeAudioSource>>>,
}

impl LiveKitTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            playout_buffer: Arc::new(AudioPlayoutBuffer::new(config.sample_rate, config.channels)),
            capture_source: Arc::new(StdMutex::new(None)),
        }
    }

    /// Decoded audio of every subscribed remote speaker.
    pub fn playout_buffer(&self) -> Arc<AudioPlayoutBuffer> {
        self.playout_buffer.clone()
    }

    /// Source of the most recently created microphone track, `None` after
    /// the client leaves.
    pub fn capture_source(&self) -> Option<NativeAudioSource> {
        self.capture_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AudioTransport for LiveKitTransport {
    fn create_client(&self, config: &ClientConfig) -> Arc<dyn TransportClient> {
        Arc::new(LiveKitClient {
            config: config.clone(),
            room: Arc::new(Mutex::new(None)),
            tracks: StdMutex::new(HashMap::new()),
            handler: Arc::new(StdMutex::new(None)),
            volume_indicator: Arc::new(AtomicBool::new(false)),
            playout_buffer: self.playout_buffer.clone(),
            capture_source: self.capture_source.clone(),
            pump: StdMutex::new(None),
        })
    }
}

pub struct LiveKitClient {
    config: ClientConfig,
    room: SharedRoom,
    tracks: StdMutex<HashMap<String, Arc<LiveKitMicTrack>>>,
    handler: Handler,
    volume_indicator: Arc<AtomicBool>,
    playout_buffer: Arc<AudioPlayoutBuffer>,
    capture_source: Arc<StdMutex<Option<NativeAudioSource>>>,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

fn dispatch(handler: &Handler, event: TransportEvent) {
    let handler = handler.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(tx) = handler.as_ref() {
        let _ = tx.send(event);
    }
}

fn lk_kind(kind: LkTrackKind) -> MediaKind {
    match kind {
        LkTrackKind::Audio => MediaKind::Audio,
        LkTrackKind::Video => MediaKind::Video,
    }
}

impl LiveKitClient {
    async fn connected_room(&self) -> Result<Arc<Room>, RoomError> {
        self.room
            .lock()
            .await
            .clone()
            .ok_or_else(|| RoomError::Transport("not joined".into()))
    }

    /// Announce publications that existed before we joined.
    fn announce_existing(&self, room: &Room) {
        for participant in room.remote_participants().values() {
            for publication in participant.track_publications().values() {
                dispatch(
                    &self.handler,
                    TransportEvent::UserPublished {
                        user: RemoteUser {
                            uid: participant.identity().to_string(),
                        },
                        kind: lk_kind(publication.kind()),
                    },
                );
            }
        }
    }

    async fn event_pump(
        mut events: mpsc::UnboundedReceiver<RoomEvent>,
        handler: Handler,
        volume_indicator: Arc<AtomicBool>,
        playout_buffer: Arc<AudioPlayoutBuffer>,
        sample_rate: u32,
        channels: u32,
    ) {
        let mut playout_tasks: HashMap<String, JoinHandle<()>> = HashMap::new();

        while let Some(event) = events.recv().await {
            match event {
                RoomEvent::TrackPublished { publication, participant } => {
                    dispatch(
                        &handler,
                        TransportEvent::UserPublished {
                            user: RemoteUser {
                                uid: participant.identity().to_string(),
                            },
                            kind: lk_kind(publication.kind()),
                        },
                    );
                }

                RoomEvent::TrackSubscribed { track, .. } => {
                    if let RemoteTrack::Audio(audio_track) = &track {
                        let track_sid = track.sid().to_string();
                        let mut stream = NativeAudioStream::new(
                            audio_track.rtc_track(),
                            sample_rate as _,
                            channels as _,
                        );
                        let buf = playout_buffer.clone();
                        let sid = track_sid.clone();
                        let handle = tokio::spawn(async move {
                            tracing::info!("playout started for track {sid}");
                            while let Some(frame) = stream.next().await {
                                buf.push_samples(&frame.data);
                            }
                            tracing::info!("playout ended for track {sid}");
                        });
                        if let Some(old) = playout_tasks.insert(track_sid, handle) {
                            old.abort();
                        }
                    }
                }

                RoomEvent::TrackUnsubscribed { track, .. } => {
                    if let Some(handle) = playout_tasks.remove(&track.sid().to_string()) {
                        handle.abort();
                    }
                }

                RoomEvent::ActiveSpeakersChanged { speakers } => {
                    if !volume_indicator.load(Ordering::SeqCst) {
                        continue;
                    }
                    let levels = speakers
                        .iter()
                        .map(|p| VolumeLevel {
                            uid: p.identity().to_string(),
                            level: (p.audio_level().clamp(0.0, 1.0) * 100.0).round() as u32,
                        })
                        .collect();
                    dispatch(&handler, TransportEvent::VolumeIndicator(levels));
                }

                RoomEvent::Disconnected { reason } => {
                    tracing::info!("transport disconnected: {reason:?}");
                    break;
                }

                _ => {
                    tracing::trace!("unhandled transport event: {event:?}");
                }
            }
        }

        for (sid, handle) in playout_tasks.drain() {
            handle.abort();
            tracing::debug!("playout aborted for track {sid}");
        }
        playout_buffer.clear();
        tracing::info!("transport event pump ended");
    }
}

#[async_trait]
impl TransportClient for LiveKitClient {
    fn events(&self) -> mpsc::UnboundedReceiver<TransportEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    fn off_events(&self) {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn enable_volume_indicator(&self) {
        self.volume_indicator.store(true, Ordering::SeqCst);
    }

    async fn join(
        &self,
        app_id: &str,
        channel: &str,
        token: &str,
        user_id: &str,
    ) -> Result<(), RoomError> {
        tracing::info!("joining transport channel {channel} as {user_id}");

        let mut options = RoomOptions::default();
        options.auto_subscribe = false;

        let (room, events) = Room::connect(app_id, token, options)
            .await
            .map_err(|e| RoomError::Transport(format!("connect: {e}")))?;
        let room = Arc::new(room);

        *self.room.lock().await = Some(room.clone());

        let pump = tokio::spawn(Self::event_pump(
            events,
            self.handler.clone(),
            self.volume_indicator.clone(),
            self.playout_buffer.clone(),
            self.config.sample_rate,
            self.config.channels,
        ));
        if let Some(old) = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(pump)
        {
            old.abort();
        }

        self.announce_existing(&room);
        Ok(())
    }

    async fn create_mic_track(&self) -> Result<Arc<dyn MicTrack>, RoomError> {
        let source = NativeAudioSource::new(
            AudioSourceOptions {
                echo_cancellation: self.config.voice_processing,
                noise_suppression: self.config.voice_processing,
                auto_gain_control: self.config.voice_processing,
            },
            self.config.sample_rate,
            self.config.channels,
            AUDIO_QUEUE_SIZE_MS,
        );
        let track = LocalAudioTrack::create_audio_track(
            "microphone",
            RtcAudioSource::Native(source.clone()),
        );

        let mic = Arc::new(LiveKitMicTrack {
            id: uuid::Uuid::new_v4().to_string(),
            track,
            room: self.room.clone(),
            publication: Mutex::new(None),
            muted: AtomicBool::new(false),
        });

        self.tracks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(mic.id.clone(), mic.clone());
        *self
            .capture_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(source);

        tracing::info!("microphone track {} created", mic.id);
        Ok(mic)
    }

    async fn publish(&self, tracks: &[Arc<dyn MicTrack>]) -> Result<(), RoomError> {
        let room = self.connected_room().await?;

        for track in tracks {
            let mic = self
                .tracks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(track.id())
                .cloned()
                .ok_or_else(|| {
                    RoomError::Transport(format!("track {} was not created here", track.id()))
                })?;

            let publication = room
                .local_participant()
                .publish_track(
                    LocalTrack::Audio(mic.track.clone()),
                    TrackPublishOptions {
                        source: LkTrackSource::Microphone,
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| RoomError::Transport(format!("publish audio: {e}")))?;

            *mic.publication.lock().await = Some(publication);
            tracing::info!("microphone track {} published", mic.id);
        }
        Ok(())
    }

    async fn subscribe(&self, user: &RemoteUser, kind: MediaKind) -> Result<(), RoomError> {
        let room = self.connected_room().await?;
        let participant = room
            .remote_participants()
            .values()
            .find(|p| p.identity().to_string() == user.uid)
            .cloned()
            .ok_or_else(|| RoomError::Transport(format!("unknown remote user {}", user.uid)))?;

        for publication in participant.track_publications().values() {
            if lk_kind(publication.kind()) == kind {
                publication.set_subscribed(true);
            }
        }
        tracing::debug!("subscribed to {:?} of {}", kind, user.uid);
        Ok(())
    }

    async fn leave(&self) -> Result<(), RoomError> {
        let room = self.room.lock().await.take();
        self.tracks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        // The shell must stop feeding PCM once the track is gone.
        self.capture_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(room) = room {
            room.close()
                .await
                .map_err(|e| RoomError::Transport(format!("close: {e}")))?;
        }
        if let Some(pump) = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take() {
            pump.abort();
        }
        self.playout_buffer.clear();
        tracing::info!("left transport channel");
        Ok(())
    }
}

pub struct LiveKitMicTrack {
    id: String,
    track: LocalAudioTrack,
    room: SharedRoom,
    publication: Mutex<Option<LocalTrackPublication>>,
    muted: AtomicBool,
}

#[async_trait]
impl MicTrack for LiveKitMicTrack {
    fn id(&self) -> &str {
        &self.id
    }

    async fn set_muted(&self, muted: bool) -> Result<(), RoomError> {
        if muted {
            self.track.mute();
        } else {
            self.track.unmute();
        }
        self.muted.store(muted, Ordering::SeqCst);
        tracing::info!("microphone muted: {muted}");
        Ok(())
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        self.track.mute();
        self.muted.store(true, Ordering::SeqCst);
    }

    async fn close(&self) {
        let Some(publication) = self.publication.lock().await.take() else {
            return;
        };
        let room = self.room.lock().await.clone();
        if let Some(room) = room {
            if let Err(e) = room.local_participant().unpublish_track(&publication.sid()).await {
                tracing::warn!("unpublish microphone: {e}");
            }
        }
    }
}
