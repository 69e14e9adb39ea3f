use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::speaker::AUDIBLE_THRESHOLD;

/// What a user's microphone does when they are moved onto the stage.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerMutePolicy {
    /// Always open the microphone on promotion.
    #[default]
    Unmute,
    /// Restore the last mute choice made while on stage (open if none).
    PreserveLastChoice,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    /// Application id (LiveKit: server URL) handed to the transport on join.
    #[serde(default)]
    pub transport_app_id: Option<String>,
    /// Base URL of the room directory HTTP API.
    #[serde(default)]
    pub directory_url: Option<String>,
    #[serde(default = "default_threshold")]
    pub active_speaker_threshold: u32,
    #[serde(default)]
    pub speaker_mute_policy: SpeakerMutePolicy,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_threshold() -> u32 {
    AUDIBLE_THRESHOLD
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            transport_app_id: None,
            directory_url: None,
            active_speaker_threshold: AUDIBLE_THRESHOLD,
            speaker_mute_policy: SpeakerMutePolicy::default(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Settings {
    /// The transport app id, if present and not blank.
    pub fn app_id(&self) -> Option<&str> {
        self.transport_app_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

pub struct SettingsStore {
    settings: Mutex<Settings>,
    file_path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let file_path = data_dir.as_ref().join("settings.json");
        let settings = Self::load(&file_path);
        Self {
            settings: Mutex::new(settings),
            file_path,
        }
    }

    pub fn get(&self) -> Settings {
        self.lock().clone()
    }

    pub fn set_transport_app_id(&self, app_id: Option<String>) {
        self.lock().transport_app_id = app_id;
        self.save();
    }

    pub fn set_directory_url(&self, url: Option<String>) {
        self.lock().directory_url = url;
        self.save();
    }

    pub fn set_active_speaker_threshold(&self, threshold: u32) {
        self.lock().active_speaker_threshold = threshold;
        self.save();
    }

    pub fn set_speaker_mute_policy(&self, policy: SpeakerMutePolicy) {
        self.lock().speaker_mute_policy = policy;
        self.save();
    }

    pub fn set_poll_interval_ms(&self, interval_ms: u64) {
        self.lock().poll_interval_ms = interval_ms;
        self.save();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self) {
        let settings = self.get();
        if let Some(parent) = self.file_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&settings) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.file_path, json) {
                    tracing::warn!("failed to write {}: {e}", self.file_path.display());
                }
            }
            Err(e) => tracing::warn!("failed to serialize settings: {e}"),
        }
    }

    fn load(path: &Path) -> Settings {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable {}: {e}", path.display());
                Settings::default()
            }),
            Err(_) => Settings::default(),
        }
    }
}
