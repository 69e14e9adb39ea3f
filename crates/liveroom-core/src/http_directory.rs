use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;

use crate::directory::RoomDirectory;
use crate::errors::RoomError;
use crate::models::{Message, Room, RoomUpdate, User};
use crate::settings::Settings;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MemberRequest<'a> {
    user_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HostRequest<'a> {
    host_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InviteRequest<'a> {
    inviter_id: &'a str,
    user_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DemoteRequest<'a> {
    demoter_id: &'a str,
    user_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    id: String,
    sender: &'a User,
    text: &'a str,
    is_host: bool,
    is_speaker: bool,
}

/// [`RoomDirectory`] over the room service's JSON API.
///
/// The API has no push channel, so subscriptions poll and forward a value
/// only when it differs from the previous one.
#[derive(Clone)]
pub struct HttpDirectory {
    base: Url,
    http: reqwest::Client,
    poll_interval: Duration,
}

impl HttpDirectory {
    pub fn new(base_url: &str, poll_interval: Duration) -> Result<Self, RoomError> {
        Ok(Self {
            base: Self::parse_base_url(base_url)?,
            http: reqwest::Client::new(),
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, RoomError> {
        let base = settings
            .directory_url
            .as_deref()
            .ok_or_else(|| RoomError::Config("directory url is not configured".into()))?;
        Self::new(base, Duration::from_millis(settings.poll_interval_ms))
    }

    /// Parse the API root, forcing a trailing slash so relative joins nest
    /// under it instead of replacing its last segment.
    fn parse_base_url(base_url: &str) -> Result<Url, RoomError> {
        let trimmed = base_url.trim();
        let with_slash = if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };
        let url = Url::parse(&with_slash)
            .map_err(|e| RoomError::InvalidUrl(format!("'{trimmed}': {e}")))?;
        if url.cannot_be_a_base() {
            return Err(RoomError::InvalidUrl(format!("'{trimmed}' cannot be a base")));
        }
        Ok(url)
    }

    fn room_url(&self, room_id: &str, action: Option<&str>) -> Result<Url, RoomError> {
        let mut path = format!("rooms/{}", urlencoding::encode(room_id));
        if let Some(action) = action {
            path.push('/');
            path.push_str(action);
        }
        self.base
            .join(&path)
            .map_err(|e| RoomError::InvalidUrl(e.to_string()))
    }

    async fn post<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> Result<(), RoomError> {
        tracing::debug!("POST {url}");
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| RoomError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RoomError::Directory(format!(
                "room service returned status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// `Ok(None)` on 404.
    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, RoomError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RoomError::Http(e.to_string()))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(RoomError::Directory(format!(
                "room service returned status {}",
                resp.status()
            )));
        }
        resp.json()
            .await
            .map(Some)
            .map_err(|e| RoomError::Directory(format!("invalid room service response: {e}")))
    }

    async fn poll_room(self, url: Url, tx: mpsc::UnboundedSender<RoomUpdate>) {
        let mut last: Option<Room> = None;
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }
            match self.get::<Room>(url.clone()).await {
                Ok(Some(room)) => {
                    if last.as_ref() != Some(&room) {
                        last = Some(room.clone());
                        if tx.send(RoomUpdate::Snapshot(room)).is_err() {
                            break;
                        }
                    }
                }
                Ok(None) => {
                    let _ = tx.send(RoomUpdate::Ended);
                    break;
                }
                Err(e) => tracing::warn!("room poll failed: {e}"),
            }
        }
        tracing::debug!("room subscription closed: {url}");
    }

    async fn poll_messages(self, url: Url, tx: mpsc::UnboundedSender<Vec<Message>>) {
        let mut last: Option<Vec<Message>> = None;
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }
            match self.get::<Vec<Message>>(url.clone()).await {
                Ok(messages) => {
                    let messages = messages.unwrap_or_default();
                    if last.as_ref() != Some(&messages) {
                        last = Some(messages.clone());
                        if tx.send(messages).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => tracing::warn!("message poll failed: {e}"),
            }
        }
        tracing::debug!("message subscription closed: {url}");
    }
}

#[async_trait]
impl RoomDirectory for HttpDirectory {
    async fn subscribe_room(
        &self,
        room_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<RoomUpdate>, RoomError> {
        let url = self.room_url(room_id, None)?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().poll_room(url, tx));
        Ok(rx)
    }

    async fn subscribe_messages(
        &self,
        room_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<Vec<Message>>, RoomError> {
        let url = self.room_url(room_id, Some("messages"))?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().poll_messages(url, tx));
        Ok(rx)
    }

    async fn join_room(&self, user_id: &str, room_id: &str) -> Result<(), RoomError> {
        self.post(self.room_url(room_id, Some("join"))?, &MemberRequest { user_id })
            .await
    }

    async fn leave_room(&self, user_id: &str, room_id: &str) -> Result<(), RoomError> {
        self.post(self.room_url(room_id, Some("leave"))?, &MemberRequest { user_id })
            .await
    }

    async fn end_room(&self, host_id: &str, room_id: &str) -> Result<(), RoomError> {
        self.post(self.room_url(room_id, Some("end"))?, &HostRequest { host_id })
            .await
    }

    async fn raise_hand(&self, user_id: &str, room_id: &str) -> Result<(), RoomError> {
        self.post(self.room_url(room_id, Some("raise-hand"))?, &MemberRequest { user_id })
            .await
    }

    async fn invite_to_speak(
        &self,
        inviter_id: &str,
        user_id: &str,
        room_id: &str,
    ) -> Result<(), RoomError> {
        self.post(
            self.room_url(room_id, Some("invite"))?,
            &InviteRequest { inviter_id, user_id },
        )
        .await
    }

    async fn demote_to_listener(
        &self,
        demoter_id: &str,
        user_id: &str,
        room_id: &str,
    ) -> Result<(), RoomError> {
        self.post(
            self.room_url(room_id, Some("demote"))?,
            &DemoteRequest { demoter_id, user_id },
        )
        .await
    }

    async fn send_message(
        &self,
        room_id: &str,
        sender: &User,
        text: &str,
        is_host: bool,
        is_speaker: bool,
    ) -> Result<(), RoomError> {
        let body = SendMessageRequest {
            id: uuid::Uuid::new_v4().to_string(),
            sender,
            text,
            is_host,
            is_speaker,
        };
        self.post(self.room_url(room_id, Some("messages"))?, &body)
            .await
    }

    async fn transport_token(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<String>, RoomError> {
        let mut url = self.room_url(room_id, Some("token"))?;
        url.query_pairs_mut().append_pair("userId", user_id);
        tracing::info!("requesting transport token for room {room_id}");
        let resp: Option<TokenResponse> = self.get(url).await?;
        Ok(resp
            .and_then(|r| r.token)
            .filter(|token| !token.is_empty()))
    }
}
