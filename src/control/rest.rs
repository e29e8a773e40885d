//! REST + WebSocket implementation of [`ControlClient`] against an
//! ARI-style telephony engine control surface (spec.md §6).

use super::error::{ControlError, ControlResult};
use super::events::{self, EventStreamConfig};
use super::model::{AddChannelRequest, BridgeObject, ChannelObject, CreateBridgeRequest, EngineEvent, LookupResult};
use super::{ControlClient, MirrorSpec};
use crate::config::{Config, ExternalMediaStyle};
use crate::constants::{ANSWER_RETRY_BACKOFF, ANSWER_RETRY_LIMIT, CONTROL_REQUEST_TIMEOUT};
use crate::retry::Strategy;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::net::SocketAddr;
use tracing::warn;

pub struct AriControlClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    pass: String,
    app_name: String,
    external_media_style: ExternalMediaStyle,
    events_rx: flume::Receiver<EngineEvent>,
}

impl AriControlClient {
    pub fn new(config: &Config) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(CONTROL_REQUEST_TIMEOUT)
            .build()?;

        let base_url = format!("http://{}", config.engine_url);
        let ws_url = format!("ws://{}/events", config.engine_url);

        let events_rx = events::spawn(
            http.clone(),
            EventStreamConfig {
                ws_url,
                list_channels_url: format!("{base_url}/channels"),
                auth_style: config.event_auth_style,
                user: config.engine_user.clone(),
                pass: config.engine_pass.clone(),
            },
        );

        Ok(Self {
            http,
            base_url,
            user: config.engine_user.clone(),
            pass: config.engine_pass.clone(),
            app_name: config.app_name.clone(),
            external_media_style: config.external_media_style,
            events_rx,
        })
    }

    fn auth(&self, b: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        b.basic_auth(&self.user, Some(&self.pass))
    }

    async fn send(&self, b: reqwest::RequestBuilder) -> ControlResult<reqwest::Response> {
        let resp = self.auth(b).send().await.map_err(ControlError::from)?;

        match resp.status() {
            StatusCode::NOT_FOUND => Err(ControlError::NotFound(String::new())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ControlError::AuthError),
            s if s.is_success() => Ok(resp),
            s => Err(ControlError::ProtocolError(format!("unexpected status {s}"))),
        }
    }
}

#[async_trait]
impl ControlClient for AriControlClient {
    async fn answer(&self, channel_id: &str) -> ControlResult<()> {
        let url = format!("{}/channels/{channel_id}/answer", self.base_url);
        let mut last_wait = None;

        for attempt in 0..=ANSWER_RETRY_LIMIT {
            match self.send(self.http.post(&url)).await {
                Ok(_) => return Ok(()),
                Err(ControlError::NotFound(_)) if attempt < ANSWER_RETRY_LIMIT => {
                    let wait = Strategy::Every(ANSWER_RETRY_BACKOFF).retry_in(last_wait);
                    last_wait = Some(wait);
                    warn!(channel = %channel_id, attempt, "answer: channel not yet registered, retrying");
                    tokio::time::sleep(wait).await;
                },
                Err(e) => return Err(e),
            }
        }

        Err(ControlError::NotFound(channel_id.to_string()))
    }

    async fn create_mirror(
        &self,
        channel_id: &str,
        sink: SocketAddr,
        spec: MirrorSpec,
    ) -> ControlResult<String> {
        let direction = if spec.bidirectional { "both" } else { "out" };

        let builder = match self.external_media_style {
            ExternalMediaStyle::QueryParams => {
                let url = format!(
                    "{}/channels/externalMedia?app={}&external_host={}&format={}&direction={}&encapsulation={}&channelId={}",
                    self.base_url, self.app_name, sink, spec.codec, direction, spec.encapsulation, channel_id,
                );
                self.http.post(url)
            },
            ExternalMediaStyle::JsonBody => {
                let url = format!("{}/channels/externalMedia", self.base_url);
                self.http.post(url).json(&serde_json::json!({
                    "app": self.app_name,
                    "external_host": sink.to_string(),
                    "format": spec.codec,
                    "direction": direction,
                    "encapsulation": spec.encapsulation,
                    "channelId": channel_id,
                }))
            },
        };

        let resp = self.send(builder).await?;
        let obj: ChannelObject = resp
            .json()
            .await
            .map_err(|e| ControlError::ProtocolError(e.to_string()))?;
        Ok(obj.id)
    }

    async fn create_conference(&self) -> ControlResult<String> {
        let url = format!("{}/bridges", self.base_url);
        let resp = self
            .send(self.http.post(url).json(&CreateBridgeRequest::default()))
            .await?;
        let bridge: BridgeObject = resp
            .json()
            .await
            .map_err(|e| ControlError::ProtocolError(e.to_string()))?;
        Ok(bridge.id)
    }

    async fn attach(&self, bridge_id: &str, channel_id: &str) -> ControlResult<()> {
        let url = format!("{}/bridges/{bridge_id}/addChannel", self.base_url);
        self.send(self.http.post(url).json(&AddChannelRequest { channel: channel_id }))
            .await?;
        Ok(())
    }

    async fn hangup(&self, channel_id: &str) -> ControlResult<()> {
        let url = format!("{}/channels/{channel_id}", self.base_url);
        match self.send(self.http.delete(url)).await {
            Ok(_) | Err(ControlError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn destroy_conference(&self, bridge_id: &str) -> ControlResult<()> {
        let url = format!("{}/bridges/{bridge_id}", self.base_url);
        match self.send(self.http.delete(url)).await {
            Ok(_) | Err(ControlError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn lookup(&self, channel_id: &str) -> LookupResult {
        let url = format!("{}/channels/{channel_id}", self.base_url);
        match self.send(self.http.get(url)).await {
            Ok(_) => LookupResult::Exists,
            Err(ControlError::NotFound(_)) => LookupResult::NotFound,
            Err(_) => LookupResult::TransportError,
        }
    }

    fn events(&self) -> flume::Receiver<EngineEvent> {
        self.events_rx.clone()
    }
}
