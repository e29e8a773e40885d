//! The persistent event stream: a WebSocket connection with transparent
//! reconnect, falling back to polling `GET /channels` and synthesising
//! begin/end events by set difference if the stream is unavailable at all
//! (spec.md §4.2, §9 "Ambiguities worth flagging").

use super::model::{ChannelObject, EngineEvent};
use crate::config::EventAuthStyle;
use crate::constants::{EVENT_STREAM_GRACE, POLL_FALLBACK_INTERVAL};
use crate::retry::{ExponentialBackoff, Strategy};
use futures::StreamExt;
use std::collections::HashSet;
use std::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct EventStreamConfig {
    pub ws_url: String,
    pub list_channels_url: String,
    pub auth_style: EventAuthStyle,
    pub user: String,
    pub pass: String,
}

/// Spawns the background event-stream task and returns the receiving end.
pub fn spawn(http: reqwest::Client, config: EventStreamConfig) -> flume::Receiver<EngineEvent> {
    let (tx, rx) = flume::unbounded();
    tokio::spawn(run(http, config, tx));
    rx
}

async fn run(http: reqwest::Client, config: EventStreamConfig, tx: flume::Sender<EngineEvent>) {
    match connect_and_stream(&config, &tx).await {
        Ok(()) => return, // sender dropped; nobody is listening anymore.
        Err(e) => {
            warn!(error = %e, "event stream unavailable, falling back to polling");
        },
    }

    // Polling is sticky for the remainder of the process lifetime: once the
    // stream proves unusable (absent entirely, or disconnected past the
    // grace window), it is not retried. `run_polling` only returns once the
    // receiver has gone away.
    run_polling(&http, &config, &tx).await;
}

/// Connects the WebSocket and forwards events until the connection drops or
/// is lost, retrying indefinitely with backoff in between. Returns `Ok(())`
/// only when the receiving end has gone away (clean shutdown). Propagates an
/// error — triggering a permanent fall back to polling — either when the
/// very first connect attempt fails, or when the stream stays disconnected
/// for longer than the configured grace window.
async fn connect_and_stream(
    config: &EventStreamConfig,
    tx: &flume::Sender<EngineEvent>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let backoff = ExponentialBackoff::default();
    let mut last_wait = None;
    let mut ever_connected = false;
    let mut disconnected_since: Option<Instant> = None;

    loop {
        match connect_once(config).await {
            Ok(mut stream) => {
                ever_connected = true;
                disconnected_since = None;
                info!("connected to engine event stream");
                loop {
                    match stream.next().await {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<EngineEvent>(&text) {
                                Ok(event) => {
                                    if tx.send(event).is_err() {
                                        return Ok(());
                                    }
                                },
                                Err(e) => debug!(error = %e, "unparsable event payload"),
                            }
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {},
                        Some(Err(e)) => {
                            warn!(error = %e, "event stream transport error, reconnecting");
                            break;
                        },
                    }
                }
                disconnected_since = Some(Instant::now());
                last_wait = None;
            },
            Err(e) => {
                if !ever_connected {
                    return Err(e);
                }

                let since = *disconnected_since.get_or_insert_with(Instant::now);
                if since.elapsed() > EVENT_STREAM_GRACE {
                    warn!(error = %e, "event stream unavailable past grace window, falling back to polling");
                    return Err(e);
                }

                warn!(error = %e, "failed to reconnect to event stream, retrying");
            },
        }

        let wait = Strategy::Backoff(backoff).retry_in(last_wait);
        last_wait = Some(wait);
        tokio::time::sleep(wait).await;
    }
}

async fn connect_once(
    config: &EventStreamConfig,
) -> Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    tokio_tungstenite::tungstenite::Error,
> {
    let url = match config.auth_style {
        EventAuthStyle::QueryString => format!(
            "{}?api_key={}:{}",
            config.ws_url, config.user, config.pass
        ),
        EventAuthStyle::Header => config.ws_url.clone(),
    };

    let mut request = url.into_client_request()?;

    if config.auth_style == EventAuthStyle::Header {
        let token = base64_basic(&config.user, &config.pass);
        request
            .headers_mut()
            .insert(AUTHORIZATION, format!("Basic {token}").parse().unwrap());
    }

    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}

fn base64_basic(user: &str, pass: &str) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"))
}

/// Polls `GET /channels` on a short cadence, diffing the returned id set
/// against a locally remembered active set to synthesise begin/end events.
/// Returns once the receiver has gone away.
async fn run_polling(http: &reqwest::Client, config: &EventStreamConfig, tx: &flume::Sender<EngineEvent>) {
    let mut known: HashSet<String> = HashSet::new();

    loop {
        match http
            .get(&config.list_channels_url)
            .basic_auth(&config.user, Some(&config.pass))
            .send()
            .await
            .and_then(|r| r.error_for_status())
        {
            Ok(resp) => match resp.json::<Vec<ChannelObject>>().await {
                Ok(channels) => {
                    let current: HashSet<String> = channels.iter().map(|c| c.id.clone()).collect();

                    for id in current.difference(&known) {
                        let event = EngineEvent::CallBegin {
                            channel: ChannelObject { id: id.clone(), name: None },
                        };
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                    for id in known.difference(&current) {
                        let event = EngineEvent::CallEnd {
                            channel: ChannelObject { id: id.clone(), name: None },
                        };
                        if tx.send(event).is_err() {
                            return;
                        }
                    }

                    known = current;
                },
                Err(e) => debug!(error = %e, "failed to parse channel list"),
            },
            Err(e) => debug!(error = %e, "failed to poll channel list"),
        }

        tokio::time::sleep(POLL_FALLBACK_INTERVAL).await;
    }
}
