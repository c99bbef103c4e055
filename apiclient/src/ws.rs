// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The push channel: a websocket delivering typed [`PushEvent`]s, with
//! client control frames and exponential-backoff reconnection (base 1 s,
//! factor 2, capped at 2^5 × base, at most 10 attempts).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use loomcommon::messages::push::{PushControl, PushEvent};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::sleep,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::ApiClient;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_MAX_EXPONENT: u32 = 5;
const MAX_ATTEMPTS: u32 = 10;
const EVENT_CHANNEL_SIZE: usize = 256;
const CONTROL_CHANNEL_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum PushChannelError {
    #[error("malformed websocket url")]
    WrongUrl,
    #[error("push channel closed")]
    Closed,
}

/// Connection lifecycle and payload events surfaced to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum PushChannelEvent {
    Connected,
    Disconnected,
    Event(PushEvent),
}

/// Handle to the push channel task.
pub struct PushChannel {
    rx: broadcast::Receiver<PushChannelEvent>,
    tx: broadcast::Sender<PushChannelEvent>,
    control: mpsc::Sender<PushControl>,
    handle: JoinHandle<()>,
}

impl PushChannel {
    /// Next event; `None` once the channel task has ended.
    pub async fn next(&mut self) -> Option<PushChannelEvent> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("push channel lagged by {n} events");
                self.rx.recv().await.ok()
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushChannelEvent> {
        self.tx.subscribe()
    }

    /// Sends a control frame (stream/subscribe requests) to the server.
    pub async fn send_control(&self, control: PushControl) -> Result<(), PushChannelError> {
        self.control
            .send(control)
            .await
            .map_err(|_| PushChannelError::Closed)
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl ApiClient {
    /// Opens the push channel. The task reconnects with exponential
    /// backoff; after [`MAX_ATTEMPTS`] consecutive failures it gives up
    /// and the event stream ends.
    pub fn spawn_push_channel(&self) -> Result<PushChannel, PushChannelError> {
        let url = push_url(self.base_url())?;
        let token = self.auth_token();
        let (tx, rx) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (control_tx, mut control_rx) = mpsc::channel::<PushControl>(CONTROL_CHANNEL_SIZE);
        let task_tx = tx.clone();

        let handle = tokio::spawn(async move {
            let mut attempts: u32 = 0;
            loop {
                let request = match build_request(&url, token.as_deref()) {
                    Ok(request) => request,
                    Err(_) => {
                        error!("could not build websocket request");
                        break;
                    }
                };
                match connect_async(request).await {
                    Ok((stream, _)) => {
                        info!("push channel connected");
                        attempts = 0;
                        let _ = task_tx.send(PushChannelEvent::Connected);
                        handle_connection(stream, &task_tx, &mut control_rx).await;
                        let _ = task_tx.send(PushChannelEvent::Disconnected);
                    }
                    Err(e) => {
                        warn!(error = %e, attempts, "push channel connect failed");
                    }
                }
                attempts += 1;
                if attempts >= MAX_ATTEMPTS {
                    error!("push channel giving up after {attempts} attempts");
                    break;
                }
                let exponent = (attempts - 1).min(BACKOFF_MAX_EXPONENT);
                let delay = BACKOFF_BASE * 2u32.pow(exponent);
                debug!(?delay, "push channel reconnecting");
                sleep(delay).await;
            }
        });

        Ok(PushChannel {
            rx,
            tx,
            control: control_tx,
            handle,
        })
    }

    fn auth_token(&self) -> Option<String> {
        self.auth_provider().bearer_token()
    }
}

async fn handle_connection(
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    tx: &broadcast::Sender<PushChannelEvent>,
    control_rx: &mut mpsc::Receiver<PushControl>,
) {
    let (mut sink, mut source) = stream.split();
    loop {
        tokio::select! {
            control = control_rx.recv() => {
                let Some(control) = control else {
                    // All senders dropped; close the connection.
                    let _ = sink.close().await;
                    return;
                };
                match serde_json::to_string(&control) {
                    Ok(frame) => {
                        if sink.send(Message::Text(frame.into())).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => error!(error = %e, "could not serialize control frame"),
                }
            }
            message = source.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PushEvent>(&text) {
                            Ok(event) => {
                                if tx.send(PushChannelEvent::Event(event)).is_err() {
                                    // No subscribers left.
                                    let _ = sink.close().await;
                                    return;
                                }
                            }
                            Err(e) => warn!(error = %e, "unparseable push event"),
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "push channel receive error");
                        return;
                    }
                }
            }
        }
    }
}

fn push_url(base: &Url) -> Result<Url, PushChannelError> {
    let mut url = base.join("push").map_err(|_| PushChannelError::WrongUrl)?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => other,
    }
    .to_string();
    url.set_scheme(&scheme)
        .map_err(|_| PushChannelError::WrongUrl)?;
    Ok(url)
}

fn build_request(
    url: &Url,
    token: Option<&str>,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, PushChannelError> {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|_| PushChannelError::WrongUrl)?;
    if let Some(token) = token {
        let value = format!("Bearer {token}")
            .parse()
            .map_err(|_| PushChannelError::WrongUrl)?;
        request.headers_mut().insert("Authorization", value);
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_url_switches_scheme() {
        let base = Url::parse("https://logs.example.com/").unwrap();
        assert_eq!(push_url(&base).unwrap().as_str(), "wss://logs.example.com/push");
        let base = Url::parse("http://localhost:9420/").unwrap();
        assert_eq!(push_url(&base).unwrap().as_str(), "ws://localhost:9420/push");
    }

    #[test]
    fn backoff_schedule_is_capped() {
        let delays: Vec<u64> = (1..MAX_ATTEMPTS)
            .map(|attempts| {
                let exponent = (attempts - 1).min(BACKOFF_MAX_EXPONENT);
                (BACKOFF_BASE * 2u32.pow(exponent)).as_secs()
            })
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 32, 32, 32]);
    }
}
