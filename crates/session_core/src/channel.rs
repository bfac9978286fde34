use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use shared::domain::MessageKind;
use shared::protocol::KEEPALIVE_PROBE;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::classifier::{classify_frame, Classified};
use crate::state::ConnectionPhase;
use crate::SessionClient;

/// Fixed delay before the single scheduled reconnect attempt. Intentionally
/// not exponential; observable reconnection timing is part of the contract.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);
/// Liveness probe interval while connected, to survive idle-timeout
/// intermediaries.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

impl SessionClient {
    /// Open the event channel. Idempotent: a call while the channel task is
    /// alive is a no-op, so repeated calls never stack connection attempts.
    /// The task itself reconnects forever; only [`SessionClient::shutdown`]
    /// ends it.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        let ws_url = derive_ws_url(&self.backend_url)?;

        let mut task = self.channel_task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let client = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            client.run_channel(ws_url).await;
        }));
        Ok(())
    }

    /// Tear the channel down: cancels the keepalive, drops the connection
    /// and does not schedule a reconnect.
    pub async fn shutdown(&self) {
        let handle = { self.channel_task.lock().await.take() };
        if let Some(handle) = handle {
            handle.abort();
        }
        self.set_phase(ConnectionPhase::Disconnected).await;
    }

    /// Connect/read/reconnect loop. One iteration per connection lifetime,
    /// so a close always schedules exactly one reconnect attempt and
    /// attempts can never pile up. Connection errors are not fatal; they
    /// resolve to `disconnected` plus the fixed-delay retry.
    async fn run_channel(self: Arc<Self>, ws_url: String) {
        loop {
            self.set_phase(ConnectionPhase::Connecting).await;
            match connect_async(&ws_url).await {
                Ok((stream, _)) => {
                    info!(url = %ws_url, "event channel connected");
                    self.set_phase(ConnectionPhase::Connected).await;
                    self.push_message(MessageKind::System, "Connected to backend")
                        .await;
                    self.pump_frames(stream).await;
                }
                Err(err) => {
                    warn!(url = %ws_url, "event channel connect failed: {err}");
                }
            }
            self.set_phase(ConnectionPhase::Disconnected).await;
            self.push_message(MessageKind::System, "Disconnected from backend, retrying...")
                .await;
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// Read frames until the connection dies, probing for liveness on the
    /// keepalive interval. A failed probe counts as a close.
    async fn pump_frames(&self, stream: WsStream) {
        let (mut writer, mut reader) = stream.split();
        let mut keepalive = tokio::time::interval(self.keepalive_interval);
        // The interval's first tick completes immediately; skip it so the
        // first probe goes out one full interval after connect.
        keepalive.reset();

        loop {
            tokio::select! {
                frame = reader.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.apply_frame(&text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!("event channel receive failed: {err}");
                        break;
                    }
                },
                _ = keepalive.tick() => {
                    if let Err(err) = writer.send(Message::Text(KEEPALIVE_PROBE.to_string())).await {
                        warn!("keepalive probe failed: {err}");
                        break;
                    }
                }
            }
        }
    }

    /// Fold one classified frame into session state. Frames are applied in
    /// arrival order; only `status` frames bypass the transcript.
    pub(crate) async fn apply_frame(&self, raw: &str) {
        match classify_frame(raw) {
            Classified::Status {
                is_running: Some(false),
            } => {
                debug!("status frame reported not running");
                self.set_running(false).await;
            }
            Classified::Status { .. } => {}
            Classified::Entry { kind, content } => self.push_message(kind, content).await,
        }
    }
}

fn derive_ws_url(backend_url: &str) -> Result<String> {
    let ws_base = if let Some(rest) = backend_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = backend_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(anyhow!("backend url must start with http:// or https://"));
    };
    Ok(format!("{}/ws", ws_base.trim_end_matches('/')))
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod channel_tests;
