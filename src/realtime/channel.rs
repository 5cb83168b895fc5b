//! One realtime channel: a websocket connection that joins a single topic,
//! keeps it alive with heartbeats and forwards `postgres_changes` to a
//! callback. Reconnects with exponential backoff until told to stop.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};
use url::Url;

use super::events::{ChangeTarget, RawChange};
use super::protocol::{
    PhoenixMessage, EVENT_CLOSE, EVENT_ERROR, EVENT_POSTGRES_CHANGES, EVENT_SYSTEM,
};

/// Receives every change delivered on a channel.
pub type ChangeCallback = Arc<dyn Fn(RawChange) + Send + Sync>;

/// Subscription state of a channel as last reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Joining,
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelStatus::Joining => "JOINING",
            ChannelStatus::Subscribed => "SUBSCRIBED",
            ChannelStatus::ChannelError => "CHANNEL_ERROR",
            ChannelStatus::TimedOut => "TIMED_OUT",
            ChannelStatus::Closed => "CLOSED",
        })
    }
}

/// Timing knobs shared by all channels of a client.
#[derive(Debug, Clone, Copy)]
pub struct ChannelOptions {
    pub heartbeat_interval: Duration,
    pub join_timeout: Duration,
    /// Upper bound for a channel teardown
    pub shutdown_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        ChannelOptions {
            heartbeat_interval: Duration::from_secs(25),
            join_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

pub(crate) struct ChannelTask {
    pub name: String,
    pub socket_url: Url,
    pub access_token: String,
    pub target: ChangeTarget,
    pub callback: ChangeCallback,
    pub options: ChannelOptions,
    pub status: watch::Sender<ChannelStatus>,
}

enum SessionEnd {
    /// Shutdown requested; leave was sent.
    Stopped,
    /// Connection lost or channel rejected; `joined` tells whether the join
    /// had succeeded before that.
    Disconnected { joined: bool },
}

impl ChannelTask {
    fn set_status(&self, status: ChannelStatus) {
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            info!("[{}] Subscription status changed: {}", self.name, status);
        }
    }

    /// Run until `shutdown` fires (or its sender is dropped).
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut backoff_secs = 1u64;
        let max_backoff = 30u64;

        loop {
            self.set_status(ChannelStatus::Joining);
            info!(
                "[{}] Connecting to realtime: {}{}",
                self.name,
                self.socket_url.host_str().unwrap_or_default(),
                self.socket_url.path()
            );

            let connected = tokio::select! {
                res = tokio_tungstenite::connect_async(self.socket_url.as_str()) => res,
                _ = &mut shutdown => {
                    self.set_status(ChannelStatus::Closed);
                    return;
                }
            };

            match connected {
                Ok((ws_stream, _response)) => {
                    debug!("[{}] WebSocket connected", self.name);
                    let (mut write, mut read) = ws_stream.split();
                    match self.session(&mut write, &mut read, &mut shutdown).await {
                        SessionEnd::Stopped => {
                            let _ = write.close().await;
                            self.set_status(ChannelStatus::Closed);
                            info!("[{}] Channel closed", self.name);
                            return;
                        }
                        SessionEnd::Disconnected { joined } => {
                            if joined {
                                backoff_secs = 1;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("[{}] Realtime connection failed: {}", self.name, e);
                    self.set_status(ChannelStatus::ChannelError);
                }
            }

            let jitter_ms = rand::thread_rng().gen_range(0..500u64);
            let delay = Duration::from_secs(backoff_secs) + Duration::from_millis(jitter_ms);
            warn!("[{}] Reconnecting in {:?}...", self.name, delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => {
                    self.set_status(ChannelStatus::Closed);
                    return;
                }
            }
            backoff_secs = (backoff_secs * 2).min(max_backoff);
        }
    }

    async fn session<W, R>(
        &self,
        write: &mut W,
        read: &mut R,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> SessionEnd
    where
        W: Sink<Message, Error = tungstenite::Error> + Unpin,
        R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        let mut next_ref = 1u64;
        let join_ref = next_ref;
        next_ref += 1;
        let mut joined = false;
        // ref of the heartbeat still waiting for its reply
        let mut pending_heartbeat: Option<u64> = None;

        let join = PhoenixMessage::join(&self.name, &self.target, &self.access_token, join_ref);
        if let Err(e) = write.send(Message::Text(join.to_text())).await {
            error!("[{}] Failed to send join: {}", self.name, e);
            return SessionEnd::Disconnected { joined };
        }
        debug!(
            "[{}] Join sent for {} events on {}.{}",
            self.name,
            self.target.event.as_str(),
            self.target.schema,
            self.target.table
        );

        let join_deadline = Instant::now() + self.options.join_timeout;
        let hb = self.options.heartbeat_interval;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + hb, hb);

        loop {
            tokio::select! {
                _ = &mut *shutdown => {
                    let leave = PhoenixMessage::leave(&self.name, next_ref, join_ref);
                    if let Err(e) = write.send(Message::Text(leave.to_text())).await {
                        warn!("[{}] Failed to send leave: {}", self.name, e);
                    }
                    return SessionEnd::Stopped;
                }
                _ = tokio::time::sleep_until(join_deadline), if !joined => {
                    error!(
                        "[{}] Subscription timed out after {:?}",
                        self.name, self.options.join_timeout
                    );
                    self.set_status(ChannelStatus::TimedOut);
                    return SessionEnd::Disconnected { joined };
                }
                _ = heartbeat.tick() => {
                    if let Some(unanswered) = pending_heartbeat {
                        error!(
                            "[{}] Heartbeat {} not answered within {:?}, reconnecting",
                            self.name, unanswered, hb
                        );
                        return SessionEnd::Disconnected { joined };
                    }
                    let msg = PhoenixMessage::heartbeat(next_ref);
                    pending_heartbeat = Some(next_ref);
                    next_ref += 1;
                    if let Err(e) = write.send(Message::Text(msg.to_text())).await {
                        error!("[{}] Heartbeat failed: {}", self.name, e);
                        return SessionEnd::Disconnected { joined };
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let frame: PhoenixMessage = match serde_json::from_str(&text) {
                                Ok(f) => f,
                                Err(e) => {
                                    warn!("[{}] Ignoring undecodable frame: {}", self.name, e);
                                    continue;
                                }
                            };
                            if let Some(end) =
                                self.handle_frame(frame, join_ref, &mut joined, &mut pending_heartbeat)
                            {
                                return end;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("[{}] Server closed WebSocket", self.name);
                            return SessionEnd::Disconnected { joined };
                        }
                        Some(Err(e)) => {
                            error!("[{}] WebSocket error: {}", self.name, e);
                            return SessionEnd::Disconnected { joined };
                        }
                        None => {
                            warn!("[{}] WebSocket stream ended", self.name);
                            return SessionEnd::Disconnected { joined };
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// React to one decoded frame; `Some` ends the session.
    fn handle_frame(
        &self,
        frame: PhoenixMessage,
        join_ref: u64,
        joined: &mut bool,
        pending_heartbeat: &mut Option<u64>,
    ) -> Option<SessionEnd> {
        if frame.topic == "phoenix" {
            if pending_heartbeat.is_some_and(|r| frame.is_reply_to(r)) {
                *pending_heartbeat = None;
            }
            return None;
        }

        if frame.is_reply_to(join_ref) {
            return match frame.reply_status() {
                Some("ok") => {
                    *joined = true;
                    self.set_status(ChannelStatus::Subscribed);
                    info!(
                        "[{}] Successfully subscribed, listening for {} events on {}.{}",
                        self.name,
                        self.target.event.as_str(),
                        self.target.schema,
                        self.target.table
                    );
                    None
                }
                status => {
                    error!(
                        "[{}] Error subscribing to channel (status {:?}): {}",
                        self.name,
                        status,
                        frame.payload.get("response").cloned().unwrap_or_default()
                    );
                    self.set_status(ChannelStatus::ChannelError);
                    Some(SessionEnd::Disconnected { joined: *joined })
                }
            };
        }

        match frame.event.as_str() {
            EVENT_POSTGRES_CHANGES => {
                let Some(raw) = frame
                    .payload
                    .get("data")
                    .and_then(RawChange::from_realtime)
                else {
                    warn!("[{}] postgres_changes frame without usable data", self.name);
                    return None;
                };
                info!(
                    "[{}] Change received: {} on {}.{} (committed {})",
                    self.name,
                    raw.event_type,
                    raw.schema,
                    raw.table,
                    raw.committed_at()
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "-".to_string())
                );
                debug!("[{}] Full payload: {}", self.name, frame.payload);
                (self.callback)(raw);
                None
            }
            EVENT_SYSTEM => {
                let status = frame.payload.get("status").and_then(|s| s.as_str());
                let message = frame
                    .payload
                    .get("message")
                    .and_then(|s| s.as_str())
                    .unwrap_or_default();
                if status == Some("error") {
                    warn!("[{}] System error: {}", self.name, message);
                    self.set_status(ChannelStatus::ChannelError);
                } else {
                    debug!("[{}] System: {}", self.name, message);
                }
                None
            }
            EVENT_ERROR => {
                error!("[{}] Channel error from server", self.name);
                self.set_status(ChannelStatus::ChannelError);
                Some(SessionEnd::Disconnected { joined: *joined })
            }
            EVENT_CLOSE => {
                warn!("[{}] Channel closed by server", self.name);
                self.set_status(ChannelStatus::Closed);
                Some(SessionEnd::Disconnected { joined: *joined })
            }
            other => {
                debug!("[{}] Ignoring '{}' frame", self.name, other);
                None
            }
        }
    }
}
