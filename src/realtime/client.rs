use std::collections::HashMap;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

use super::channel::{ChangeCallback, ChannelOptions, ChannelStatus, ChannelTask};
use super::events::ChangeTarget;
use super::protocol;

struct ChannelHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Handle returned by [`RealtimeClient::subscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    channel: String,
    status: watch::Receiver<ChannelStatus>,
}

#[allow(dead_code)]
impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn status(&self) -> ChannelStatus {
        *self.status.borrow()
    }

    /// Wait until the channel reports `wanted`. Returns `false` if the channel
    /// task went away first.
    pub async fn wait_for_status(&mut self, wanted: ChannelStatus) -> bool {
        self.status.wait_for(|s| *s == wanted).await.is_ok()
    }
}

/// Owns the realtime channels of one Supabase project, at most one per name.
pub struct RealtimeClient {
    socket_url: Url,
    access_token: String,
    options: ChannelOptions,
    channels: Mutex<HashMap<String, ChannelHandle>>,
}

impl RealtimeClient {
    /// Client for a Supabase project URL (`https://<ref>.supabase.co`).
    pub fn for_project(
        project_url: &Url,
        api_key: &str,
        options: ChannelOptions,
    ) -> anyhow::Result<Self> {
        let socket_url = protocol::socket_url(project_url, api_key)?;
        Ok(Self::new(socket_url, api_key, options))
    }

    /// Client for an explicit websocket endpoint.
    pub fn new(socket_url: Url, access_token: &str, options: ChannelOptions) -> Self {
        RealtimeClient {
            socket_url,
            access_token: access_token.to_string(),
            options,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe `callback` to changes of `target` under channel name `channel`.
    ///
    /// An existing channel with the same name is torn down first so changes
    /// are never delivered twice.
    pub async fn subscribe(
        &self,
        channel: &str,
        target: ChangeTarget,
        callback: ChangeCallback,
    ) -> Subscription {
        let mut channels = self.channels.lock().await;
        if let Some(previous) = channels.remove(channel) {
            warn!(
                "Channel '{}' already exists. Unsubscribing old channel first.",
                channel
            );
            self.teardown(channel, previous).await;
        }

        info!(
            "Setting up channel '{}' for {} events on {}.{}",
            channel,
            target.event.as_str(),
            target.schema,
            target.table
        );

        let (status_tx, status_rx) = watch::channel(ChannelStatus::Joining);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = ChannelTask {
            name: channel.to_string(),
            socket_url: self.socket_url.clone(),
            access_token: self.access_token.clone(),
            target,
            callback,
            options: self.options,
            status: status_tx,
        };
        let handle = tokio::spawn(task.run(shutdown_rx));
        channels.insert(
            channel.to_string(),
            ChannelHandle {
                shutdown: shutdown_tx,
                task: handle,
            },
        );

        Subscription {
            channel: channel.to_string(),
            status: status_rx,
        }
    }

    /// Leave and close one channel. Unknown names are logged and ignored.
    pub async fn unsubscribe(&self, channel: &str) {
        let handle = self.channels.lock().await.remove(channel);
        match handle {
            Some(handle) => {
                self.teardown(channel, handle).await;
                info!("Unsubscribed from channel: {}", channel);
            }
            None => warn!("Channel '{}' not found", channel),
        }
    }

    /// Leave and close every channel.
    pub async fn unsubscribe_all(&self) {
        let drained: Vec<(String, ChannelHandle)> =
            self.channels.lock().await.drain().collect();
        info!("Unsubscribing from {} channels...", drained.len());
        let teardowns = drained
            .into_iter()
            .map(|(name, handle)| async move { self.teardown(&name, handle).await });
        futures_util::future::join_all(teardowns).await;
        info!("All channels unsubscribed");
    }

    pub async fn active_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    #[allow(dead_code)]
    pub async fn is_channel_active(&self, channel: &str) -> bool {
        self.channels.lock().await.contains_key(channel)
    }

    /// Signal the channel task and wait for it, bounded by the shutdown timeout.
    async fn teardown(&self, channel: &str, handle: ChannelHandle) {
        let ChannelHandle { shutdown, mut task } = handle;
        let _ = shutdown.send(());
        match tokio::time::timeout(self.options.shutdown_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("[{}] Channel task ended abnormally: {}", channel, e),
            Err(_) => {
                warn!(
                    "[{}] Channel did not close within {:?}, aborting",
                    channel, self.options.shutdown_timeout
                );
                task.abort();
            }
        }
    }
}
