use std::sync::Arc;
use tracing::info;

use crate::realtime::{
    ChangeCallback, ChangeRouter, ChangeTarget, EventFilter, RawChange, RealtimeClient,
    Subscription,
};
use crate::score::{ScoreSnapshot, SCORE_TABLE};

pub const CHANNEL_NAME: &str = "score_board-channel";

/// Mirrors `score_board` changes into a [`ChangeRouter`] over a single channel.
pub struct ScoreboardListener {
    client: Arc<RealtimeClient>,
    router: Arc<ChangeRouter<ScoreSnapshot>>,
    events: EventFilter,
}

/// Router with the stock handlers, which only log. Replace them with
/// [`ChangeRouter::on_insert`] and friends to attach behaviour.
pub fn logging_router() -> ChangeRouter<ScoreSnapshot> {
    ChangeRouter::new(CHANNEL_NAME)
        .on_insert(|after: &ScoreSnapshot| {
            info!("INSERT court {}: new record {:?}", after.court_id, after);
            Ok(())
        })
        .on_update(|before: &ScoreSnapshot, after: &ScoreSnapshot| {
            info!(
                "UPDATE court {}: {:?}-{:?} -> {:?}-{:?}",
                after.court_id,
                before.team_a_score,
                before.team_b_score,
                after.team_a_score,
                after.team_b_score
            );
            Ok(())
        })
        .on_delete(|before: &ScoreSnapshot| {
            info!("DELETE court {}: deleted {:?}", before.court_id, before);
            Ok(())
        })
}

impl ScoreboardListener {
    pub fn new(client: Arc<RealtimeClient>, router: ChangeRouter<ScoreSnapshot>) -> Self {
        ScoreboardListener {
            client,
            router: Arc::new(router),
            events: EventFilter::All,
        }
    }

    /// Only mirror the given change kinds.
    pub fn with_events(mut self, events: EventFilter) -> Self {
        self.events = events;
        self
    }

    /// Subscribe to changes of the `score_board` table.
    pub async fn start(&self) -> Subscription {
        info!("Starting scoreboard real-time listener");
        let router = Arc::clone(&self.router);
        let callback: ChangeCallback = Arc::new(move |raw: RawChange| {
            router.route(&raw);
        });
        self.client
            .subscribe(
                CHANNEL_NAME,
                ChangeTarget::table(SCORE_TABLE).event(self.events),
                callback,
            )
            .await
    }

    pub async fn stop(&self) {
        info!("Stopping scoreboard listener");
        self.client.unsubscribe(CHANNEL_NAME).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::events::ChangeKind;
    use crate::realtime::router::DispatchOutcome;
    use crate::realtime::ChannelOptions;
    use serde_json::json;
    use url::Url;

    fn change(event_type: &str, old: Option<serde_json::Value>, new: Option<serde_json::Value>) -> RawChange {
        RawChange {
            event_type: event_type.into(),
            schema: "public".into(),
            table: SCORE_TABLE.into(),
            old,
            new,
            commit_timestamp: Some("2024-05-01T10:00:00Z".into()),
        }
    }

    #[test]
    fn test_logging_router_handles_every_kind() {
        let router = logging_router();
        let row = json!({"court_id": 3, "team_A_score": "21", "team_B_score": "18"});
        assert_eq!(
            router.route(&change("INSERT", None, Some(row.clone()))),
            DispatchOutcome::Dispatched(ChangeKind::Insert)
        );
        assert_eq!(
            router.route(&change("UPDATE", Some(row.clone()), Some(row))),
            DispatchOutcome::Dispatched(ChangeKind::Update)
        );
        // key-only old record, as sent without REPLICA IDENTITY FULL
        assert_eq!(
            router.route(&change("DELETE", Some(json!({"court_id": 3})), None)),
            DispatchOutcome::Dispatched(ChangeKind::Delete)
        );
    }

    #[tokio::test]
    async fn test_start_registers_single_channel_and_stop_removes_it() {
        let client = Arc::new(RealtimeClient::new(
            Url::parse("ws://127.0.0.1:9/realtime/v1/websocket").unwrap(),
            "anon",
            ChannelOptions::default(),
        ));
        let listener = ScoreboardListener::new(Arc::clone(&client), logging_router());

        let sub = listener.start().await;
        assert_eq!(sub.channel(), CHANNEL_NAME);
        listener.start().await;
        assert_eq!(client.active_channels().await, vec![CHANNEL_NAME]);

        listener.stop().await;
        assert!(!client.is_channel_active(CHANNEL_NAME).await);
    }
}
