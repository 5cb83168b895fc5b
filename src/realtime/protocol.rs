//! Phoenix channel frames spoken by Supabase Realtime (`vsn=1.0.0`, JSON objects).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use super::events::ChangeTarget;

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const EVENT_SYSTEM: &str = "system";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// Topic name of a channel.
pub fn topic(channel: &str) -> String {
    format!("realtime:{}", channel)
}

/// Websocket endpoint for a Supabase project URL.
pub fn socket_url(project_url: &Url, api_key: &str) -> anyhow::Result<Url> {
    let mut url = project_url.clone();
    let scheme = match project_url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => anyhow::bail!("unsupported scheme for realtime: {}", other),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("cannot switch {} to {}", project_url, scheme))?;
    url.set_path("/realtime/v1/websocket");
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("apikey", api_key)
        .append_pair("vsn", "1.0.0");
    Ok(url)
}

impl PhoenixMessage {
    pub fn join(channel: &str, target: &ChangeTarget, access_token: &str, msg_ref: u64) -> Self {
        PhoenixMessage {
            topic: topic(channel),
            event: EVENT_JOIN.to_string(),
            payload: json!({
                "config": {
                    "broadcast": {"ack": false, "self": false},
                    "presence": {"key": ""},
                    "postgres_changes": [{
                        "event": target.event.as_str(),
                        "schema": target.schema,
                        "table": target.table,
                    }],
                },
                "access_token": access_token,
            }),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: Some(msg_ref.to_string()),
        }
    }

    pub fn leave(channel: &str, msg_ref: u64, join_ref: u64) -> Self {
        PhoenixMessage {
            topic: topic(channel),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: Some(join_ref.to_string()),
        }
    }

    pub fn heartbeat(msg_ref: u64) -> Self {
        PhoenixMessage {
            topic: "phoenix".to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            msg_ref: Some(msg_ref.to_string()),
            join_ref: None,
        }
    }

    pub fn to_text(&self) -> String {
        // Serializing a struct of strings and a Value cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// `payload.status` of a `phx_reply`.
    pub fn reply_status(&self) -> Option<&str> {
        self.payload.get("status").and_then(Value::as_str)
    }

    pub fn is_reply_to(&self, msg_ref: u64) -> bool {
        self.event == EVENT_REPLY && self.msg_ref.as_deref() == Some(msg_ref.to_string().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::events::{ChangeKind, EventFilter};

    #[test]
    fn test_socket_url_switches_scheme_and_adds_key() {
        let project = Url::parse("https://demo.supabase.co").unwrap();
        let url = socket_url(&project, "anon").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://demo.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );

        let local = Url::parse("http://127.0.0.1:54321").unwrap();
        assert!(socket_url(&local, "k").unwrap().as_str().starts_with("ws://127.0.0.1:54321/"));
    }

    #[test]
    fn test_join_frame_shape() {
        let target = ChangeTarget::table("score_board").event(EventFilter::Only(ChangeKind::Update));
        let msg = PhoenixMessage::join("score_board-channel", &target, "token", 1);
        let v: Value = serde_json::from_str(&msg.to_text()).unwrap();
        assert_eq!(v["topic"], "realtime:score_board-channel");
        assert_eq!(v["event"], "phx_join");
        assert_eq!(v["ref"], "1");
        assert_eq!(v["join_ref"], "1");
        assert_eq!(
            v["payload"]["config"]["postgres_changes"][0],
            json!({"event": "UPDATE", "schema": "public", "table": "score_board"})
        );
        assert_eq!(v["payload"]["access_token"], "token");
    }

    #[test]
    fn test_decode_server_broadcast_with_null_ref() {
        let text = r#"{"topic":"realtime:c","event":"postgres_changes","payload":{"data":{}},"ref":null}"#;
        let msg: PhoenixMessage = serde_json::from_str(text).unwrap();
        assert_eq!(msg.msg_ref, None);
        assert_eq!(msg.event, EVENT_POSTGRES_CHANGES);
    }

    #[test]
    fn test_reply_matching() {
        let text = r#"{"topic":"realtime:c","event":"phx_reply","payload":{"status":"ok","response":{}},"ref":"3"}"#;
        let msg: PhoenixMessage = serde_json::from_str(text).unwrap();
        assert!(msg.is_reply_to(3));
        assert!(!msg.is_reply_to(4));
        assert_eq!(msg.reply_status(), Some("ok"));
    }
}
