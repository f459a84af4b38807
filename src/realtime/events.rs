use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::claims::Role;
use crate::payments::repo::Payment;

/// Messages pushed to connected clients. Payment payloads are advisory
/// triggers; clients re-fetch over REST on receipt rather than trusting the
/// event as the source of truth.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Connected { user_id: Uuid, user_role: Role },
    Error { message: String },
    Pong { timestamp: String },
    JoinedRoom { room: String },
    PaymentCreated(Payment),
    PaymentUpdated(Payment),
    #[serde(rename_all = "camelCase")]
    PaymentDeleted { payment_id: Uuid },
    StatsUpdated,
}

impl ServerEvent {
    /// Wire encoding; serialized once per broadcast. `None` is logged and
    /// means the event is silently dropped rather than poisoning the fan-out.
    pub fn encode(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize realtime event");
                None
            }
        }
    }
}

/// Messages accepted from clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    Ping,
    JoinRoom { room: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_events_use_wire_names() {
        let ev = ServerEvent::Connected {
            user_id: Uuid::nil(),
            user_role: Role::Admin,
        };
        let v: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "connected");
        assert_eq!(v["data"]["userRole"], "admin");

        let v: serde_json::Value =
            serde_json::to_value(ServerEvent::StatsUpdated).unwrap();
        assert_eq!(v["event"], "statsUpdated");
        assert!(v.get("data").is_none());

        let v: serde_json::Value = serde_json::to_value(ServerEvent::PaymentDeleted {
            payment_id: Uuid::nil(),
        })
        .unwrap();
        assert_eq!(v["event"], "paymentDeleted");
        assert!(v["data"]["paymentId"].is_string());
    }

    #[test]
    fn client_messages_parse() {
        let msg: ClientMessage = serde_json::from_value(json!({ "event": "ping" })).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));

        let msg: ClientMessage =
            serde_json::from_value(json!({ "event": "joinRoom", "data": { "room": "admin" } }))
                .unwrap();
        match msg {
            ClientMessage::JoinRoom { room } => assert_eq!(room, "admin"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_client_event_is_rejected() {
        assert!(serde_json::from_value::<ClientMessage>(json!({ "event": "subscribe" })).is_err());
    }
}
