use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRef, Query, State,
    },
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::claims::{Claims, Role};
use crate::auth::jwt::JwtKeys;
use crate::realtime::events::{ClientMessage, ServerEvent};
use crate::realtime::registry::ADMIN_GROUP;
use crate::state::AppState;

pub fn realtime_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// Bearer token lookup across the three transport slots, in preference
/// order: the `Sec-WebSocket-Protocol` auth slot (`bearer, <token>`, the
/// handshake field browsers can set), the `Authorization` header, the
/// `token` query parameter.
pub(crate) fn extract_token(
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Option<String> {
    if let Some(proto) = headers
        .get(axum::http::header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
    {
        let mut parts = proto.split(',').map(str::trim);
        if parts.next() == Some("bearer") {
            if let Some(token) = parts.next().filter(|t| !t.is_empty()) {
                return Some(token.to_string());
            }
        }
    }

    if let Some(auth) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
        {
            return Some(token.to_string());
        }
    }

    query.get("token").cloned()
}

/// Token check for the handshake. Failure is terminal for the connection
/// attempt; there is no anonymous or retry state.
pub(crate) fn authenticate(keys: &JwtKeys, token: Option<&str>) -> Result<Claims, String> {
    let token = token.ok_or_else(|| "Authentication token required".to_string())?;
    keys.verify(token)
        .map_err(|_| "Authentication failed".to_string())
}

pub(crate) fn join_allowed(role: Role, room: &str) -> bool {
    if room == ADMIN_GROUP {
        match role {
            Role::Admin => true,
            Role::User => false,
        }
    } else {
        true
    }
}

async fn ws_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let token = extract_token(&headers, &query);
    ws.protocols(["bearer"])
        .on_upgrade(move |socket| handle_socket(state, socket, token))
}

#[instrument(skip_all)]
async fn handle_socket(state: AppState, socket: WebSocket, token: Option<String>) {
    let (mut sink, mut stream) = socket.split();

    let keys = JwtKeys::from_ref(&state);
    let claims = match authenticate(&keys, token.as_deref()) {
        Ok(claims) => claims,
        Err(message) => {
            warn!(%message, "realtime connection rejected");
            if let Some(text) = (ServerEvent::Error { message }).encode() {
                let _ = sink.send(Message::Text(text)).await;
            }
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let connection_id = state.registry.register(claims.sub, claims.role, tx.clone());
    info!(%connection_id, user_id = %claims.sub, role = ?claims.role, "realtime client connected");

    send_event(
        &tx,
        &ServerEvent::Connected {
            user_id: claims.sub,
            user_role: claims.role,
        },
    );

    let forward = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                handle_client_message(&state, &tx, connection_id, &claims, &text);
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {} // binary/ping/pong: nothing to do
            Some(Err(e)) => {
                warn!(%connection_id, error = %e, "websocket protocol error");
                break;
            }
        }
    }

    state.registry.remove(connection_id);
    forward.abort();
    info!(%connection_id, user_id = %claims.sub, "realtime client disconnected");
}

fn handle_client_message(
    state: &AppState,
    tx: &UnboundedSender<String>,
    connection_id: Uuid,
    claims: &Claims,
    text: &str,
) {
    let msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(%connection_id, error = %e, "ignoring unparseable client message");
            return;
        }
    };

    match msg {
        ClientMessage::Ping => {
            let timestamp = OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_default();
            send_event(tx, &ServerEvent::Pong { timestamp });
        }
        ClientMessage::JoinRoom { room } => {
            if !join_allowed(claims.role, &room) {
                warn!(%connection_id, user_id = %claims.sub, "admin room join denied");
                send_event(
                    tx,
                    &ServerEvent::Error {
                        message: "Access denied to admin room".into(),
                    },
                );
                return;
            }
            if state.registry.join_group(connection_id, &room) {
                send_event(tx, &ServerEvent::JoinedRoom { room });
            }
        }
    }
}

fn send_event(tx: &UnboundedSender<String>, event: &ServerEvent) {
    if let Some(text) = event.encode() {
        let _ = tx.send(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::tests::{make_keys, make_user};

    fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        headers
    }

    #[test]
    fn token_prefers_protocol_slot_over_header_and_query() {
        let headers = header_map(&[
            ("sec-websocket-protocol", "bearer, from-protocol"),
            ("authorization", "Bearer from-header"),
        ]);
        let mut query = HashMap::new();
        query.insert("token".to_string(), "from-query".to_string());
        assert_eq!(
            extract_token(&headers, &query).as_deref(),
            Some("from-protocol")
        );
    }

    #[test]
    fn token_falls_back_to_authorization_header() {
        let headers = header_map(&[("authorization", "Bearer from-header")]);
        let mut query = HashMap::new();
        query.insert("token".to_string(), "from-query".to_string());
        assert_eq!(
            extract_token(&headers, &query).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn token_falls_back_to_query_parameter() {
        let headers = HeaderMap::new();
        let mut query = HashMap::new();
        query.insert("token".to_string(), "from-query".to_string());
        assert_eq!(
            extract_token(&headers, &query).as_deref(),
            Some("from-query")
        );
    }

    #[test]
    fn token_absent_everywhere_is_none() {
        assert_eq!(extract_token(&HeaderMap::new(), &HashMap::new()), None);
    }

    #[test]
    fn unrelated_protocol_header_is_ignored() {
        let headers = header_map(&[("sec-websocket-protocol", "graphql-ws")]);
        assert_eq!(extract_token(&headers, &HashMap::new()), None);
    }

    #[test]
    fn authenticate_rejects_missing_token() {
        let keys = make_keys("secret", "iss", "aud");
        let err = authenticate(&keys, None).unwrap_err();
        assert_eq!(err, "Authentication token required");
    }

    #[test]
    fn authenticate_rejects_garbage_token() {
        let keys = make_keys("secret", "iss", "aud");
        let err = authenticate(&keys, Some("not-a-jwt")).unwrap_err();
        assert_eq!(err, "Authentication failed");
    }

    #[test]
    fn expired_token_is_rejected_and_no_session_is_registered() {
        let keys = make_keys("secret", "iss", "aud");
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            username: "alice".into(),
            role: Role::User,
            iat: (now - 7200) as usize,
            exp: (now - 3600) as usize,
            iss: "iss".into(),
            aud: "aud".into(),
        };
        let token =
            jsonwebtoken::encode(&jsonwebtoken::Header::default(), &claims, &keys.encoding)
                .expect("encode");

        let registry = crate::realtime::registry::ConnectionRegistry::new();
        let err = authenticate(&keys, Some(&token)).unwrap_err();
        assert_eq!(err, "Authentication failed");
        // Authentication failure is terminal; nothing was registered.
        assert!(registry.is_empty());
    }

    #[test]
    fn authenticate_accepts_valid_token() {
        let keys = make_keys("secret", "iss", "aud");
        let user = make_user(Role::User);
        let token = keys.sign(&user).expect("sign");
        let claims = authenticate(&keys, Some(&token)).expect("authenticate");
        assert_eq!(claims.sub, user.id);
    }

    #[test]
    fn admin_room_requires_admin_role() {
        assert!(!join_allowed(Role::User, ADMIN_GROUP));
        assert!(join_allowed(Role::Admin, ADMIN_GROUP));
        // Any other named room is open to everyone.
        assert!(join_allowed(Role::User, "reports"));
        assert!(join_allowed(Role::Admin, "reports"));
    }
}
