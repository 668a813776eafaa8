pub mod admin;
pub mod handlers;
pub mod participant;
pub mod viewer;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::api::ApiError;
use crate::protocol::{ClientMessage, ServerMessage, PROTOCOL_VERSION};
use crate::state::{AppState, GameError, GameResult};
use crate::store::StoreEvent;
use crate::types::{Role, RoundId, UserId};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub role: Option<String>,
    /// Join code issued at registration
    pub token: Option<String>,
}

impl WsQuery {
    /// Requested role; anything unrecognized connects as a viewer
    pub fn role(&self) -> Role {
        match self.role.as_deref() {
            Some("admin") => Role::Admin,
            Some("participant") => Role::Participant,
            _ => Role::Viewer,
        }
    }
}

/// Who is on the other end of a connection
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub role: Role,
    pub user_id: Option<UserId>,
}

impl Client {
    /// Resolve the connecting client, taking its user from the join code.
    ///
    /// Participants must present a known code. An unknown code is rejected
    /// for every role.
    pub async fn from_query(params: &WsQuery, state: &AppState) -> GameResult<Self> {
        let role = params.role();
        let token = params
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let user_id = match token {
            Some(token) => match state.user_by_token(token).await? {
                Some(user) => Some(user.id),
                None => {
                    return Err(GameError::Unauthorized(
                        "Unknown participant token".to_string(),
                    ))
                }
            },
            None => None,
        };

        if role == Role::Participant && user_id.is_none() {
            return Err(GameError::Unauthorized(
                "Participants must connect with their token".to_string(),
            ));
        }
        Ok(Self { role, user_id })
    }

    pub fn admin() -> Self {
        Self {
            role: Role::Admin,
            user_id: None,
        }
    }

    pub fn participant(user_id: &str) -> Self {
        Self {
            role: Role::Participant,
            user_id: Some(user_id.to_string()),
        }
    }

    pub fn viewer() -> Self {
        Self {
            role: Role::Viewer,
            user_id: None,
        }
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    tracing::info!("WebSocket connection request: role={:?}", params.role);

    let client = match Client::from_query(&params, &state).await {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Rejected WebSocket connection: {}", e);
            return ApiError::from(e).into_response();
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, client, state))
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            true
        }
    }
}

/// The view pushed to a client when a store event touches the round it watches
async fn relay_event(
    event: StoreEvent,
    watching: &mut Option<RoundId>,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    let round_id = watching.clone()?;
    match event {
        StoreEvent::RoundChanged(id) if id == round_id => {
            match state.observe_round(&round_id).await {
                Ok(view) => Some(ServerMessage::RoundState(view)),
                Err(e) => {
                    tracing::warn!("Failed to refresh round {}: {}", round_id, e);
                    None
                }
            }
        }
        StoreEvent::RoundDeleted(id) if id == round_id => {
            *watching = None;
            Some(ServerMessage::RoundDeleted { round_id })
        }
        StoreEvent::Restored => match state.observe_round(&round_id).await {
            Ok(view) => Some(ServerMessage::RoundState(view)),
            Err(_) => {
                *watching = None;
                Some(ServerMessage::RoundDeleted { round_id })
            }
        },
        _ => None,
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, client: Client, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    tracing::info!(
        "WebSocket connected with role: {:?}, user: {:?}",
        client.role,
        client.user_id
    );

    // Subscribe before reading so no change between welcome and loop is lost
    let mut events = state.store.subscribe();

    let active_round = match &client.user_id {
        Some(user_id) => match state.active_round_for(user_id).await {
            Ok(Some(round)) => state.observe_round(&round.id).await.ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to look up active round for {}: {}", user_id, e);
                None
            }
        },
        None => None,
    };
    let mut watching = active_round.as_ref().map(|view| view.round_id.clone());

    let welcome = ServerMessage::Welcome {
        protocol: PROTOCOL_VERSION.to_string(),
        role: client.role,
        user_id: client.user_id.clone(),
        active_round,
        server_now: chrono::Utc::now().to_rfc3339(),
    };
    if !send_json(&mut sender, &welcome).await {
        tracing::error!("Failed to send welcome message");
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(msg) = relay_event(event, &mut watching, &state).await {
                            if !send_json(&mut sender, &msg).await {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Connection lagged behind by {} store events", skipped);
                        if let Some(msg) = relay_event(StoreEvent::Restored, &mut watching, &state).await {
                            if !send_json(&mut sender, &msg).await {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => handlers::handle_message(client_msg, &client, &state).await,
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                Some(ServerMessage::error(
                                    "PARSE_ERROR",
                                    format!("Invalid message format: {}", e),
                                ))
                            }
                        };

                        if let Some(response) = response {
                            if let ServerMessage::RoundState(view) = &response {
                                watching = Some(view.round_id.clone());
                            }
                            if !send_json(&mut sender, &response).await {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    tracing::info!("WebSocket connection closed for role: {:?}", client.role);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    fn query(role: &str, token: Option<&str>) -> WsQuery {
        WsQuery {
            role: Some(role.to_string()),
            token: token.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_client_from_query_resolves_token() {
        let state = seeded_state().await;
        let token = state.store.get_user("a").await.unwrap().unwrap().token;

        let client = Client::from_query(&query("participant", Some(&format!(" {} ", token))), &state)
            .await
            .unwrap();
        assert_eq!(client, Client::participant("a"));

        let client = Client::from_query(&query("something", None), &state)
            .await
            .unwrap();
        assert_eq!(client, Client::viewer());
    }

    #[tokio::test]
    async fn test_participant_without_valid_token_is_rejected() {
        let state = seeded_state().await;

        for params in [
            query("participant", None),
            query("participant", Some("")),
            query("participant", Some("WRONG234")),
            query("viewer", Some("WRONG234")),
        ] {
            let result = Client::from_query(&params, &state).await;
            assert!(matches!(result, Err(GameError::Unauthorized(_))), "{:?}", params);
        }
    }

    #[tokio::test]
    async fn test_relay_only_for_watched_round() {
        let state = Arc::new(seeded_state().await);
        let round = active_round(&state).await;

        let mut watching = None;
        let msg = relay_event(StoreEvent::RoundChanged(round.id.clone()), &mut watching, &state).await;
        assert!(msg.is_none());

        let mut watching = Some(round.id.clone());
        let msg = relay_event(StoreEvent::RoundChanged("other".to_string()), &mut watching, &state).await;
        assert!(msg.is_none());

        let msg = relay_event(StoreEvent::RoundChanged(round.id.clone()), &mut watching, &state).await;
        assert!(matches!(msg, Some(ServerMessage::RoundState(view)) if view.round_id == round.id));

        let msg = relay_event(StoreEvent::RoundDeleted(round.id.clone()), &mut watching, &state).await;
        assert!(matches!(msg, Some(ServerMessage::RoundDeleted { .. })));
        assert!(watching.is_none());
    }
}
