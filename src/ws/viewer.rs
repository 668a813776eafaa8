//! Read-only handlers available to every connection

use crate::protocol::ServerMessage;
use crate::state::{AppState, GameError};
use crate::types::RoundId;
use std::sync::Arc;

use super::Client;

pub async fn handle_observe_round(
    state: &Arc<AppState>,
    client: &Client,
    round_id: Option<RoundId>,
) -> Option<ServerMessage> {
    let round_id = match (round_id, &client.user_id) {
        (Some(id), _) => id,
        (None, Some(user_id)) => match state.active_round_for(user_id).await {
            Ok(Some(round)) => round.id,
            Ok(None) => {
                return Some(GameError::NotFound(format!("Active round for {}", user_id)).into())
            }
            Err(e) => return Some(e.into()),
        },
        (None, None) => return Some(GameError::NotFound("Active round".to_string()).into()),
    };

    match state.observe_round(&round_id).await {
        Ok(view) => Some(ServerMessage::RoundState(view)),
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_get_results(state: &Arc<AppState>, round_id: RoundId) -> Option<ServerMessage> {
    match state.round_results(&round_id).await {
        Ok(scores) => Some(ServerMessage::Results { round_id, scores }),
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_get_history(state: &Arc<AppState>) -> Option<ServerMessage> {
    match state.list_history().await {
        Ok(entries) => Some(ServerMessage::History { entries }),
        Err(e) => Some(e.into()),
    }
}
