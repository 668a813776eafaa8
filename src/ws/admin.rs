//! Admin-only command handlers
//!
//! Authorization is checked in the main dispatch layer before calling these.

use crate::protocol::ServerMessage;
use crate::state::{AppState, CreateRoundRequest};
use crate::types::RoundId;
use std::sync::Arc;

pub async fn handle_create_round(
    state: &Arc<AppState>,
    request: CreateRoundRequest,
) -> Option<ServerMessage> {
    tracing::info!(
        "Admin creating round for {:?} with {} participants",
        request.date,
        request.participant_ids.len()
    );
    match state.create_round(request).await {
        Ok(round) => Some(ServerMessage::RoundCreated { round }),
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_activate_round(
    state: &Arc<AppState>,
    round_id: RoundId,
) -> Option<ServerMessage> {
    match state.activate_round(&round_id).await {
        Ok(round) => Some(ServerMessage::RoundUpdated { round }),
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_delete_round(state: &Arc<AppState>, round_id: RoundId) -> Option<ServerMessage> {
    match state.delete_round(&round_id).await {
        Ok(()) => Some(ServerMessage::RoundDeleted { round_id }),
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_start_evaluation(
    state: &Arc<AppState>,
    round_id: RoundId,
) -> Option<ServerMessage> {
    match state.start_evaluation(&round_id).await {
        Ok(round) => Some(ServerMessage::RoundUpdated { round }),
        Err(e) => Some(e.into()),
    }
}

/// Finalize and answer with the ranking that was archived
pub async fn handle_finish_round(state: &Arc<AppState>, round_id: RoundId) -> Option<ServerMessage> {
    if let Err(e) = state.finalize_round(&round_id).await {
        return Some(e.into());
    }
    match state.round_results(&round_id).await {
        Ok(scores) => Some(ServerMessage::Results { round_id, scores }),
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_list_rounds(state: &Arc<AppState>) -> Option<ServerMessage> {
    match state.list_rounds().await {
        Ok(rounds) => Some(ServerMessage::Rounds { rounds }),
        Err(e) => Some(e.into()),
    }
}
