//! Participant message handlers: dish reveals and evaluations.

use crate::protocol::ServerMessage;
use crate::state::{AppState, RatingInput};
use crate::types::{DishId, ParticipantId, RoundId};
use std::collections::HashMap;
use std::sync::Arc;

pub async fn handle_reveal_dish(
    state: &Arc<AppState>,
    user_id: &str,
    round_id: RoundId,
    dish_id: DishId,
) -> Option<ServerMessage> {
    tracing::info!("{} revealing {} in round {}", user_id, dish_id, round_id);
    match state.reveal_and_assign(&round_id, user_id, &dish_id).await {
        Ok(reveal) => Some(ServerMessage::RevealStarted { round_id, reveal }),
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_start_evaluation(
    state: &Arc<AppState>,
    user_id: &str,
    round_id: RoundId,
) -> Option<ServerMessage> {
    match state.require_round(&round_id).await {
        Ok(round) if !round.is_participant(user_id) => {
            return Some(ServerMessage::error(
                "UNAUTHORIZED",
                format!("{} does not play in round {}", user_id, round_id),
            ));
        }
        Ok(_) => {}
        Err(e) => return Some(e.into()),
    }

    if let Err(e) = state.start_evaluation(&round_id).await {
        return Some(e.into());
    }
    match state.observe_round(&round_id).await {
        Ok(view) => Some(ServerMessage::RoundState(view)),
        Err(e) => Some(e.into()),
    }
}

pub async fn handle_submit_evaluations(
    state: &Arc<AppState>,
    user_id: &str,
    round_id: RoundId,
    ratings: HashMap<ParticipantId, RatingInput>,
) -> Option<ServerMessage> {
    match state.submit_evaluations(&round_id, user_id, ratings).await {
        Ok(round) => Some(ServerMessage::EvaluationsAccepted {
            round_id,
            submitted: round.evaluations.len(),
            total: round.participants.len(),
        }),
        Err(e) => Some(e.into()),
    }
}
