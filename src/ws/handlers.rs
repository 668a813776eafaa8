//! WebSocket message dispatch
//!
//! Authorization is checked here, then dispatched to role-specific handler modules.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::{AppState, CreateRoundRequest};
use crate::types::Role;
use std::sync::Arc;

use super::{admin, participant, viewer, Client};

/// Macro to check admin authorization and return early if unauthorized
macro_rules! check_admin {
    ($client:expr, $action:expr) => {
        if $client.role != Role::Admin {
            return Some(ServerMessage::error(
                "UNAUTHORIZED",
                format!("Only admins can {}", $action),
            ));
        }
    };
}

/// Macro to resolve the participant behind a connection or return early
macro_rules! require_participant {
    ($client:expr, $action:expr) => {
        match (&$client.role, &$client.user_id) {
            (Role::Participant, Some(user_id)) => user_id.as_str(),
            _ => {
                return Some(ServerMessage::error(
                    "UNAUTHORIZED",
                    format!("Only participants can {}", $action),
                ))
            }
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    client: &Client,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::ObserveRound { round_id } => {
            viewer::handle_observe_round(state, client, round_id).await
        }

        ClientMessage::GetResults { round_id } => viewer::handle_get_results(state, round_id).await,

        ClientMessage::GetHistory => viewer::handle_get_history(state).await,

        ClientMessage::RevealDish { round_id, dish_id } => {
            let user_id = require_participant!(client, "reveal dishes");
            participant::handle_reveal_dish(state, user_id, round_id, dish_id).await
        }

        ClientMessage::StartEvaluation { round_id } => {
            if client.role != Role::Admin {
                let user_id = require_participant!(client, "start evaluations");
                return participant::handle_start_evaluation(state, user_id, round_id).await;
            }
            admin::handle_start_evaluation(state, round_id).await
        }

        ClientMessage::SubmitEvaluations { round_id, ratings } => {
            let user_id = require_participant!(client, "submit evaluations");
            participant::handle_submit_evaluations(state, user_id, round_id, ratings).await
        }

        // Admin-only commands (authorization checked before dispatch)
        ClientMessage::AdminCreateRound {
            date,
            participant_ids,
            category_id,
        } => {
            check_admin!(client, "create rounds");
            admin::handle_create_round(
                state,
                CreateRoundRequest {
                    date,
                    participant_ids,
                    category_id,
                },
            )
            .await
        }

        ClientMessage::AdminActivateRound { round_id } => {
            check_admin!(client, "activate rounds");
            admin::handle_activate_round(state, round_id).await
        }

        ClientMessage::AdminDeleteRound { round_id } => {
            check_admin!(client, "delete rounds");
            admin::handle_delete_round(state, round_id).await
        }

        ClientMessage::AdminFinishRound { round_id } => {
            check_admin!(client, "finish rounds");
            admin::handle_finish_round(state, round_id).await
        }

        ClientMessage::AdminListRounds => {
            check_admin!(client, "list rounds");
            admin::handle_list_rounds(state).await
        }
    }
}
