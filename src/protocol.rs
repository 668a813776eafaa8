use crate::state::{RatingInput, RoundView};
use crate::types::*;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Watch a round; without an id, the caller's active round
    ObserveRound {
        #[serde(default)]
        round_id: Option<RoundId>,
    },
    RevealDish {
        round_id: RoundId,
        dish_id: DishId,
    },
    StartEvaluation {
        round_id: RoundId,
    },
    SubmitEvaluations {
        round_id: RoundId,
        ratings: HashMap<ParticipantId, RatingInput>,
    },
    GetResults {
        round_id: RoundId,
    },
    GetHistory,
    // Admin-only messages
    AdminCreateRound {
        date: Option<NaiveDate>,
        #[serde(default)]
        participant_ids: Vec<UserId>,
        category_id: Option<CategoryId>,
    },
    AdminActivateRound {
        round_id: RoundId,
    },
    AdminDeleteRound {
        round_id: RoundId,
    },
    AdminFinishRound {
        round_id: RoundId,
    },
    AdminListRounds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        user_id: Option<UserId>,
        active_round: Option<RoundView>,
        server_now: String,
    },
    RoundState(RoundView),
    RevealStarted {
        round_id: RoundId,
        reveal: CurrentReveal,
    },
    EvaluationsAccepted {
        round_id: RoundId,
        submitted: usize,
        total: usize,
    },
    Results {
        round_id: RoundId,
        scores: Vec<ParticipantScore>,
    },
    History {
        entries: Vec<HistoryRecord>,
    },
    RoundCreated {
        round: Round,
    },
    RoundUpdated {
        round: Round,
    },
    Rounds {
        rounds: Vec<Round>,
    },
    RoundDeleted {
        round_id: RoundId,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn error(code: &str, msg: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            msg: msg.into(),
        }
    }
}

impl From<crate::state::GameError> for ServerMessage {
    fn from(err: crate::state::GameError) -> Self {
        ServerMessage::error(err.code(), err.to_string())
    }
}
