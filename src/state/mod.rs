mod catalog;
mod evaluation;
pub mod export;
mod history;
mod lifecycle;
mod turn;

pub use evaluation::{compute_scores, evaluations_complete, RatingInput};
pub use lifecycle::CreateRoundRequest;
pub use turn::{DishCard, RoundView};

use crate::store::{IdGenerator, MemoryStore, Store, StoreError};
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

/// Result type for coordinator operations
pub type GameResult<T> = Result<T, GameError>;

/// Errors surfaced to callers of the coordinators
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Missing or malformed input, rejected before any write
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Wrong turn, claimed dish, repeated submission, or lost race
    #[error("{0}")]
    Precondition(String),

    /// Missing or unknown credentials
    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Store(StoreError),
}

impl GameError {
    /// Stable error code for clients
    pub fn code(&self) -> &'static str {
        match self {
            GameError::Validation(_) => "VALIDATION_FAILED",
            GameError::NotFound(_) => "NOT_FOUND",
            GameError::Precondition(_) => "PRECONDITION_FAILED",
            GameError::Unauthorized(_) => "UNAUTHORIZED",
            GameError::Store(_) => "STORE_UNAVAILABLE",
        }
    }
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => GameError::NotFound(what),
            StoreError::PreconditionFailed(msg) => GameError::Precondition(msg),
            other => GameError::Store(other),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: GameConfig,
    /// Delayed dish claims keyed by round
    pending_reveals: Arc<Mutex<HashMap<RoundId, PendingReveal>>>,
    round_ids: Arc<IdGenerator>,
    /// Held across the overlap check and the status write of an activation
    activation: Arc<Mutex<()>>,
}

/// A delayed dish claim waiting for its timer
struct PendingReveal {
    participant_id: ParticipantId,
    handle: AbortHandle,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: GameConfig) -> Self {
        Self {
            store,
            config,
            pending_reveals: Arc::new(Mutex::new(HashMap::new())),
            round_ids: Arc::new(IdGenerator::new()),
            activation: Arc::new(Mutex::new(())),
        }
    }

    /// State backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), GameConfig::default())
    }

    /// Load a round or fail with `NotFound`
    pub async fn require_round(&self, round_id: &str) -> GameResult<Round> {
        self.store
            .get_round(round_id)
            .await?
            .ok_or_else(|| GameError::NotFound(format!("Round {}", round_id)))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::in_memory()
    }
}
