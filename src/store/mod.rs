//! Repository seam over the shared document tree.
//!
//! Coordinators only talk to [`Store`]. Round writes are expressed as a
//! [`RoundPatch`] guarded by [`Precondition`]s; an implementation must check
//! every precondition and apply every field of the patch as one step, or do
//! nothing at all.

mod memory;

pub use memory::MemoryStore;

use crate::types::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::broadcast;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by a store implementation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Change notifications delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum StoreEvent {
    CatalogChanged,
    UserChanged(UserId),
    RoundChanged(RoundId),
    RoundDeleted(RoundId),
    HistoryAppended(HistoryId),
    Restored,
}

/// A single field write on a round document
#[derive(Debug, Clone, PartialEq)]
pub enum RoundWrite {
    Status(RoundStatus),
    TurnOrder(Vec<ParticipantId>),
    CurrentTurn(Option<ParticipantId>),
    DishOrder(Vec<DishId>),
    Reveal(Option<CurrentReveal>),
    ParticipantDish {
        participant_id: ParticipantId,
        dish_id: DishId,
    },
    EvaluationBlock {
        evaluator_id: ParticipantId,
        block: EvaluationBlock,
    },
    EvaluationStatus(EvaluationStatus),
    SavedToHistory(bool),
}

impl RoundWrite {
    fn apply(&self, round: &mut Round) -> StoreResult<()> {
        match self {
            RoundWrite::Status(status) => round.status = *status,
            RoundWrite::TurnOrder(order) => round.turn_order = order.clone(),
            RoundWrite::CurrentTurn(turn) => round.current_turn = turn.clone(),
            RoundWrite::DishOrder(order) => round.dish_order = Some(order.clone()),
            RoundWrite::Reveal(reveal) => round.current_reveal = reveal.clone(),
            RoundWrite::ParticipantDish {
                participant_id,
                dish_id,
            } => {
                let participant = round
                    .participant_mut(participant_id)
                    .ok_or_else(|| StoreError::NotFound(format!("Participant {}", participant_id)))?;
                participant.dish_id = Some(dish_id.clone());
            }
            RoundWrite::EvaluationBlock {
                evaluator_id,
                block,
            } => {
                round.evaluations.insert(evaluator_id.clone(), block.clone());
            }
            RoundWrite::EvaluationStatus(status) => round.evaluation_status = Some(*status),
            RoundWrite::SavedToHistory(saved) => round.saved_to_history = *saved,
        }
        Ok(())
    }
}

/// Field writes applied together to one round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundPatch {
    writes: Vec<RoundWrite>,
}

impl RoundPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, write: RoundWrite) -> Self {
        self.writes.push(write);
        self
    }

    pub fn writes(&self) -> &[RoundWrite] {
        &self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply every write to `round`, leaving it untouched on failure
    pub fn apply_to(&self, round: &mut Round) -> StoreResult<()> {
        let mut updated = round.clone();
        for write in &self.writes {
            write.apply(&mut updated)?;
        }
        *round = updated;
        Ok(())
    }
}

/// Conditions a round must satisfy for a guarded write to go through
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    StatusIs(RoundStatus),
    TurnOrderUnset,
    DishOrderUnset,
    CurrentTurnIs(ParticipantId),
    ParticipantWithoutDish(ParticipantId),
    DishUnclaimed(DishId),
    NoRevealInFlight,
    RevealIs {
        participant_id: ParticipantId,
        dish_id: DishId,
    },
    NoEvaluationFrom(ParticipantId),
    SavedToHistoryIs(bool),
}

impl Precondition {
    pub fn holds(&self, round: &Round) -> bool {
        match self {
            Precondition::StatusIs(status) => round.status == *status,
            Precondition::TurnOrderUnset => {
                round.turn_order.is_empty() || round.current_turn.is_none()
            }
            Precondition::DishOrderUnset => round.dish_order.is_none(),
            Precondition::CurrentTurnIs(id) => round.current_turn.as_ref() == Some(id),
            Precondition::ParticipantWithoutDish(id) => round
                .participant(id)
                .is_some_and(|p| p.dish_id.is_none()),
            Precondition::DishUnclaimed(dish_id) => !round.is_dish_claimed(dish_id),
            Precondition::NoRevealInFlight => round.current_reveal.is_none(),
            Precondition::RevealIs {
                participant_id,
                dish_id,
            } => round.current_reveal.as_ref().is_some_and(|r| {
                r.participant_id == *participant_id && r.dish_id == *dish_id
            }),
            Precondition::NoEvaluationFrom(id) => !round.evaluations.contains_key(id),
            Precondition::SavedToHistoryIs(saved) => round.saved_to_history == *saved,
        }
    }
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::StatusIs(status) => write!(f, "round status must be {:?}", status),
            Precondition::TurnOrderUnset => write!(f, "turn order already initialized"),
            Precondition::DishOrderUnset => write!(f, "dish order already initialized"),
            Precondition::CurrentTurnIs(id) => write!(f, "it is not {}'s turn", id),
            Precondition::ParticipantWithoutDish(id) => {
                write!(f, "participant {} already has a dish", id)
            }
            Precondition::DishUnclaimed(id) => write!(f, "dish {} is already claimed", id),
            Precondition::NoRevealInFlight => write!(f, "another reveal is in progress"),
            Precondition::RevealIs { dish_id, .. } => {
                write!(f, "reveal of dish {} is no longer current", dish_id)
            }
            Precondition::NoEvaluationFrom(id) => {
                write!(f, "evaluations from {} were already submitted", id)
            }
            Precondition::SavedToHistoryIs(true) => write!(f, "round was not archived"),
            Precondition::SavedToHistoryIs(false) => write!(f, "round was already archived"),
        }
    }
}

/// Check all preconditions, returning the first one that fails
pub fn check_preconditions(round: &Round, guard: &[Precondition]) -> StoreResult<()> {
    match guard.iter().find(|p| !p.holds(round)) {
        Some(failed) => Err(StoreError::PreconditionFailed(failed.to_string())),
        None => Ok(()),
    }
}

/// Full contents of a store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub categories: HashMap<CategoryId, Category>,
    #[serde(default)]
    pub dishes: HashMap<DishId, Dish>,
    #[serde(default)]
    pub users: HashMap<UserId, UserProfile>,
    #[serde(default)]
    pub rounds: HashMap<RoundId, Round>,
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
}

/// Path-scoped access to the shared document tree
#[async_trait]
pub trait Store: Send + Sync {
    /// Create or replace a category
    async fn put_category(&self, category: Category) -> StoreResult<()>;
    async fn get_category(&self, id: &str) -> StoreResult<Option<Category>>;
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn delete_category(&self, id: &str) -> StoreResult<()>;

    /// Create or replace a dish
    async fn put_dish(&self, dish: Dish) -> StoreResult<()>;
    async fn get_dish(&self, id: &str) -> StoreResult<Option<Dish>>;
    async fn list_dishes(&self) -> StoreResult<Vec<Dish>>;
    async fn delete_dish(&self, id: &str) -> StoreResult<()>;

    async fn put_user(&self, user: UserProfile) -> StoreResult<()>;
    async fn get_user(&self, id: &str) -> StoreResult<Option<UserProfile>>;
    async fn list_users(&self) -> StoreResult<Vec<UserProfile>>;

    /// Insert a new round; fails if the id is taken
    async fn insert_round(&self, round: Round) -> StoreResult<()>;
    async fn get_round(&self, id: &str) -> StoreResult<Option<Round>>;
    /// Rounds in creation order
    async fn list_rounds(&self) -> StoreResult<Vec<Round>>;
    /// Check `guard` and apply `patch` as one step, returning the updated round
    async fn update_round(
        &self,
        id: &str,
        guard: &[Precondition],
        patch: RoundPatch,
    ) -> StoreResult<Round>;
    async fn delete_round(&self, id: &str) -> StoreResult<()>;

    /// Append an entry under a freshly generated id
    async fn append_history(&self, entry: HistoricalRound) -> StoreResult<HistoryId>;
    async fn list_history(&self) -> StoreResult<Vec<HistoryRecord>>;

    async fn snapshot(&self) -> StoreResult<StoreSnapshot>;
    /// Replace all contents
    async fn restore(&self, snapshot: StoreSnapshot) -> StoreResult<()>;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// Monotonic ULID source.
///
/// Ids from one generator sort in the order they were handed out, even
/// within the same millisecond.
pub struct IdGenerator(std::sync::Mutex<ulid::Generator>);

impl IdGenerator {
    pub fn new() -> Self {
        Self(std::sync::Mutex::new(ulid::Generator::new()))
    }

    pub fn next_id(&self) -> String {
        let mut generator = self
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match generator.generate() {
            Ok(id) => id.to_string(),
            Err(e) => {
                // Random part exhausted within one millisecond
                tracing::warn!("Monotonic id generation failed: {}", e);
                ulid::Ulid::new().to_string()
            }
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
