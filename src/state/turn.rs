//! Turn coordination: turn order, dish order, and the timed reveal that
//! hands each participant a dish.

use super::{AppState, GameError, GameResult, PendingReveal};
use crate::format::format_dish_name;
use crate::store::{Precondition, RoundPatch, RoundWrite, StoreError};
use crate::types::*;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A face-down (or revealed) card in the per-round candidate grid
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DishCard {
    pub dish_id: DishId,
    pub name: String,
    pub revealed: bool,
    pub claimed_by: Option<ParticipantId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantAssignment {
    pub participant_id: ParticipantId,
    pub name: String,
    pub dish_name: Option<String>,
}

/// What a participant sees of a round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundView {
    pub round_id: RoundId,
    pub date: chrono::NaiveDate,
    pub status: RoundStatus,
    pub phase: TurnPhase,
    pub current_turn: Option<ParticipantId>,
    pub current_turn_name: Option<String>,
    pub current_reveal: Option<CurrentReveal>,
    pub cards: Vec<DishCard>,
    pub available: Vec<DishCard>,
    pub assignments: Vec<ParticipantAssignment>,
    pub evaluation_status: Option<EvaluationStatus>,
}

/// Display name of a dish, falling back to its id
pub(super) fn dish_display_name(dishes: &HashMap<DishId, Dish>, dish_id: &str) -> String {
    match dishes.get(dish_id) {
        Some(dish) => format_dish_name(&dish.name),
        None => format_dish_name(dish_id),
    }
}

/// Active dishes of the round's category that nobody has claimed yet
fn available_pool<'a>(round: &Round, dishes: &'a HashMap<DishId, Dish>) -> Vec<&'a Dish> {
    let mut pool: Vec<&Dish> = dishes
        .values()
        .filter(|d| d.category_id == round.category_id && d.active && !round.is_dish_claimed(&d.id))
        .collect();
    pool.sort_by(|a, b| a.id.cmp(&b.id));
    pool
}

impl AppState {
    pub(super) async fn dishes_by_id(&self) -> GameResult<HashMap<DishId, Dish>> {
        Ok(self
            .store
            .list_dishes()
            .await?
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect())
    }

    /// Dishes still up for grabs in a round
    pub async fn dish_pool(&self, round_id: &str) -> GameResult<Vec<Dish>> {
        let round = self.require_round(round_id).await?;
        let dishes = self.dishes_by_id().await?;
        Ok(available_pool(&round, &dishes).into_iter().cloned().collect())
    }

    /// Fill in turn order and dish order for an active round that lacks them.
    ///
    /// Both writes are conditional on the field still being unset, so
    /// concurrent observers converge on whichever write landed first.
    pub async fn ensure_initialized(&self, round_id: &str) -> GameResult<Round> {
        let mut round = self.require_round(round_id).await?;
        if round.status != RoundStatus::Active {
            return Ok(round);
        }

        if Precondition::TurnOrderUnset.holds(&round) {
            let order = round.participant_ids();
            let patch = RoundPatch::new()
                .with(RoundWrite::CurrentTurn(order.first().cloned()))
                .with(RoundWrite::TurnOrder(order));
            round = match self
                .store
                .update_round(round_id, &[Precondition::TurnOrderUnset], patch)
                .await
            {
                Ok(updated) => {
                    tracing::info!("Initialized turn order for round {}", round_id);
                    updated
                }
                Err(StoreError::PreconditionFailed(_)) => {
                    tracing::debug!("Turn order for round {} set by another observer", round_id);
                    self.require_round(round_id).await?
                }
                Err(e) => return Err(e.into()),
            };
        }

        if round.dish_order.is_none() {
            let dishes = self.dishes_by_id().await?;
            let mut order: Vec<DishId> = available_pool(&round, &dishes)
                .into_iter()
                .map(|d| d.id.clone())
                .collect();
            order.shuffle(&mut rand::rng());

            round = match self
                .store
                .update_round(
                    round_id,
                    &[Precondition::DishOrderUnset],
                    RoundPatch::new().with(RoundWrite::DishOrder(order)),
                )
                .await
            {
                Ok(updated) => {
                    tracing::info!("Shuffled dish order for round {}", round_id);
                    updated
                }
                Err(StoreError::PreconditionFailed(_)) => {
                    tracing::debug!("Dish order for round {} set by another observer", round_id);
                    self.require_round(round_id).await?
                }
                Err(e) => return Err(e.into()),
            };
        }

        Ok(round)
    }

    /// Initialize if needed and build the participant-facing view
    pub async fn observe_round(&self, round_id: &str) -> GameResult<RoundView> {
        let round = self.ensure_initialized(round_id).await?;
        let dishes = self.dishes_by_id().await?;
        Ok(build_view(&round, &dishes))
    }

    /// Flip a card for the participant whose turn it is.
    ///
    /// The reveal is published immediately; the claim itself is committed
    /// after the configured reveal delay by a background task.
    pub async fn reveal_and_assign(
        &self,
        round_id: &str,
        participant_id: &str,
        dish_id: &str,
    ) -> GameResult<CurrentReveal> {
        let round = self.require_round(round_id).await?;
        if !round.is_participant(participant_id) {
            return Err(GameError::Precondition(format!(
                "{} does not play in round {}",
                participant_id, round_id
            )));
        }

        let dish = self
            .store
            .get_dish(dish_id)
            .await?
            .ok_or_else(|| GameError::NotFound(format!("Dish {}", dish_id)))?;
        if dish.category_id != round.category_id || !dish.active {
            return Err(GameError::Precondition(format!(
                "Dish {} is not in play for this round",
                dish_id
            )));
        }

        let reveal = CurrentReveal {
            dish_id: dish_id.to_string(),
            participant_id: participant_id.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let guard = [
            Precondition::StatusIs(RoundStatus::Active),
            Precondition::CurrentTurnIs(participant_id.to_string()),
            Precondition::ParticipantWithoutDish(participant_id.to_string()),
            Precondition::DishUnclaimed(dish_id.to_string()),
            Precondition::NoRevealInFlight,
        ];
        self.store
            .update_round(
                round_id,
                &guard,
                RoundPatch::new().with(RoundWrite::Reveal(Some(reveal.clone()))),
            )
            .await
            .inspect_err(|e| tracing::warn!("Reveal rejected in round {}: {}", round_id, e))?;
        tracing::info!(
            "{} revealed {} in round {}",
            participant_id,
            dish_id,
            round_id
        );

        let state = self.clone();
        let delay = self.config.reveal_delay;
        let (rid, pid, did) = (
            round_id.to_string(),
            participant_id.to_string(),
            dish_id.to_string(),
        );
        // Held across the spawn so the task cannot deregister before it is registered
        let mut pending = self.pending_reveals.lock().await;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = state.commit_reveal(&rid, &pid, &did).await {
                tracing::error!("Failed to commit reveal in round {}: {}", rid, e);
            }
            let mut pending = state.pending_reveals.lock().await;
            if pending.get(&rid).is_some_and(|p| p.participant_id == pid) {
                pending.remove(&rid);
            }
        });
        pending.insert(
            round_id.to_string(),
            PendingReveal {
                participant_id: participant_id.to_string(),
                handle: task.abort_handle(),
            },
        );

        Ok(reveal)
    }

    /// Claim the revealed dish, clear the reveal and pass the turn on, as one write
    pub async fn commit_reveal(
        &self,
        round_id: &str,
        participant_id: &str,
        dish_id: &str,
    ) -> GameResult<Round> {
        let round = self.require_round(round_id).await?;
        let next = round.next_in_turn_order(participant_id);

        let guard = [
            Precondition::StatusIs(RoundStatus::Active),
            Precondition::RevealIs {
                participant_id: participant_id.to_string(),
                dish_id: dish_id.to_string(),
            },
            Precondition::CurrentTurnIs(participant_id.to_string()),
            Precondition::ParticipantWithoutDish(participant_id.to_string()),
            Precondition::DishUnclaimed(dish_id.to_string()),
        ];
        let patch = RoundPatch::new()
            .with(RoundWrite::ParticipantDish {
                participant_id: participant_id.to_string(),
                dish_id: dish_id.to_string(),
            })
            .with(RoundWrite::Reveal(None))
            .with(RoundWrite::CurrentTurn(next));

        match self.store.update_round(round_id, &guard, patch).await {
            Ok(round) => {
                tracing::info!(
                    "{} claimed {} in round {}, turn passes to {:?}",
                    participant_id,
                    dish_id,
                    round_id,
                    round.current_turn
                );
                Ok(round)
            }
            Err(e) => {
                // Drop our own stale reveal so the turn is not stuck
                if let Err(cleanup) = self
                    .store
                    .update_round(
                        round_id,
                        &[Precondition::RevealIs {
                            participant_id: participant_id.to_string(),
                            dish_id: dish_id.to_string(),
                        }],
                        RoundPatch::new().with(RoundWrite::Reveal(None)),
                    )
                    .await
                {
                    match cleanup {
                        // Already cleared, or the round is gone
                        StoreError::PreconditionFailed(_) | StoreError::NotFound(_) => {}
                        other => tracing::warn!(
                            "Failed to clear stale reveal by {} in round {}: {}",
                            participant_id,
                            round_id,
                            other
                        ),
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Abort a delayed claim that has not fired yet
    pub async fn cancel_reveal(&self, round_id: &str) -> bool {
        match self.pending_reveals.lock().await.remove(round_id) {
            Some(pending) => {
                pending.handle.abort();
                tracing::info!("Cancelled pending reveal in round {}", round_id);
                true
            }
            None => false,
        }
    }

    /// Whether every participant holds a dish
    pub async fn all_dishes_assigned(&self, round_id: &str) -> GameResult<bool> {
        Ok(self.require_round(round_id).await?.all_dishes_assigned())
    }
}

fn build_view(round: &Round, dishes: &HashMap<DishId, Dish>) -> RoundView {
    let claimed_by: HashMap<&str, &str> = round
        .participants
        .iter()
        .filter_map(|p| p.dish_id.as_deref().map(|d| (d, p.id.as_str())))
        .collect();
    let revealing = round.current_reveal.as_ref().map(|r| r.dish_id.as_str());

    let card = |dish_id: &str| DishCard {
        dish_id: dish_id.to_string(),
        name: dish_display_name(dishes, dish_id),
        revealed: claimed_by.contains_key(dish_id) || revealing == Some(dish_id),
        claimed_by: claimed_by.get(dish_id).map(|p| p.to_string()),
    };

    let cards = round
        .dish_order
        .iter()
        .flatten()
        .filter(|id| dishes.contains_key(*id) || claimed_by.contains_key(id.as_str()))
        .map(|id| card(id))
        .collect();

    let order_index = |id: &str| {
        round
            .dish_order
            .as_ref()
            .and_then(|order| order.iter().position(|d| d == id))
            .unwrap_or(usize::MAX)
    };
    let mut pool = available_pool(round, dishes);
    pool.sort_by_key(|d| order_index(&d.id));
    let available = pool.into_iter().map(|d| card(&d.id)).collect();

    let assignments = round
        .participants
        .iter()
        .map(|p| ParticipantAssignment {
            participant_id: p.id.clone(),
            name: format_dish_name(&p.name),
            dish_name: p.dish_id.as_deref().map(|d| dish_display_name(dishes, d)),
        })
        .collect();

    let current_turn_name = round
        .current_turn
        .as_deref()
        .and_then(|id| round.participant(id))
        .map(|p| format_dish_name(&p.name));

    RoundView {
        round_id: round.id.clone(),
        date: round.date,
        status: round.status,
        phase: round.turn_phase(),
        current_turn: round.current_turn.clone(),
        current_turn_name,
        current_reveal: round.current_reveal.clone(),
        cards,
        available,
        assignments,
        evaluation_status: round.evaluation_status,
    }
}
