use super::{AppState, GameError, GameResult};
use crate::store::{Precondition, RoundPatch, RoundWrite};
use crate::types::*;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Admin input for a new round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoundRequest {
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub participant_ids: Vec<UserId>,
    pub category_id: Option<CategoryId>,
}

impl AppState {
    /// Create a pending round; turn order follows the supplied participant order
    pub async fn create_round(&self, request: CreateRoundRequest) -> GameResult<Round> {
        let date = request
            .date
            .ok_or_else(|| GameError::Validation("Round date is required".to_string()))?;
        let category_id = request
            .category_id
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| GameError::Validation("Round category is required".to_string()))?;
        if request.participant_ids.is_empty() {
            return Err(GameError::Validation(
                "A round needs at least one participant".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for id in &request.participant_ids {
            if !seen.insert(id.as_str()) {
                return Err(GameError::Validation(format!(
                    "Participant {} listed twice",
                    id
                )));
            }
        }

        if self.store.get_category(&category_id).await?.is_none() {
            return Err(GameError::Validation(format!(
                "Unknown category {}",
                category_id
            )));
        }

        let mut participants = Vec::with_capacity(request.participant_ids.len());
        for id in &request.participant_ids {
            let user = self
                .store
                .get_user(id)
                .await?
                .ok_or_else(|| GameError::Validation(format!("Unknown user {}", id)))?;
            participants.push(Participant {
                id: user.id,
                name: user.name,
                email: user.email,
                dish_id: None,
            });
        }

        let round = Round {
            id: self.round_ids.next_id(),
            date,
            category_id,
            status: RoundStatus::Pending,
            turn_order: request.participant_ids.clone(),
            current_turn: request.participant_ids.first().cloned(),
            dish_order: None,
            current_reveal: None,
            participants,
            evaluations: HashMap::new(),
            evaluation_status: None,
            saved_to_history: false,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        self.store.insert_round(round.clone()).await?;
        tracing::info!(
            "Created round {} for {} with {} participants",
            round.id,
            round.date,
            round.participants.len()
        );
        Ok(round)
    }

    /// Move a pending round to active.
    ///
    /// Rejected when the round is not pending, or when one of its
    /// participants already plays in another active round.
    pub async fn activate_round(&self, round_id: &str) -> GameResult<Round> {
        let _activation = self.activation.lock().await;
        let round = self.require_round(round_id).await?;
        if round.status != RoundStatus::Pending {
            return Err(GameError::Precondition(format!(
                "Round {} is {:?}, only pending rounds can be activated",
                round_id, round.status
            )));
        }

        let busy: Vec<String> = self
            .store
            .list_rounds()
            .await?
            .into_iter()
            .filter(|other| other.id != round.id && other.status == RoundStatus::Active)
            .flat_map(|other| other.participant_ids())
            .filter(|id| round.is_participant(id))
            .collect();
        if !busy.is_empty() {
            return Err(GameError::Precondition(format!(
                "Already playing in another active round: {}",
                busy.join(", ")
            )));
        }

        let round = self
            .store
            .update_round(
                round_id,
                &[Precondition::StatusIs(RoundStatus::Pending)],
                RoundPatch::new().with(RoundWrite::Status(RoundStatus::Active)),
            )
            .await?;
        tracing::info!("Activated round {}", round_id);
        Ok(round)
    }

    /// Remove a round in any status, without archiving it
    pub async fn delete_round(&self, round_id: &str) -> GameResult<()> {
        self.require_round(round_id).await?;
        self.cancel_reveal(round_id).await;
        self.store.delete_round(round_id).await?;
        tracing::info!("Deleted round {}", round_id);
        Ok(())
    }

    pub async fn list_rounds(&self) -> GameResult<Vec<Round>> {
        Ok(self.store.list_rounds().await?)
    }

    /// The active round a participant plays in, if any
    pub async fn active_round_for(&self, participant_id: &str) -> GameResult<Option<Round>> {
        Ok(self
            .store
            .list_rounds()
            .await?
            .into_iter()
            .find(|r| r.status == RoundStatus::Active && r.is_participant(participant_id)))
    }
}
