use super::evaluation::{compute_scores, evaluations_complete};
use super::{AppState, GameError, GameResult};
use crate::store::{Precondition, RoundPatch, RoundWrite, StoreError};
use crate::types::*;
use std::collections::BTreeMap;

const UNKNOWN_CATEGORY: &str = "Unknown category";

fn historical_round(
    round: &Round,
    category_name: String,
    scores: &[ParticipantScore],
) -> GameResult<HistoricalRound> {
    let top = scores
        .first()
        .ok_or_else(|| GameError::Validation("Cannot archive a round without scores".to_string()))?;

    let participants: BTreeMap<ParticipantId, HistoricalParticipant> = scores
        .iter()
        .map(|score| {
            (
                score.participant_id.clone(),
                HistoricalParticipant {
                    name: score.name.clone(),
                    dish_name: score.dish_name.clone(),
                    scores: HistoricalScores {
                        presentation: score.presentation_avg,
                        taste: score.taste_avg,
                        average: score.average_score,
                    },
                    comments: score.comments.clone(),
                },
            )
        })
        .collect();

    Ok(HistoricalRound {
        date: round.date,
        category_name,
        participants,
        winner: Winner {
            name: top.name.clone(),
            dish_name: top.dish_name.clone(),
            score: top.average_score,
        },
    })
}

impl AppState {
    /// Append a snapshot of `round` to the history log, at most once.
    ///
    /// Returns `None` when the round was already archived. The
    /// `saved_to_history` flag is claimed before the append and released
    /// again if the append fails.
    pub async fn archive(
        &self,
        round: &Round,
        scores: &[ParticipantScore],
    ) -> GameResult<Option<HistoryId>> {
        if round.saved_to_history {
            return Ok(None);
        }
        let category_name = match self.store.get_category(&round.category_id).await? {
            Some(category) => category.name,
            None => UNKNOWN_CATEGORY.to_string(),
        };
        let entry = historical_round(round, category_name, scores)?;

        let claim = self
            .store
            .update_round(
                &round.id,
                &[Precondition::SavedToHistoryIs(false)],
                RoundPatch::new().with(RoundWrite::SavedToHistory(true)),
            )
            .await;
        match claim {
            Ok(_) => {}
            Err(StoreError::PreconditionFailed(_)) => {
                tracing::debug!("Round {} already archived", round.id);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        match self.store.append_history(entry).await {
            Ok(id) => {
                tracing::info!("Archived round {} as {}", round.id, id);
                Ok(Some(id))
            }
            Err(e) => {
                tracing::error!("Failed to archive round {}: {}", round.id, e);
                if let Err(rollback) = self
                    .store
                    .update_round(
                        &round.id,
                        &[],
                        RoundPatch::new().with(RoundWrite::SavedToHistory(false)),
                    )
                    .await
                {
                    tracing::error!(
                        "Failed to release archive flag on round {}: {}",
                        round.id,
                        rollback
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Complete a fully evaluated round and archive it.
    ///
    /// Calling this again on a finished round is a no-op.
    pub async fn finalize_round(&self, round_id: &str) -> GameResult<Round> {
        let mut round = self.require_round(round_id).await?;
        if round.status == RoundStatus::Completed && round.saved_to_history {
            return Ok(round);
        }
        if round.status == RoundStatus::Pending {
            return Err(GameError::Precondition(format!(
                "Round {} has not started",
                round_id
            )));
        }
        if !evaluations_complete(&round) {
            return Err(GameError::Precondition(format!(
                "Round {} is still waiting for evaluations",
                round_id
            )));
        }

        if round.status == RoundStatus::Active {
            match self
                .store
                .update_round(
                    round_id,
                    &[Precondition::StatusIs(RoundStatus::Active)],
                    RoundPatch::new().with(RoundWrite::Status(RoundStatus::Completed)),
                )
                .await
            {
                Ok(updated) => {
                    tracing::info!("Round {} completed", round_id);
                    round = updated;
                }
                // Finished concurrently
                Err(StoreError::PreconditionFailed(_)) => {
                    round = self.require_round(round_id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let dishes = self.dishes_by_id().await?;
        let scores = compute_scores(&round, &dishes);
        self.archive(&round, &scores).await?;
        self.require_round(round_id).await
    }

    /// Archived rounds, most recent date first
    pub async fn list_history(&self) -> GameResult<Vec<HistoryRecord>> {
        let mut history = self.store.list_history().await?;
        history.sort_by(|a, b| b.round.date.cmp(&a.round.date).then_with(|| b.id.cmp(&a.id)));
        Ok(history)
    }
}
