//! Peer evaluation: collecting rating blocks, detecting completion and
//! ranking participants.

use super::turn::dish_display_name;
use super::{AppState, GameError, GameResult};
use crate::store::{Precondition, RoundPatch, RoundWrite};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One rating as submitted by a client, before range checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingInput {
    pub presentation_score: u8,
    pub taste_score: u8,
    #[serde(default)]
    pub comments: Option<String>,
}

/// True once every participant rated every other participant exactly once.
///
/// Requires both that each participant received N-1 ratings and that all N
/// participants authored a complete block.
pub fn evaluations_complete(round: &Round) -> bool {
    let n = round.participants.len();
    if n == 0 {
        return false;
    }
    let ids: HashSet<&str> = round.participants.iter().map(|p| p.id.as_str()).collect();

    let full_blocks = round
        .evaluations
        .iter()
        .filter(|(evaluator, block)| {
            ids.contains(evaluator.as_str())
                && block.len() == n - 1
                && block
                    .keys()
                    .all(|rated| rated != *evaluator && ids.contains(rated.as_str()))
        })
        .count();

    let every_rated = round.participants.iter().all(|p| {
        let raters = round
            .evaluations
            .iter()
            .filter(|(evaluator, block)| **evaluator != p.id && block.contains_key(&p.id))
            .count();
        raters == n - 1
    });

    every_rated && full_blocks == n
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Per-participant averages, best first.
///
/// `average_score` is the mean of the presentation average and the taste
/// average. Ties are ordered by turn order position.
pub fn compute_scores(round: &Round, dishes: &HashMap<DishId, Dish>) -> Vec<ParticipantScore> {
    let mut scores: Vec<ParticipantScore> = round
        .participants
        .iter()
        .map(|participant| {
            // Evaluators in round order
            let received: Vec<&Evaluation> = round
                .participants
                .iter()
                .filter(|evaluator| evaluator.id != participant.id)
                .filter_map(|evaluator| round.evaluations.get(&evaluator.id))
                .filter_map(|block| block.get(&participant.id))
                .collect();

            let presentation: Vec<f64> = received
                .iter()
                .map(|e| f64::from(e.presentation_score.value()))
                .collect();
            let taste: Vec<f64> = received
                .iter()
                .map(|e| f64::from(e.taste_score.value()))
                .collect();
            let presentation_avg = mean(&presentation);
            let taste_avg = mean(&taste);

            ParticipantScore {
                participant_id: participant.id.clone(),
                name: participant.name.clone(),
                dish_name: participant
                    .dish_id
                    .as_deref()
                    .map(|d| dish_display_name(dishes, d))
                    .unwrap_or_default(),
                presentation_avg,
                taste_avg,
                average_score: (presentation_avg + taste_avg) / 2.0,
                comments: received
                    .iter()
                    .filter_map(|e| e.comments.clone())
                    .collect(),
            }
        })
        .collect();

    let position = |id: &str| {
        round
            .turn_order
            .iter()
            .position(|p| p == id)
            .unwrap_or(usize::MAX)
    };
    scores.sort_by(|a, b| {
        b.average_score
            .total_cmp(&a.average_score)
            .then_with(|| position(&a.participant_id).cmp(&position(&b.participant_id)))
    });
    scores
}

impl AppState {
    /// Open the evaluation phase once every participant holds a dish
    pub async fn start_evaluation(&self, round_id: &str) -> GameResult<Round> {
        let round = self.require_round(round_id).await?;
        if round.status != RoundStatus::Active {
            return Err(GameError::Precondition(format!(
                "Round {} is not active",
                round_id
            )));
        }
        if !round.all_dishes_assigned() {
            return Err(GameError::Precondition(
                "Every participant needs a dish before evaluating".to_string(),
            ));
        }
        if round.evaluation_status.is_some() {
            return Ok(round);
        }

        let round = self
            .store
            .update_round(
                round_id,
                &[Precondition::StatusIs(RoundStatus::Active)],
                RoundPatch::new().with(RoundWrite::EvaluationStatus(EvaluationStatus::Pending)),
            )
            .await?;
        tracing::info!("Evaluation opened for round {}", round_id);
        Ok(round)
    }

    /// Store an evaluator's complete block of ratings.
    ///
    /// The block must rate every other participant and can only be written
    /// once per evaluator.
    pub async fn submit_evaluations(
        &self,
        round_id: &str,
        evaluator_id: &str,
        ratings: HashMap<ParticipantId, RatingInput>,
    ) -> GameResult<Round> {
        let round = self.require_round(round_id).await?;
        if round.status != RoundStatus::Active || round.evaluation_status.is_none() {
            return Err(GameError::Precondition(format!(
                "Round {} is not accepting evaluations",
                round_id
            )));
        }
        let evaluator = round.participant(evaluator_id).ok_or_else(|| {
            GameError::Precondition(format!(
                "{} does not play in round {}",
                evaluator_id, round_id
            ))
        })?;
        if round.evaluations.contains_key(evaluator_id) {
            return Err(GameError::Precondition(format!(
                "Evaluations from {} were already submitted",
                evaluator_id
            )));
        }
        if ratings.contains_key(evaluator_id) {
            return Err(GameError::Validation(
                "Participants cannot evaluate themselves".to_string(),
            ));
        }

        let expected: HashSet<&str> = round
            .participants
            .iter()
            .map(|p| p.id.as_str())
            .filter(|id| *id != evaluator_id)
            .collect();
        let given: HashSet<&str> = ratings.keys().map(|k| k.as_str()).collect();
        if let Some(unknown) = given.difference(&expected).next() {
            return Err(GameError::Validation(format!(
                "{} does not play in this round",
                unknown
            )));
        }
        if let Some(missing) = expected.difference(&given).next() {
            return Err(GameError::Validation(format!(
                "Missing rating for {}",
                missing
            )));
        }

        let label = if evaluator.email.is_empty() {
            evaluator.name.clone()
        } else {
            evaluator.email.clone()
        };
        let mut block = EvaluationBlock::new();
        for (participant_id, rating) in ratings {
            let presentation_score =
                Score::try_from(rating.presentation_score).map_err(GameError::Validation)?;
            let taste_score = Score::try_from(rating.taste_score).map_err(GameError::Validation)?;
            block.insert(
                participant_id,
                Evaluation {
                    presentation_score,
                    taste_score,
                    comments: rating
                        .comments
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty()),
                    evaluated_by: label.clone(),
                },
            );
        }

        let guard = [
            Precondition::StatusIs(RoundStatus::Active),
            Precondition::NoEvaluationFrom(evaluator_id.to_string()),
        ];
        let mut round = self
            .store
            .update_round(
                round_id,
                &guard,
                RoundPatch::new().with(RoundWrite::EvaluationBlock {
                    evaluator_id: evaluator_id.to_string(),
                    block,
                }),
            )
            .await
            .inspect_err(|e| {
                tracing::warn!("Evaluations from {} rejected: {}", evaluator_id, e)
            })?;
        tracing::info!(
            "{} submitted evaluations for round {} ({}/{})",
            evaluator_id,
            round_id,
            round.evaluations.len(),
            round.participants.len()
        );

        if evaluations_complete(&round) && round.evaluation_status != Some(EvaluationStatus::Completed)
        {
            round = self
                .store
                .update_round(
                    round_id,
                    &[],
                    RoundPatch::new()
                        .with(RoundWrite::EvaluationStatus(EvaluationStatus::Completed)),
                )
                .await?;
            tracing::info!("All evaluations in for round {}", round_id);
        }

        Ok(round)
    }

    /// Ranking for a round whose evaluations are complete
    pub async fn round_results(&self, round_id: &str) -> GameResult<Vec<ParticipantScore>> {
        let round = self.require_round(round_id).await?;
        if !evaluations_complete(&round) {
            return Err(GameError::Precondition(
                "Results are available once everyone has evaluated".to_string(),
            ));
        }
        let dishes = self.dishes_by_id().await?;
        Ok(compute_scores(&round, &dishes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    fn block(entries: &[(&str, u8, u8)]) -> EvaluationBlock {
        entries
            .iter()
            .map(|(id, p, t)| {
                (
                    id.to_string(),
                    Evaluation {
                        presentation_score: Score::try_from(*p).unwrap(),
                        taste_score: Score::try_from(*t).unwrap(),
                        comments: None,
                        evaluated_by: "x".to_string(),
                    },
                )
            })
            .collect()
    }

    async fn evaluating_round(state: &AppState) -> Round {
        let round = active_round(state).await;
        assign_all(state, &round.id, &[("a", "d1"), ("b", "d2"), ("c", "d3")]).await;
        state.start_evaluation(&round.id).await.unwrap()
    }

    fn ratings(entries: &[(&str, u8, u8)]) -> HashMap<ParticipantId, RatingInput> {
        entries
            .iter()
            .map(|(id, p, t)| (id.to_string(), rating(*p, *t, None)))
            .collect()
    }

    #[test]
    fn test_average_weights_criteria_equally() {
        let mut round = bare_round(&["a", "b", "c"]);
        round.evaluations.insert("b".to_string(), block(&[("a", 5, 1), ("c", 3, 3)]));
        round.evaluations.insert("c".to_string(), block(&[("a", 3, 1), ("b", 4, 4)]));
        round.evaluations.insert("a".to_string(), block(&[("b", 2, 2), ("c", 5, 5)]));

        let scores = compute_scores(&round, &HashMap::new());
        let a = scores.iter().find(|s| s.participant_id == "a").unwrap();
        assert_eq!(a.presentation_avg, 4.0);
        assert_eq!(a.taste_avg, 1.0);
        assert_eq!(a.average_score, 2.5);

        // c: (3+5)/2 = 4, (3+5)/2 = 4 -> 4; b: 3, 3 -> 3; a: 2.5
        let order: Vec<_> = scores.iter().map(|s| s.participant_id.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_ties_follow_turn_order() {
        let mut round = bare_round(&["a", "b"]);
        round.turn_order = vec!["b".to_string(), "a".to_string()];
        round.evaluations.insert("a".to_string(), block(&[("b", 4, 4)]));
        round.evaluations.insert("b".to_string(), block(&[("a", 4, 4)]));

        let scores = compute_scores(&round, &HashMap::new());
        assert_eq!(scores[0].participant_id, "b");
        assert_eq!(scores[1].participant_id, "a");
    }

    #[test]
    fn test_comments_follow_evaluator_order() {
        let ids = ["a", "b", "c", "d", "e"];
        let mut round = bare_round(&ids);
        // Insert in reverse so map order cannot line up by accident
        for evaluator in ids.iter().rev() {
            let mut evaluations = block(&[("a", 3, 3)]);
            if let Some(e) = evaluations.get_mut("a") {
                e.comments = Some(format!("from {}", evaluator));
            }
            if *evaluator != "a" {
                round.evaluations.insert(evaluator.to_string(), evaluations);
            }
        }

        let scores = compute_scores(&round, &HashMap::new());
        let a = scores.iter().find(|s| s.participant_id == "a").unwrap();
        assert_eq!(a.comments, vec!["from b", "from c", "from d", "from e"]);
    }

    #[test]
    fn test_completion_requires_both_conditions() {
        let mut round = bare_round(&["a", "b", "c"]);
        assert!(!evaluations_complete(&round));

        // Three evaluators, but one block is partial
        round.evaluations.insert("a".to_string(), block(&[("b", 3, 3), ("c", 3, 3)]));
        round.evaluations.insert("b".to_string(), block(&[("a", 3, 3), ("c", 3, 3)]));
        round.evaluations.insert("c".to_string(), block(&[("a", 3, 3)]));
        assert!(!evaluations_complete(&round));

        round.evaluations.insert("c".to_string(), block(&[("a", 3, 3), ("b", 3, 3)]));
        assert!(evaluations_complete(&round));
    }

    #[test]
    fn test_completion_ignores_blocks_from_outsiders() {
        let mut round = bare_round(&["a", "b"]);
        round.evaluations.insert("a".to_string(), block(&[("b", 3, 3)]));
        round.evaluations.insert("zed".to_string(), block(&[("a", 3, 3)]));
        assert!(!evaluations_complete(&round));
    }

    #[tokio::test]
    async fn test_start_evaluation_requires_all_dishes() {
        let state = seeded_state().await;
        let round = active_round(&state).await;
        assign_all(&state, &round.id, &[("a", "d1")]).await;

        assert!(matches!(
            state.start_evaluation(&round.id).await,
            Err(GameError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_before_evaluation_opens() {
        let state = seeded_state().await;
        let round = active_round(&state).await;
        let result = state
            .submit_evaluations(&round.id, "a", ratings(&[("b", 3, 3), ("c", 3, 3)]))
            .await;
        assert!(matches!(result, Err(GameError::Precondition(_))));
    }

    #[tokio::test]
    async fn test_partial_submission_rejected() {
        let state = seeded_state().await;
        let round = evaluating_round(&state).await;

        let result = state
            .submit_evaluations(&round.id, "a", ratings(&[("b", 3, 3)]))
            .await;
        assert!(matches!(result, Err(GameError::Validation(_))));
        assert!(state
            .require_round(&round.id)
            .await
            .unwrap()
            .evaluations
            .is_empty());
    }

    #[tokio::test]
    async fn test_self_rating_and_range_rejected() {
        let state = seeded_state().await;
        let round = evaluating_round(&state).await;

        let result = state
            .submit_evaluations(
                &round.id,
                "a",
                ratings(&[("a", 3, 3), ("b", 3, 3), ("c", 3, 3)]),
            )
            .await;
        assert!(matches!(result, Err(GameError::Validation(_))));

        let result = state
            .submit_evaluations(&round.id, "a", ratings(&[("b", 6, 3), ("c", 3, 3)]))
            .await;
        assert!(matches!(result, Err(GameError::Validation(_))));

        let result = state
            .submit_evaluations(&round.id, "a", ratings(&[("b", 0, 3), ("c", 3, 3)]))
            .await;
        assert!(matches!(result, Err(GameError::Validation(_))));
    }

    #[tokio::test]
    async fn test_resubmission_rejected_and_data_kept() {
        let state = seeded_state().await;
        let round = evaluating_round(&state).await;

        state
            .submit_evaluations(&round.id, "a", ratings(&[("b", 5, 5), ("c", 4, 4)]))
            .await
            .unwrap();
        let before = state.require_round(&round.id).await.unwrap();

        let result = state
            .submit_evaluations(&round.id, "a", ratings(&[("b", 1, 1), ("c", 1, 1)]))
            .await;
        assert!(matches!(result, Err(GameError::Precondition(_))));
        assert_eq!(
            state.require_round(&round.id).await.unwrap().evaluations,
            before.evaluations
        );
    }

    #[tokio::test]
    async fn test_outsider_cannot_evaluate() {
        let state = seeded_state().await;
        let round = evaluating_round(&state).await;
        let result = state
            .submit_evaluations(&round.id, "zed", ratings(&[("a", 3, 3)]))
            .await;
        assert!(matches!(result, Err(GameError::Precondition(_))));
    }

    #[tokio::test]
    async fn test_last_block_completes_evaluation() {
        let state = seeded_state().await;
        let round = evaluating_round(&state).await;

        state
            .submit_evaluations(&round.id, "a", ratings(&[("b", 5, 5), ("c", 4, 4)]))
            .await
            .unwrap();
        state
            .submit_evaluations(&round.id, "b", ratings(&[("a", 3, 3), ("c", 4, 4)]))
            .await
            .unwrap();
        assert!(state.round_results(&round.id).await.is_err());

        let mut last = ratings(&[("a", 2, 2)]);
        last.insert("b".to_string(), rating(5, 4, Some("  delicioso ")));
        let round = state.submit_evaluations(&round.id, "c", last).await.unwrap();
        assert_eq!(round.evaluation_status, Some(EvaluationStatus::Completed));
        assert_eq!(
            round.evaluations["c"]["b"].comments.as_deref(),
            Some("delicioso")
        );
        assert_eq!(round.evaluations["c"]["b"].evaluated_by, "c@example.com");

        let results = state.round_results(&round.id).await.unwrap();
        assert_eq!(results[0].participant_id, "b");
        assert_eq!(results[0].average_score, 4.75);
        assert_eq!(results[0].dish_name, "D2");
        assert_eq!(results[0].comments, vec!["delicioso"]);
    }
}
