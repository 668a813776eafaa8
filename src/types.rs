use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Opaque ID types for type safety
pub type RoundId = String;
pub type ParticipantId = String;
pub type DishId = String;
pub type CategoryId = String;
pub type UserId = String;
pub type HistoryId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Pending,
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Where a round stands in the dish assignment part of the game
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TurnPhase {
    AwaitingTurnOrder,
    AssigningDishes,
    AllDishesAssigned,
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// How long a revealed card stays face up before the dish is claimed
    pub reveal_delay: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            reveal_delay: Duration::from_secs(3),
        }
    }
}

/// A rating on the 1..=5 scale
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(format!(
                "score {} is outside {}..={}",
                value,
                Self::MIN,
                Self::MAX
            ))
        }
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dish {
    pub id: DishId,
    pub name: String,
    pub category_id: CategoryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub difficulty: Difficulty,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    /// Join code a participant connects with
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub email: String,
    /// Set exactly once, when the participant's reveal is committed
    #[serde(default)]
    pub dish_id: Option<DishId>,
}

/// A card that is face up but not yet claimed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentReveal {
    pub dish_id: DishId,
    pub participant_id: ParticipantId,
    /// Unix milliseconds
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub presentation_score: Score,
    pub taste_score: Score,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Label of the evaluator as shown to other participants (their email)
    pub evaluated_by: String,
}

/// All ratings one evaluator gave, keyed by the evaluated participant
pub type EvaluationBlock = HashMap<ParticipantId, Evaluation>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub id: RoundId,
    pub date: NaiveDate,
    pub category_id: CategoryId,
    pub status: RoundStatus,
    #[serde(default)]
    pub turn_order: Vec<ParticipantId>,
    #[serde(default)]
    pub current_turn: Option<ParticipantId>,
    #[serde(default)]
    pub dish_order: Option<Vec<DishId>>,
    #[serde(default)]
    pub current_reveal: Option<CurrentReveal>,
    /// In insertion order
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub evaluations: HashMap<ParticipantId, EvaluationBlock>,
    #[serde(default)]
    pub evaluation_status: Option<EvaluationStatus>,
    #[serde(default)]
    pub saved_to_history: bool,
    pub created_at: String,
}

impl Round {
    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participant_mut(&mut self, id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    pub fn participant_ids(&self) -> Vec<ParticipantId> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }

    pub fn is_participant(&self, id: &str) -> bool {
        self.participant(id).is_some()
    }

    pub fn is_dish_claimed(&self, dish_id: &str) -> bool {
        self.participants
            .iter()
            .any(|p| p.dish_id.as_deref() == Some(dish_id))
    }

    pub fn all_dishes_assigned(&self) -> bool {
        !self.participants.is_empty()
            && self
                .participants
                .iter()
                .all(|p| p.dish_id.as_deref().is_some_and(|d| !d.is_empty()))
    }

    pub fn turn_phase(&self) -> TurnPhase {
        if self.turn_order.is_empty() || self.current_turn.is_none() {
            TurnPhase::AwaitingTurnOrder
        } else if self.all_dishes_assigned() {
            TurnPhase::AllDishesAssigned
        } else {
            TurnPhase::AssigningDishes
        }
    }

    /// The id that follows `id` in the turn order, wrapping after the last one
    pub fn next_in_turn_order(&self, id: &str) -> Option<ParticipantId> {
        let index = self.turn_order.iter().position(|p| p == id)?;
        let next = (index + 1) % self.turn_order.len();
        self.turn_order.get(next).cloned()
    }
}

/// Aggregated outcome for one participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParticipantScore {
    pub participant_id: ParticipantId,
    pub name: String,
    pub dish_name: String,
    pub presentation_avg: f64,
    pub taste_avg: f64,
    pub average_score: f64,
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalScores {
    pub presentation: f64,
    pub taste: f64,
    pub average: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalParticipant {
    pub name: String,
    pub dish_name: String,
    pub scores: HistoricalScores,
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Winner {
    pub name: String,
    pub dish_name: String,
    pub score: f64,
}

/// Immutable snapshot of a completed round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalRound {
    pub date: NaiveDate,
    pub category_name: String,
    pub participants: BTreeMap<ParticipantId, HistoricalParticipant>,
    pub winner: Winner,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    pub id: HistoryId,
    #[serde(flatten)]
    pub round: HistoricalRound,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Participant,
    Viewer,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_with(participants: &[(&str, Option<&str>)]) -> Round {
        Round {
            id: "r1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            category_id: "mexicana".to_string(),
            status: RoundStatus::Active,
            turn_order: participants.iter().map(|(id, _)| id.to_string()).collect(),
            current_turn: participants.first().map(|(id, _)| id.to_string()),
            dish_order: None,
            current_reveal: None,
            participants: participants
                .iter()
                .map(|(id, dish)| Participant {
                    id: id.to_string(),
                    name: id.to_string(),
                    email: format!("{}@example.com", id),
                    dish_id: dish.map(|d| d.to_string()),
                })
                .collect(),
            evaluations: HashMap::new(),
            evaluation_status: None,
            saved_to_history: false,
            created_at: "2024-05-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_score_range() {
        assert!(Score::try_from(0).is_err());
        assert_eq!(Score::try_from(1).unwrap().value(), 1);
        assert_eq!(Score::try_from(5).unwrap().value(), 5);
        assert!(Score::try_from(6).is_err());
    }

    #[test]
    fn test_score_rejected_on_deserialize() {
        let json = r#"{"presentation_score":7,"taste_score":3,"evaluated_by":"a@b.c"}"#;
        assert!(serde_json::from_str::<Evaluation>(json).is_err());
    }

    #[test]
    fn test_next_in_turn_order_wraps() {
        let round = round_with(&[("a", None), ("b", None), ("c", None)]);
        assert_eq!(round.next_in_turn_order("a").as_deref(), Some("b"));
        assert_eq!(round.next_in_turn_order("c").as_deref(), Some("a"));
        assert_eq!(round.next_in_turn_order("zzz"), None);
    }

    #[test]
    fn test_turn_phase() {
        let mut round = round_with(&[("a", Some("d1")), ("b", None)]);
        assert_eq!(round.turn_phase(), TurnPhase::AssigningDishes);
        assert!(round.is_dish_claimed("d1"));
        assert!(!round.is_dish_claimed("d2"));

        round.participant_mut("b").unwrap().dish_id = Some("d2".to_string());
        assert_eq!(round.turn_phase(), TurnPhase::AllDishesAssigned);

        round.turn_order.clear();
        assert_eq!(round.turn_phase(), TurnPhase::AwaitingTurnOrder);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&RoundStatus::Active).unwrap(),
            "\"active\""
        );
        assert_eq!(
            serde_json::to_string(&TurnPhase::AllDishesAssigned).unwrap(),
            "\"all-dishes-assigned\""
        );
    }
}
