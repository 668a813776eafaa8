use chrono::NaiveDate;
use cookoff::broadcast::spawn_round_finalizer;
use cookoff::protocol::{ClientMessage, ServerMessage};
use cookoff::state::{AppState, RatingInput, RoundView};
use cookoff::types::{Difficulty, EvaluationStatus, RoundStatus, TurnPhase};
use cookoff::ws::handlers::handle_message;
use cookoff::ws::{Client, WsQuery};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

async fn seeded() -> Arc<AppState> {
    let state = Arc::new(AppState::in_memory());
    for (id, name) in [("ana", "Ana"), ("beto", "Beto"), ("carla", "Carla")] {
        state
            .register_user(id, name, &format!("{}@example.com", id), false)
            .await
            .expect("register user");
    }
    state.add_category("Mexicana").await.expect("add category");
    for dish in ["Pollo Asado", "Mole Poblano", "Tacos"] {
        state
            .add_dish(dish, "mexicana", None, Difficulty::Medium, true)
            .await
            .expect("add dish");
    }
    state
}

async fn start_round(state: &Arc<AppState>) -> String {
    let admin = Client::admin();
    let round = match handle_message(
        ClientMessage::AdminCreateRound {
            date: NaiveDate::from_ymd_opt(2024, 5, 1),
            participant_ids: vec!["ana".into(), "beto".into(), "carla".into()],
            category_id: Some("mexicana".into()),
        },
        &admin,
        state,
    )
    .await
    {
        Some(ServerMessage::RoundCreated { round }) => round,
        other => panic!("Expected RoundCreated, got {:?}", other),
    };

    let activated = handle_message(
        ClientMessage::AdminActivateRound {
            round_id: round.id.clone(),
        },
        &admin,
        state,
    )
    .await;
    assert!(matches!(activated, Some(ServerMessage::RoundUpdated { .. })));
    round.id
}

async fn observe(state: &Arc<AppState>, user: &str) -> RoundView {
    match handle_message(
        ClientMessage::ObserveRound { round_id: None },
        &Client::participant(user),
        state,
    )
    .await
    {
        Some(ServerMessage::RoundState(view)) => view,
        other => panic!("Expected RoundState, got {:?}", other),
    }
}

async fn reveal(state: &Arc<AppState>, round_id: &str, user: &str, dish: &str) {
    let result = handle_message(
        ClientMessage::RevealDish {
            round_id: round_id.to_string(),
            dish_id: dish.to_string(),
        },
        &Client::participant(user),
        state,
    )
    .await;
    match result {
        Some(ServerMessage::RevealStarted { reveal, .. }) => assert_eq!(reveal.dish_id, dish),
        other => panic!("Expected RevealStarted, got {:?}", other),
    }
    tokio::time::sleep(Duration::from_secs(4)).await;
}

fn ratings(entries: &[(&str, u8, u8)]) -> HashMap<String, RatingInput> {
    entries
        .iter()
        .map(|(id, presentation, taste)| {
            (
                id.to_string(),
                RatingInput {
                    presentation_score: *presentation,
                    taste_score: *taste,
                    comments: None,
                },
            )
        })
        .collect()
}

async fn submit(state: &Arc<AppState>, round_id: &str, user: &str, entries: &[(&str, u8, u8)]) {
    let result = handle_message(
        ClientMessage::SubmitEvaluations {
            round_id: round_id.to_string(),
            ratings: ratings(entries),
        },
        &Client::participant(user),
        state,
    )
    .await;
    assert!(
        matches!(result, Some(ServerMessage::EvaluationsAccepted { .. })),
        "unexpected {:?}",
        result
    );
}

/// Reveal every dish in turn and submit all evaluations
async fn play_through(state: &Arc<AppState>, round_id: &str) {
    let view = observe(state, "ana").await;
    assert_eq!(view.phase, TurnPhase::AssigningDishes);
    assert_eq!(view.cards.len(), 3);
    assert_eq!(view.current_turn.as_deref(), Some("ana"));

    reveal(state, round_id, "ana", "mole-poblano").await;
    assert_eq!(observe(state, "ana").await.current_turn.as_deref(), Some("beto"));
    reveal(state, round_id, "beto", "pollo-asado").await;
    assert_eq!(observe(state, "beto").await.current_turn.as_deref(), Some("carla"));
    reveal(state, round_id, "carla", "tacos").await;

    let view = observe(state, "carla").await;
    assert_eq!(view.phase, TurnPhase::AllDishesAssigned);
    assert!(view.available.is_empty());
    let claimed: HashSet<_> = view
        .cards
        .iter()
        .filter_map(|c| c.claimed_by.clone())
        .collect();
    assert_eq!(claimed.len(), 3);

    let started = handle_message(
        ClientMessage::StartEvaluation {
            round_id: round_id.to_string(),
        },
        &Client::participant("ana"),
        state,
    )
    .await;
    match started {
        Some(ServerMessage::RoundState(view)) => {
            assert_eq!(view.evaluation_status, Some(EvaluationStatus::Pending))
        }
        other => panic!("Expected RoundState, got {:?}", other),
    }

    submit(state, round_id, "ana", &[("beto", 4, 4), ("carla", 5, 5)]).await;
    submit(state, round_id, "beto", &[("ana", 3, 3), ("carla", 5, 4)]).await;
    submit(state, round_id, "carla", &[("ana", 2, 3), ("beto", 4, 5)]).await;
}

/// End-to-end flow: three participants, three dishes, one archived winner
#[tokio::test(start_paused = true)]
async fn test_full_round_flow() {
    let state = seeded().await;
    let round_id = start_round(&state).await;

    play_through(&state, &round_id).await;

    let round = state.require_round(&round_id).await.expect("round");
    assert_eq!(round.evaluation_status, Some(EvaluationStatus::Completed));
    assert_eq!(round.participant("ana").and_then(|p| p.dish_id.as_deref()), Some("mole-poblano"));

    let admin = Client::admin();
    let scores = match handle_message(
        ClientMessage::AdminFinishRound {
            round_id: round_id.clone(),
        },
        &admin,
        &state,
    )
    .await
    {
        Some(ServerMessage::Results { scores, .. }) => scores,
        other => panic!("Expected Results, got {:?}", other),
    };
    let ranking: Vec<_> = scores.iter().map(|s| s.participant_id.as_str()).collect();
    assert_eq!(ranking, vec!["carla", "beto", "ana"]);
    assert_eq!(scores[0].average_score, 4.75);
    assert_eq!(scores[1].average_score, 4.25);
    assert_eq!(scores[2].average_score, 2.75);

    // Finishing again does not archive twice
    handle_message(
        ClientMessage::AdminFinishRound {
            round_id: round_id.clone(),
        },
        &admin,
        &state,
    )
    .await;

    match handle_message(ClientMessage::GetHistory, &Client::viewer(), &state).await {
        Some(ServerMessage::History { entries }) => {
            assert_eq!(entries.len(), 1);
            let entry = &entries[0].round;
            assert_eq!(entry.category_name, "Mexicana");
            assert_eq!(entry.winner.name, "Carla");
            assert_eq!(entry.winner.dish_name, "Tacos");
            assert_eq!(entry.winner.score, 4.75);
            assert_eq!(entry.participants["ana"].dish_name, "Mole Poblano");
        }
        other => panic!("Expected History, got {:?}", other),
    }

    let round = state.require_round(&round_id).await.expect("round");
    assert_eq!(round.status, RoundStatus::Completed);
    assert!(round.saved_to_history);
}

#[tokio::test(start_paused = true)]
async fn test_finalizer_archives_without_admin() {
    let state = seeded().await;
    let finalizer = spawn_round_finalizer(state.clone());
    let round_id = start_round(&state).await;

    play_through(&state, &round_id).await;

    let mut archived = false;
    for _ in 0..50 {
        if state.list_history().await.expect("history").len() == 1 {
            archived = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(archived, "round was never archived");
    assert_eq!(
        state.require_round(&round_id).await.expect("round").status,
        RoundStatus::Completed
    );
    finalizer.abort();
}

#[tokio::test(start_paused = true)]
async fn test_racing_reveals_only_current_turn_wins() {
    let state = seeded().await;
    let round_id = start_round(&state).await;
    observe(&state, "ana").await;

    let (ana_client, beto_client) = (Client::participant("ana"), Client::participant("beto"));
    let (ana, beto) = tokio::join!(
        handle_message(
            ClientMessage::RevealDish {
                round_id: round_id.clone(),
                dish_id: "tacos".into(),
            },
            &ana_client,
            &state,
        ),
        handle_message(
            ClientMessage::RevealDish {
                round_id: round_id.clone(),
                dish_id: "tacos".into(),
            },
            &beto_client,
            &state,
        ),
    );
    assert!(matches!(ana, Some(ServerMessage::RevealStarted { .. })));
    assert!(matches!(beto, Some(ServerMessage::Error { ref code, .. }) if code == "PRECONDITION_FAILED"));

    tokio::time::sleep(Duration::from_secs(4)).await;
    let round = state.require_round(&round_id).await.expect("round");
    assert_eq!(round.participant("ana").and_then(|p| p.dish_id.as_deref()), Some("tacos"));
    assert!(round.participant("beto").and_then(|p| p.dish_id.as_deref()).is_none());
    assert_eq!(round.current_turn.as_deref(), Some("beto"));
}

#[tokio::test]
async fn test_participant_in_active_round_cannot_join_another() {
    let state = seeded().await;
    start_round(&state).await;

    let admin = Client::admin();
    let second = match handle_message(
        ClientMessage::AdminCreateRound {
            date: NaiveDate::from_ymd_opt(2024, 5, 2),
            participant_ids: vec!["carla".into()],
            category_id: Some("mexicana".into()),
        },
        &admin,
        &state,
    )
    .await
    {
        Some(ServerMessage::RoundCreated { round }) => round,
        other => panic!("Expected RoundCreated, got {:?}", other),
    };

    let result = handle_message(
        ClientMessage::AdminActivateRound {
            round_id: second.id,
        },
        &admin,
        &state,
    )
    .await;
    assert!(matches!(result, Some(ServerMessage::Error { ref code, .. }) if code == "PRECONDITION_FAILED"));
}

#[tokio::test]
async fn test_participant_identity_comes_from_join_code() {
    let state = seeded().await;
    let ana = state
        .list_users()
        .await
        .expect("users")
        .into_iter()
        .find(|u| u.id == "ana")
        .expect("ana");

    let client = Client::from_query(
        &WsQuery {
            role: Some("participant".into()),
            token: Some(ana.token),
        },
        &state,
    )
    .await
    .expect("client");
    assert_eq!(client, Client::participant("ana"));

    // Claiming to be someone without their code gets nowhere
    let forged = Client::from_query(
        &WsQuery {
            role: Some("participant".into()),
            token: None,
        },
        &state,
    )
    .await;
    assert!(forged.is_err());
}
