use crate::state::{evaluations_complete, AppState};
use crate::store::StoreEvent;
use crate::types::RoundStatus;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Finalize `round_id` if it is active and fully evaluated.
///
/// With `retry_unarchived`, completed rounds whose archival failed earlier
/// are retried too.
async fn finalize_if_complete(state: &AppState, round_id: &str, retry_unarchived: bool) {
    let round = match state.store.get_round(round_id).await {
        Ok(Some(round)) => round,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!("Finalizer could not read round {}: {}", round_id, e);
            return;
        }
    };
    let unfinished = round.status == RoundStatus::Active
        || (retry_unarchived && round.status == RoundStatus::Completed && !round.saved_to_history);
    if !unfinished || !evaluations_complete(&round) {
        return;
    }

    match state.finalize_round(round_id).await {
        Ok(_) => tracing::info!("Finalizer completed round {}", round_id),
        Err(e) => tracing::error!("Finalizer failed on round {}: {}", round_id, e),
    }
}

async fn sweep(state: &AppState) {
    match state.store.list_rounds().await {
        Ok(rounds) => {
            for round in rounds {
                finalize_if_complete(state, &round.id, true).await;
            }
        }
        Err(e) => tracing::warn!("Finalizer could not list rounds: {}", e),
    }
}

/// Spawn a background task that completes and archives rounds as soon as
/// their last evaluation block lands
pub fn spawn_round_finalizer(state: Arc<AppState>) -> JoinHandle<()> {
    let mut events = state.store.subscribe();
    tokio::spawn(async move {
        sweep(&state).await;

        loop {
            match events.recv().await {
                Ok(StoreEvent::RoundChanged(round_id)) => {
                    finalize_if_complete(&state, &round_id, false).await;
                }
                Ok(StoreEvent::Restored) => sweep(&state).await,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Finalizer skipped {} store events, rescanning", skipped);
                    sweep(&state).await;
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
