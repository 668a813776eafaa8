//! Whole-store snapshots for backup and restoration between sessions.

use super::{AppState, GameError, GameResult};
use crate::store::StoreSnapshot;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Schema version for export format compatibility
pub const EXPORT_SCHEMA_VERSION: u32 = 1;

/// A serializable snapshot of the entire store.
///
/// Pending reveal timers are runtime-only and not exported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateExport {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    #[serde(flatten)]
    pub store: StoreSnapshot,
}

impl StateExport {
    /// Create a new export with current timestamp
    pub fn new(store: StoreSnapshot) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            store,
        }
    }

    /// Validate the export before import
    pub fn validate(&self) -> Result<(), String> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(format!(
                "Export schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, EXPORT_SCHEMA_VERSION
            ));
        }

        let store = &self.store;
        for (dish_id, dish) in &store.dishes {
            if !store.categories.contains_key(&dish.category_id) {
                return Err(format!(
                    "Dish '{}' references category '{}' which doesn't exist",
                    dish_id, dish.category_id
                ));
            }
        }

        for (round_id, round) in &store.rounds {
            if round.id != *round_id {
                return Err(format!(
                    "Round stored under '{}' has id '{}'",
                    round_id, round.id
                ));
            }
            if !store.categories.contains_key(&round.category_id) {
                return Err(format!(
                    "Round '{}' references category '{}' which doesn't exist",
                    round_id, round.category_id
                ));
            }
            for participant in &round.participants {
                if let Some(dish_id) = &participant.dish_id {
                    if !store.dishes.contains_key(dish_id) {
                        return Err(format!(
                            "Round '{}' assigns dish '{}' which doesn't exist",
                            round_id, dish_id
                        ));
                    }
                }
            }
            if let Some(stranger) = round.turn_order.iter().find(|id| !round.is_participant(id)) {
                return Err(format!(
                    "Round '{}' has '{}' in its turn order but not as a participant",
                    round_id, stranger
                ));
            }
        }

        Ok(())
    }
}

impl AppState {
    pub async fn export_state(&self) -> GameResult<StateExport> {
        Ok(StateExport::new(self.store.snapshot().await?))
    }

    /// Replace the whole store with `export`.
    ///
    /// Pending reveals are dropped; their rounds come back as exported.
    pub async fn import_state(&self, export: StateExport) -> GameResult<()> {
        export.validate().map_err(GameError::Validation)?;

        {
            let mut pending = self.pending_reveals.lock().await;
            for (_, reveal) in pending.drain() {
                reveal.handle.abort();
            }
        }

        let rounds = export.store.rounds.len();
        let history = export.store.history.len();
        self.store.restore(export.store).await?;
        tracing::info!(
            "Imported state with {} rounds and {} history entries",
            rounds,
            history
        );
        Ok(())
    }

    /// Import a snapshot file written by `export_state`
    pub async fn load_snapshot(&self, path: &Path) -> GameResult<()> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            GameError::Validation(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let export: StateExport = serde_json::from_str(&json).map_err(|e| {
            GameError::Validation(format!("Invalid snapshot {}: {}", path.display(), e))
        })?;
        self.import_state(export).await
    }
}
