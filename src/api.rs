//! HTTP API endpoints for the admin panel.
//!
//! Catalog and user management, round administration, history and state
//! export/import. Mounted behind the admin auth middleware.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::export::StateExport;
use crate::state::{AppState, CreateRoundRequest, GameError};
use crate::types::*;

/// A coordinator error rendered as JSON with a matching status code
pub struct ApiError(GameError);

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub msg: String,
}

impl From<GameError> for ApiError {
    fn from(err: GameError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GameError::Validation(_) => StatusCode::BAD_REQUEST,
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::Precondition(_) => StatusCode::CONFLICT,
            GameError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GameError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }
        let body = ErrorBody {
            code: self.0.code().to_string(),
            msg: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct NewCategory {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct NewDish {
    pub name: String,
    pub category_id: CategoryId,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: Difficulty,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_difficulty() -> Difficulty {
    Difficulty::Medium
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Routes under `/api`, without auth
pub fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/categories", get(list_categories).post(add_category))
        .route("/api/categories/{id}", delete(delete_category))
        .route("/api/dishes", get(list_dishes).post(add_dish))
        .route("/api/dishes/{id}", delete(delete_dish))
        .route("/api/users", get(list_users).post(register_user))
        .route("/api/rounds", get(list_rounds).post(create_round))
        .route("/api/rounds/{id}", delete(delete_round))
        .route("/api/rounds/{id}/activate", post(activate_round))
        .route("/api/rounds/{id}/finish", post(finish_round))
        .route("/api/rounds/{id}/results", get(round_results))
        .route("/api/history", get(list_history))
        .route("/api/state/export", get(export_state))
        .route("/api/state/import", post(import_state))
}

pub async fn list_categories(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Category>>> {
    Ok(Json(state.list_categories().await?))
}

pub async fn add_category(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewCategory>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let category = state.add_category(&body.name).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CategoryId>,
) -> ApiResult<StatusCode> {
    state.delete_category(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_dishes(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Dish>>> {
    Ok(Json(state.list_dishes().await?))
}

pub async fn add_dish(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewDish>,
) -> ApiResult<(StatusCode, Json<Dish>)> {
    let dish = state
        .add_dish(
            &body.name,
            &body.category_id,
            body.description,
            body.difficulty,
            body.active,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(dish)))
}

pub async fn delete_dish(
    State(state): State<Arc<AppState>>,
    Path(id): Path<DishId>,
) -> ApiResult<StatusCode> {
    state.delete_dish(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<UserProfile>>> {
    Ok(Json(state.list_users().await?))
}

pub async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let user = state
        .register_user(&body.id, &body.name, &body.email, body.is_admin)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_rounds(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Round>>> {
    Ok(Json(state.list_rounds().await?))
}

pub async fn create_round(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateRoundRequest>,
) -> ApiResult<(StatusCode, Json<Round>)> {
    let round = state.create_round(body).await?;
    Ok((StatusCode::CREATED, Json(round)))
}

pub async fn activate_round(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RoundId>,
) -> ApiResult<Json<Round>> {
    Ok(Json(state.activate_round(&id).await?))
}

pub async fn finish_round(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RoundId>,
) -> ApiResult<Json<Round>> {
    Ok(Json(state.finalize_round(&id).await?))
}

pub async fn delete_round(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RoundId>,
) -> ApiResult<StatusCode> {
    state.delete_round(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn round_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<RoundId>,
) -> ApiResult<Json<Vec<ParticipantScore>>> {
    Ok(Json(state.round_results(&id).await?))
}

pub async fn list_history(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<HistoryRecord>>> {
    Ok(Json(state.list_history().await?))
}

/// Export the entire store as JSON.
///
/// GET /api/state/export
pub async fn export_state(State(state): State<Arc<AppState>>) -> ApiResult<Json<StateExport>> {
    Ok(Json(state.export_state().await?))
}

/// Import a store snapshot.
///
/// POST /api/state/import
///
/// Replaces all current state with the imported data. Connected clients
/// refresh from the store's restore notification.
pub async fn import_state(
    State(state): State<Arc<AppState>>,
    Json(export): Json<StateExport>,
) -> Response {
    match state.import_state(export).await {
        Ok(()) => (StatusCode::OK, "State imported successfully").into_response(),
        Err(e) => {
            tracing::error!("State import failed: {}", e);
            ApiError(e).into_response()
        }
    }
}
