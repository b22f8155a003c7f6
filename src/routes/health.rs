use axum::{extract::State, Json};
use sea_orm::ConnectionTrait;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    models::common::MessageResponse,
};

/// GET /health
pub async fn health(State(state): State<AppState>) -> Result<Json<MessageResponse>> {
    state
        .db
        .execute_unprepared("SELECT 1")
        .await
        .map_err(ApiError::Database)?;

    Ok(Json(MessageResponse::new("ok")))
}
