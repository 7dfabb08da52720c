pub mod ai;
pub mod auth;
pub mod dashboard;
pub mod projects;

use axum::extract::State;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/reset/request", post(auth::request_reset))
        .route("/api/auth/reset/resend", post(auth::resend_reset))
        .route("/api/auth/reset/verify", post(auth::verify_reset))
        .route("/api/auth/reset/complete", post(auth::complete_reset))
        .route("/api/me", get(auth::me))
        .route("/api/dashboard", get(dashboard::dashboard))
        .route("/api/rooms/quick", get(dashboard::quick_room))
        .route("/api/projects", post(projects::create_project))
        .route("/api/projects/:id", delete(projects::delete_project))
        .route(
            "/api/projects/:id/files",
            get(projects::list_files).post(projects::create_file),
        )
        .route("/api/projects/:id/files/:file_id", delete(projects::delete_file))
        .route("/api/projects/:id/files/:file_id/content", get(projects::file_content))
        .route("/api/projects/:id/activity", get(projects::activity))
        .route("/api/ai/chat", get(ai::history).post(ai::send).delete(ai::clear))
        .route("/api/ai/assist", post(ai::assist))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "rooms": state.sync.room_count().await,
    }))
}
