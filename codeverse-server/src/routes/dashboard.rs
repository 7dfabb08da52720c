use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use codeverse_core::{
    current_streak, quick_room_link, sample_tips, CodingTip, DashboardStats, Project, PublicUser,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::CurrentUser;
use crate::routes::projects::FileView;
use crate::state::AppState;

const TIPS_SHOWN: usize = 4;

#[derive(Debug, Serialize)]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: Project,
    pub files: Vec<FileView>,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub user: PublicUser,
    pub stats: DashboardStats,
    pub streak: u32,
    pub projects: Vec<ProjectView>,
    pub tips: Vec<CodingTip>,
}

#[derive(Debug, Deserialize)]
pub struct QuickRoomQuery {
    pub from: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuickRoom {
    pub room_id: Uuid,
    pub url: String,
}

pub async fn dashboard(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Dashboard>, ApiError> {
    let user = current.user;
    let projects = state.store.list_projects(user.id)?;
    let stats = DashboardStats::from_projects(&projects);
    let streak = current_streak(&state.store.login_days(user.id)?, Utc::now().date_naive());

    let mut views = Vec::with_capacity(projects.len());
    for project in projects {
        let files = state
            .store
            .list_files(project.id)?
            .into_iter()
            .map(|file| FileView::new(file, &state.config.editor.url, &user.username))
            .collect();
        views.push(ProjectView { project, files });
    }

    Ok(Json(Dashboard {
        user,
        stats,
        streak,
        projects: views,
        tips: sample_tips(TIPS_SHOWN),
    }))
}

/// A fresh editor room, e.g. for the "explain" or "debug" quick actions.
pub async fn quick_room(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<QuickRoomQuery>,
) -> Json<QuickRoom> {
    let action = query
        .from
        .as_deref()
        .map(str::trim)
        .filter(|action| !action.is_empty())
        .unwrap_or("dashboard");
    let (room_id, url) = quick_room_link(&state.config.editor.url, &current.user.username, action);
    Json(QuickRoom { room_id, url })
}
