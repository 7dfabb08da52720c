//! Projects, their files, file contents and activity.
//!
//! Projects owned by someone else answer 404, exactly like missing ones.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use codeverse_core::{
    file_editor_link, validate_filename, validate_project_name, ActivityEntry, Language, Project,
    ProjectFile,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{ApiJson, CurrentUser};
use crate::state::AppState;

const MAX_ACTIVITY_PAGE: usize = 500;

#[derive(Debug, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewFile {
    pub filename: String,
    /// Inferred from the extension, then the project, when absent.
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

/// A file with the link that opens it in the editor.
#[derive(Debug, Serialize)]
pub struct FileView {
    #[serde(flatten)]
    pub file: ProjectFile,
    pub editor_url: String,
}

impl FileView {
    pub fn new(file: ProjectFile, editor_url: &str, username: &str) -> Self {
        let editor_url = file_editor_link(editor_url, username, file.room_id);
        Self { file, editor_url }
    }
}

#[derive(Debug, Serialize)]
pub struct FileContent {
    pub file_id: Uuid,
    pub room_id: Uuid,
    pub filename: String,
    pub language: Language,
    pub content: String,
}

pub async fn create_project(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<NewProject>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    let name = validate_project_name(&body.name)?;
    let language = match body.language.as_deref() {
        Some(raw) => parse_language(raw)?,
        None => Language::default(),
    };
    let project = Project::new(current.user.id, name, language);
    state.store.create_project(&project, current.user.id)?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// Deletes the project, its files, its activity and every file's document.
pub async fn delete_project(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    owned_project(&state, &current, project_id)?;
    let files = state.store.list_files(project_id)?;
    state.store.delete_project(project_id)?;
    for file in files {
        state.sync.delete_document(file.room_id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_files(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<FileView>>, ApiError> {
    owned_project(&state, &current, project_id)?;
    let files = state
        .store
        .list_files(project_id)?
        .into_iter()
        .map(|file| FileView::new(file, &state.config.editor.url, &current.user.username))
        .collect();
    Ok(Json(files))
}

pub async fn create_file(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(project_id): Path<Uuid>,
    ApiJson(body): ApiJson<NewFile>,
) -> Result<(StatusCode, Json<FileView>), ApiError> {
    let project = owned_project(&state, &current, project_id)?;
    let filename = validate_filename(&body.filename)?;
    let language = match body.language.as_deref() {
        Some(raw) => parse_language(raw)?,
        None => Language::from_filename(&filename).unwrap_or(project.language),
    };

    let file = ProjectFile::new(project_id, filename, language);
    state.store.create_file(&file, current.user.id)?;
    let view = FileView::new(file, &state.config.editor.url, &current.user.username);
    Ok((StatusCode::CREATED, Json(view)))
}

/// Removes the file and disconnects anyone still editing it.
pub async fn delete_file(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((project_id, file_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    owned_project(&state, &current, project_id)?;
    let file = state.store.delete_file(project_id, file_id, current.user.id)?;
    state.sync.delete_document(file.room_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Live text when the room is open, otherwise the stored document.
pub async fn file_content(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((project_id, file_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<FileContent>, ApiError> {
    owned_project(&state, &current, project_id)?;
    let file = state
        .store
        .get_file(file_id)?
        .filter(|f| f.project_id == project_id)
        .ok_or_else(|| ApiError::NotFound("file not found".into()))?;

    let content = state.sync.document_text(file.room_id).await?.unwrap_or_default();
    Ok(Json(FileContent {
        file_id: file.id,
        room_id: file.room_id,
        filename: file.filename,
        language: file.language,
        content,
    }))
}

/// Newest first.
pub async fn activity(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityEntry>>, ApiError> {
    owned_project(&state, &current, project_id)?;
    let limit = query
        .limit
        .unwrap_or(state.config.http.activity_page_size)
        .clamp(1, MAX_ACTIVITY_PAGE);
    Ok(Json(state.store.list_activity(project_id, limit)?))
}

fn owned_project(state: &AppState, current: &CurrentUser, project_id: Uuid) -> Result<Project, ApiError> {
    state
        .store
        .get_project(project_id)?
        .filter(|p| p.owner == current.user.id)
        .ok_or_else(|| ApiError::NotFound("project not found".into()))
}

fn parse_language(raw: &str) -> Result<Language, ApiError> {
    raw.parse().map_err(ApiError::BadRequest)
}
