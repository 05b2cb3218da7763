//! Handlers for the team-project batch family: integer-keyed batches whose
//! children are addressed by team number and carry project image, document,
//! and optional video assets.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    errors::AppError,
    handlers::{
        media::{self, Disposition},
        multipart_error, read_asset_part,
    },
    models::{
        page::PageRequest,
        team::{TeamDraft, TeamPatch, TeamProject, TeamView},
    },
    services::batch_store::{Batch, BatchSort, SortOrder, StoreError, contains_ci},
    state::AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchReq {
    pub batch_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBatchReq {
    #[serde(default)]
    pub batch_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub title: Option<String>,
    pub batch_key: Option<String>,
}

fn batch_json(batch: &Batch<TeamProject>) -> Value {
    json!({
        "batchKey": batch.key,
        "createdAt": batch.created_at,
        "teams": batch.children.iter().map(TeamView::from).collect::<Vec<_>>(),
    })
}

/// POST `/teams/batches`
pub async fn create_batch(
    State(state): State<AppState>,
    Json(req): Json<CreateBatchReq>,
) -> Result<Response, AppError> {
    let batch = state.teams.create_batch(&req.batch_key, Vec::new()).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Batch created successfully",
            "data": batch_json(&batch),
        })),
    )
        .into_response())
}

/// GET `/teams/batches?page&limit&sortBy&order`
pub async fn list_batches(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let req = PageRequest::new(q.page, q.limit);
    let (batches, pagination) = state
        .teams
        .list_batches(
            req,
            BatchSort::parse(q.sort_by.as_deref()),
            SortOrder::parse(q.order.as_deref()),
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "data": batches.iter().map(batch_json).collect::<Vec<_>>(),
        "pagination": pagination,
    })))
}

/// GET `/teams/batches/{key}`
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let batch = state.teams.fetch_batch(&batch_key).await?;
    Ok(Json(json!({ "success": true, "data": batch_json(&batch) })))
}

/// PUT `/teams/batches/{key}` — the key is immutable; a differing key in the
/// body is rejected rather than ignored.
pub async fn update_batch(
    State(state): State<AppState>,
    Path(batch_key): Path<String>,
    Json(req): Json<UpdateBatchReq>,
) -> Result<Json<Value>, AppError> {
    let batch = state
        .teams
        .update_batch(&batch_key, req.batch_key.as_deref(), None)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Batch updated successfully",
        "data": batch_json(&batch),
    })))
}

/// DELETE `/teams/batches/{key}`
pub async fn delete_batch(
    State(state): State<AppState>,
    Path(batch_key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let batch = state.teams.delete_batch(&batch_key).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Batch deleted successfully",
        "data": batch_json(&batch),
    })))
}

async fn parse_draft(state: &AppState, mut multipart: Multipart) -> Result<TeamDraft, AppError> {
    let mut draft = TeamDraft::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match name.as_str() {
            "teamNumber" => draft.team_number = Some(field.text().await.map_err(multipart_error)?),
            "title" => draft.title = Some(field.text().await.map_err(multipart_error)?),
            "description" => draft.description = Some(field.text().await.map_err(multipart_error)?),
            "deploymentLink" => {
                draft.deployment_link = Some(field.text().await.map_err(multipart_error)?)
            }
            "githubLink" => draft.github_link = Some(field.text().await.map_err(multipart_error)?),
            "projectImage" => draft.project_image = Some(read_asset_part(field, state.limits).await?),
            "document" => draft.document = Some(read_asset_part(field, state.limits).await?),
            "video" => draft.video = Some(read_asset_part(field, state.limits).await?),
            _ => {}
        }
    }
    Ok(draft)
}

async fn parse_patch(state: &AppState, mut multipart: Multipart) -> Result<TeamPatch, AppError> {
    let mut patch = TeamPatch::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match name.as_str() {
            "title" => patch.title = Some(field.text().await.map_err(multipart_error)?),
            "description" => patch.description = Some(field.text().await.map_err(multipart_error)?),
            "deploymentLink" => {
                patch.deployment_link = Some(field.text().await.map_err(multipart_error)?)
            }
            "githubLink" => patch.github_link = Some(field.text().await.map_err(multipart_error)?),
            "projectImage" => patch.project_image = Some(read_asset_part(field, state.limits).await?),
            "document" => patch.document = Some(read_asset_part(field, state.limits).await?),
            "video" => patch.video = Some(read_asset_part(field, state.limits).await?),
            _ => {}
        }
    }
    Ok(patch)
}

/// POST `/teams/batches/{key}/teams` (multipart)
pub async fn add_team(
    State(state): State<AppState>,
    Path(batch_key): Path<String>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let draft = parse_draft(&state, multipart).await?;
    let record = draft.build(Utc::now())?;
    let saved = state.teams.append_child(&batch_key, record).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Team added to batch successfully",
            "data": TeamView::from(&saved),
        })),
    )
        .into_response())
}

/// GET `/teams/batches/{key}/teams?page&limit`
pub async fn list_teams(
    State(state): State<AppState>,
    Path(batch_key): Path<String>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let req = PageRequest::new(q.page, q.limit);
    let (children, pagination) = state.teams.list_children(&batch_key, req).await?;
    Ok(Json(json!({
        "success": true,
        "data": children.iter().map(TeamView::from).collect::<Vec<_>>(),
        "pagination": pagination,
    })))
}

/// GET `/teams/batches/{key}/teams/{teamNumber}`
pub async fn get_team(
    State(state): State<AppState>,
    Path((batch_key, team_number)): Path<(String, i64)>,
) -> Result<Json<Value>, AppError> {
    let record = state
        .teams
        .get_child(&batch_key, |t| t.team_number == team_number)
        .await?;
    Ok(Json(json!({ "success": true, "data": TeamView::from(&record) })))
}

/// PUT `/teams/batches/{key}/teams/{teamNumber}` (multipart)
pub async fn update_team(
    State(state): State<AppState>,
    Path((batch_key, team_number)): Path<(String, i64)>,
    multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let patch = parse_patch(&state, multipart).await?;
    let updated = state
        .teams
        .update_child(
            &batch_key,
            |t| t.team_number == team_number,
            |t| patch.apply(t).map_err(|e| StoreError::Invalid(e.0)),
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Team updated successfully",
        "data": TeamView::from(&updated),
    })))
}

/// DELETE `/teams/batches/{key}/teams/{teamNumber}`
pub async fn delete_team(
    State(state): State<AppState>,
    Path((batch_key, team_number)): Path<(String, i64)>,
) -> Result<Json<Value>, AppError> {
    let removed = state
        .teams
        .remove_child(&batch_key, |t| t.team_number == team_number)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Team deleted successfully",
        "data": TeamView::from(&removed),
    })))
}

/// GET `/teams/batches/{key}/teams/{teamNumber}/image`
pub async fn get_image(
    State(state): State<AppState>,
    Path((batch_key, team_number)): Path<(String, i64)>,
) -> Result<Response, AppError> {
    let record = state
        .teams
        .get_child(&batch_key, |t| t.team_number == team_number)
        .await?;
    let envelope = record
        .project_image
        .as_ref()
        .ok_or_else(|| AppError::not_found("Image not found"))?;
    media::asset_response(envelope, Disposition::Inline)
}

/// GET `/teams/batches/{key}/teams/{teamNumber}/document`
pub async fn get_document(
    State(state): State<AppState>,
    Path((batch_key, team_number)): Path<(String, i64)>,
) -> Result<Response, AppError> {
    let record = state
        .teams
        .get_child(&batch_key, |t| t.team_number == team_number)
        .await?;
    let envelope = record
        .document
        .as_ref()
        .ok_or_else(|| AppError::not_found("Document not found"))?;
    media::asset_response(envelope, Disposition::Attachment)
}

/// GET `/teams/batches/{key}/teams/{teamNumber}/video` — range-aware.
pub async fn get_video(
    State(state): State<AppState>,
    Path((batch_key, team_number)): Path<(String, i64)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let record = state
        .teams
        .get_child(&batch_key, |t| t.team_number == team_number)
        .await?;
    let envelope = record
        .video
        .as_ref()
        .ok_or_else(|| AppError::not_found("Video not found"))?;
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    media::video_response(envelope, range)
}

/// GET `/teams/search?title&batchKey`
pub async fn search(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let hits = state
        .teams
        .search(q.batch_key.as_deref(), |t| {
            q.title
                .as_deref()
                .is_none_or(|needle| contains_ci(&t.title, needle))
        })
        .await?;
    let data: Vec<Value> = hits
        .iter()
        .map(|hit| {
            json!({
                "batchKey": hit.batch_key,
                "batchCreatedAt": hit.batch_created_at,
                "team": TeamView::from(&hit.child),
            })
        })
        .collect();
    Ok(Json(json!({
        "success": true,
        "count": data.len(),
        "data": data,
    })))
}

/// GET `/teams/batches/{key}/stats`
pub async fn stats(
    State(state): State<AppState>,
    Path(batch_key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let stats = state.teams.stats(&batch_key).await?;
    Ok(Json(json!({ "success": true, "data": stats })))
}
