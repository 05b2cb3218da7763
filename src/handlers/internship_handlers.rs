//! Handlers for the internship batch family: year-range batches holding
//! internship records, each with optional image and certificate assets.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    errors::AppError,
    handlers::{
        clearable,
        media::{self, Disposition},
        multipart_error, read_asset_part,
    },
    models::{
        internship::{Internship, InternshipDraft, InternshipPatch, InternshipView},
        page::PageRequest,
    },
    services::batch_store::{Batch, BatchSort, SortOrder, StoreError, contains_ci},
    state::AppState,
};

/// A child record supplied inline with a batch create/update (scalar fields
/// only; assets arrive through the multipart endpoints).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternshipSeed {
    pub name: String,
    pub roll_no: String,
    pub internship_title: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl InternshipSeed {
    fn build(self) -> Result<Internship, AppError> {
        Ok(InternshipDraft {
            name: Some(self.name),
            roll_no: Some(self.roll_no),
            internship_title: Some(self.internship_title),
            company: self.company,
            duration: self.duration,
            description: self.description,
            ..Default::default()
        }
        .build(Utc::now())?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchReq {
    pub batch_key: String,
    #[serde(default)]
    pub internships: Vec<InternshipSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBatchReq {
    #[serde(default)]
    pub batch_key: Option<String>,
    #[serde(default)]
    pub internships: Option<Vec<InternshipSeed>>,
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
    pub name: Option<String>,
    pub roll_no: Option<String>,
    pub internship_title: Option<String>,
    pub batch_key: Option<String>,
}

fn batch_json(batch: &Batch<Internship>) -> Value {
    json!({
        "batchKey": batch.key,
        "createdAt": batch.created_at,
        "internships": batch.children.iter().map(InternshipView::from).collect::<Vec<_>>(),
    })
}

/// POST `/internships/batches`
pub async fn create_batch(
    State(state): State<AppState>,
    Json(req): Json<CreateBatchReq>,
) -> Result<Response, AppError> {
    let children = req
        .internships
        .into_iter()
        .map(InternshipSeed::build)
        .collect::<Result<Vec<_>, _>>()?;
    let batch = state.internships.create_batch(&req.batch_key, children).await?;
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

/// GET `/internships/batches?page&limit&sortBy&order`
pub async fn list_batches(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let req = PageRequest::new(q.page, q.limit);
    let (batches, pagination) = state
        .internships
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

/// GET `/internships/batches/{key}`
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let batch = state.internships.fetch_batch(&batch_key).await?;
    Ok(Json(json!({ "success": true, "data": batch_json(&batch) })))
}

/// PUT `/internships/batches/{key}` — batch metadata; the key is immutable.
pub async fn update_batch(
    State(state): State<AppState>,
    Path(batch_key): Path<String>,
    Json(req): Json<UpdateBatchReq>,
) -> Result<Json<Value>, AppError> {
    let children = match req.internships {
        Some(seeds) => Some(
            seeds
                .into_iter()
                .map(InternshipSeed::build)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        None => None,
    };
    let batch = state
        .internships
        .update_batch(&batch_key, req.batch_key.as_deref(), children)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Batch updated successfully",
        "data": batch_json(&batch),
    })))
}

/// DELETE `/internships/batches/{key}` — cascades to every child and asset.
pub async fn delete_batch(
    State(state): State<AppState>,
    Path(batch_key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let batch = state.internships.delete_batch(&batch_key).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Batch deleted successfully",
        "data": batch_json(&batch),
    })))
}

async fn parse_draft(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<InternshipDraft, AppError> {
    let mut draft = InternshipDraft::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match name.as_str() {
            "name" => draft.name = Some(field.text().await.map_err(multipart_error)?),
            "rollNo" => draft.roll_no = Some(field.text().await.map_err(multipart_error)?),
            "internshipTitle" => {
                draft.internship_title = Some(field.text().await.map_err(multipart_error)?)
            }
            "company" => draft.company = Some(field.text().await.map_err(multipart_error)?),
            "duration" => draft.duration = Some(field.text().await.map_err(multipart_error)?),
            "description" => {
                draft.description = Some(field.text().await.map_err(multipart_error)?)
            }
            "image" => draft.image = Some(read_asset_part(field, state.limits).await?),
            "certificate" => {
                draft.certificate = Some(read_asset_part(field, state.limits).await?)
            }
            _ => {}
        }
    }
    Ok(draft)
}

async fn parse_patch(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<InternshipPatch, AppError> {
    let mut patch = InternshipPatch::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match name.as_str() {
            "name" => patch.name = Some(field.text().await.map_err(multipart_error)?),
            "rollNo" => patch.roll_no = Some(field.text().await.map_err(multipart_error)?),
            "internshipTitle" => {
                patch.internship_title = Some(field.text().await.map_err(multipart_error)?)
            }
            // Blank optional fields mean "explicitly cleared".
            "company" => {
                patch.company = Some(clearable(field.text().await.map_err(multipart_error)?))
            }
            "duration" => {
                patch.duration = Some(clearable(field.text().await.map_err(multipart_error)?))
            }
            "description" => {
                patch.description = Some(clearable(field.text().await.map_err(multipart_error)?))
            }
            "image" => patch.image = Some(read_asset_part(field, state.limits).await?),
            "certificate" => {
                patch.certificate = Some(read_asset_part(field, state.limits).await?)
            }
            _ => {}
        }
    }
    Ok(patch)
}

/// POST `/internships/batches/{key}/internships` (multipart)
pub async fn add_internship(
    State(state): State<AppState>,
    Path(batch_key): Path<String>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let draft = parse_draft(&state, multipart).await?;
    let record = draft.build(Utc::now())?;
    let saved = state.internships.append_child(&batch_key, record).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Internship added successfully",
            "data": InternshipView::from(&saved),
        })),
    )
        .into_response())
}

/// GET `/internships/batches/{key}/internships?page&limit`
pub async fn list_internships(
    State(state): State<AppState>,
    Path(batch_key): Path<String>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let req = PageRequest::new(q.page, q.limit);
    let (children, pagination) = state.internships.list_children(&batch_key, req).await?;
    Ok(Json(json!({
        "success": true,
        "data": children.iter().map(InternshipView::from).collect::<Vec<_>>(),
        "pagination": pagination,
    })))
}

/// GET `/internships/batches/{key}/internships/{id}`
pub async fn get_internship(
    State(state): State<AppState>,
    Path((batch_key, id)): Path<(String, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let record = state
        .internships
        .get_child(&batch_key, |c| c.id == id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "data": InternshipView::from(&record),
    })))
}

/// PUT `/internships/batches/{key}/internships/{id}` (multipart)
pub async fn update_internship(
    State(state): State<AppState>,
    Path((batch_key, id)): Path<(String, Uuid)>,
    multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let patch = parse_patch(&state, multipart).await?;
    let updated = state
        .internships
        .update_child(
            &batch_key,
            |c| c.id == id,
            |c| patch.apply(c).map_err(|e| StoreError::Invalid(e.0)),
        )
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Internship updated successfully",
        "data": InternshipView::from(&updated),
    })))
}

/// DELETE `/internships/batches/{key}/internships/{id}`
pub async fn delete_internship(
    State(state): State<AppState>,
    Path((batch_key, id)): Path<(String, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let removed = state
        .internships
        .remove_child(&batch_key, |c| c.id == id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Internship deleted successfully",
        "data": InternshipView::from(&removed),
    })))
}

/// GET `/internships/batches/{key}/internships/{id}/image`
pub async fn get_image(
    State(state): State<AppState>,
    Path((batch_key, id)): Path<(String, Uuid)>,
) -> Result<Response, AppError> {
    let record = state
        .internships
        .get_child(&batch_key, |c| c.id == id)
        .await?;
    let envelope = record
        .image
        .as_ref()
        .ok_or_else(|| AppError::not_found("Image not found"))?;
    media::asset_response(envelope, Disposition::Inline)
}

/// GET `/internships/batches/{key}/internships/{id}/certificate`
pub async fn get_certificate(
    State(state): State<AppState>,
    Path((batch_key, id)): Path<(String, Uuid)>,
) -> Result<Response, AppError> {
    let record = state
        .internships
        .get_child(&batch_key, |c| c.id == id)
        .await?;
    let envelope = record
        .certificate
        .as_ref()
        .ok_or_else(|| AppError::not_found("Certificate not found"))?;
    media::asset_response(envelope, Disposition::Attachment)
}

/// GET `/internships/search?name&rollNo&internshipTitle&batchKey`
pub async fn search(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Value>, AppError> {
    let hits = state
        .internships
        .search(q.batch_key.as_deref(), |c| {
            q.name
                .as_deref()
                .is_none_or(|needle| contains_ci(&c.name, needle))
                && q.roll_no
                    .as_deref()
                    .is_none_or(|needle| contains_ci(&c.roll_no, needle))
                && q.internship_title
                    .as_deref()
                    .is_none_or(|needle| contains_ci(&c.internship_title, needle))
        })
        .await?;
    let data: Vec<Value> = hits
        .iter()
        .map(|hit| {
            json!({
                "batchKey": hit.batch_key,
                "batchCreatedAt": hit.batch_created_at,
                "internship": InternshipView::from(&hit.child),
            })
        })
        .collect();
    Ok(Json(json!({
        "success": true,
        "count": data.len(),
        "data": data,
    })))
}

/// GET `/internships/batches/{key}/stats`
pub async fn stats(
    State(state): State<AppState>,
    Path(batch_key): Path<String>,
) -> Result<Json<Value>, AppError> {
    let stats = state.internships.stats(&batch_key).await?;
    Ok(Json(json!({ "success": true, "data": stats })))
}
