//! Route assembly for both batch families.
//!
//! ## Structure
//! - **Batch-level endpoints** (per family, mounted at `/internships` and `/teams`)
//!   - `POST   /batches` — create batch
//!   - `GET    /batches` — paginated list (supports page, limit, sortBy, order)
//!   - `GET/PUT/DELETE /batches/{key}` — one batch (key immutable; delete cascades)
//!   - `GET    /batches/{key}/stats` — on-demand statistics
//!   - `GET    /search` — cross-batch child search
//!
//! - **Child-level endpoints**
//!   - `POST   /batches/{key}/internships` (multipart) — append internship
//!   - `GET/PUT/DELETE /batches/{key}/internships/{id}` — by generated id
//!   - `GET    .../{id}/image|certificate` — asset bytes
//!   - `POST   /batches/{key}/teams` (multipart) — append team project
//!   - `GET/PUT/DELETE /batches/{key}/teams/{teamNumber}` — by team number
//!   - `GET    .../{teamNumber}/image|document|video` — asset bytes
//!     (video honours `Range` headers)

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::get,
};

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        internship_handlers, team_handlers,
    },
    state::{AppState, UploadLimits},
};

fn internship_routes() -> Router<AppState> {
    use internship_handlers as h;
    Router::new()
        .route("/batches", get(h::list_batches).post(h::create_batch))
        .route(
            "/batches/{batch_key}",
            get(h::get_batch).put(h::update_batch).delete(h::delete_batch),
        )
        .route("/batches/{batch_key}/stats", get(h::stats))
        .route(
            "/batches/{batch_key}/internships",
            get(h::list_internships).post(h::add_internship),
        )
        .route(
            "/batches/{batch_key}/internships/{id}",
            get(h::get_internship)
                .put(h::update_internship)
                .delete(h::delete_internship),
        )
        .route("/batches/{batch_key}/internships/{id}/image", get(h::get_image))
        .route(
            "/batches/{batch_key}/internships/{id}/certificate",
            get(h::get_certificate),
        )
        .route("/search", get(h::search))
}

fn team_routes() -> Router<AppState> {
    use team_handlers as h;
    Router::new()
        .route("/batches", get(h::list_batches).post(h::create_batch))
        .route(
            "/batches/{batch_key}",
            get(h::get_batch).put(h::update_batch).delete(h::delete_batch),
        )
        .route("/batches/{batch_key}/stats", get(h::stats))
        .route(
            "/batches/{batch_key}/teams",
            get(h::list_teams).post(h::add_team),
        )
        .route(
            "/batches/{batch_key}/teams/{team_number}",
            get(h::get_team).put(h::update_team).delete(h::delete_team),
        )
        .route(
            "/batches/{batch_key}/teams/{team_number}/image",
            get(h::get_image),
        )
        .route(
            "/batches/{batch_key}/teams/{team_number}/document",
            get(h::get_document),
        )
        .route(
            "/batches/{batch_key}/teams/{team_number}/video",
            get(h::get_video),
        )
        .route("/search", get(h::search))
}

/// Build the full router. The body limit bounds multipart uploads as a whole;
/// individual assets are additionally checked against the per-asset limit.
pub fn routes(limits: UploadLimits) -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/internships", internship_routes())
        .nest("/teams", team_routes())
        .layer(DefaultBodyLimit::max(limits.max_body_bytes))
}
