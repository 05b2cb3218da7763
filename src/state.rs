//! Shared router state: one store per batch family plus the upload limits.

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::models::{internship::Internship, team::TeamProject};
use crate::services::batch_store::{BatchStore, KeyKind};

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    /// Maximum accepted size for a single asset part.
    pub max_asset_bytes: usize,
    /// Maximum accepted size for a whole multipart body.
    pub max_body_bytes: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub internships: BatchStore<Internship>,
    pub teams: BatchStore<TeamProject>,
    pub limits: UploadLimits,
}

impl AppState {
    pub fn new(db: Arc<SqlitePool>, limits: UploadLimits) -> Self {
        Self {
            internships: BatchStore::new(db.clone(), "internship_batches", KeyKind::YearRange),
            teams: BatchStore::new(db.clone(), "team_batches", KeyKind::Numeric),
            db,
            limits,
        }
    }
}
