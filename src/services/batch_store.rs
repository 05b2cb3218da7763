//! src/services/batch_store.rs
//!
//! BatchStore — the nested-entity store shared by both route families.
//! Each batch is one SQLite row: a unique batch key, a JSON document holding
//! the ordered child collection (asset payloads included), and a version
//! counter. Child-level writes load the document, apply the change in
//! memory, and persist the whole document back with a conditional write on
//! the version, so concurrent edits to the same batch retry instead of
//! silently losing updates.

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::SqlitePool;
use std::{collections::BTreeMap, marker::PhantomData, sync::Arc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    ChildEntity,
    page::{PageInfo, PageRequest, paginate},
};

/// Bounded retry count for conditional whole-document writes.
const MUTATION_RETRIES: usize = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid batch key `{key}`: {reason}")]
    InvalidBatchKey { key: String, reason: String },
    #[error("{0}")]
    Invalid(String),
    #[error("batch `{0}` already exists")]
    BatchAlreadyExists(String),
    #[error("batch `{0}` not found")]
    BatchNotFound(String),
    #[error("child not found in this batch")]
    ChildNotFound,
    #[error("{0}")]
    DuplicateChild(&'static str),
    #[error("batch `{0}` is being modified concurrently, retries exhausted")]
    Contention(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("stored batch document is corrupt: {0}")]
    Doc(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// How a family's batch keys look on the wire and sort in listings.
#[derive(Debug, Clone, Copy)]
pub enum KeyKind {
    /// Year-range string such as "2024-2025".
    YearRange,
    /// Plain integer, canonicalized (leading zeros stripped).
    Numeric,
}

impl KeyKind {
    /// Validate a raw key and return its canonical form.
    pub fn canonicalize(self, raw: &str) -> StoreResult<String> {
        let raw = raw.trim();
        match self {
            KeyKind::YearRange => {
                let bytes = raw.as_bytes();
                let well_formed = bytes.len() == 9
                    && bytes[4] == b'-'
                    && bytes
                        .iter()
                        .enumerate()
                        .all(|(i, b)| i == 4 || b.is_ascii_digit());
                if well_formed {
                    Ok(raw.to_string())
                } else {
                    Err(StoreError::InvalidBatchKey {
                        key: raw.to_string(),
                        reason: "expected the form YYYY-YYYY".into(),
                    })
                }
            }
            KeyKind::Numeric => raw
                .parse::<i64>()
                .map(|n| n.to_string())
                .map_err(|_| StoreError::InvalidBatchKey {
                    key: raw.to_string(),
                    reason: "expected an integer".into(),
                }),
        }
    }

    /// Numeric keys are stored as TEXT; cast so "10" sorts after "9".
    fn sort_key_expr(self) -> &'static str {
        match self {
            KeyKind::YearRange => "batch_key",
            KeyKind::Numeric => "CAST(batch_key AS INTEGER)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchSort {
    CreatedAt,
    BatchKey,
}

impl BatchSort {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("batchKey") | Some("batch_key") => BatchSort::BatchKey,
            _ => BatchSort::CreatedAt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if v.eq_ignore_ascii_case("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// A parent batch with its embedded children, as loaded from one row.
#[derive(Debug, Clone)]
pub struct Batch<C> {
    pub id: Uuid,
    pub key: String,
    pub children: Vec<C>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// One flattened cross-batch search result, annotated with its parent batch.
#[derive(Debug, Clone)]
pub struct SearchHit<C> {
    pub batch_key: String,
    pub batch_created_at: DateTime<Utc>,
    pub child: C,
}

/// On-demand batch statistics.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    pub batch_key: String,
    pub total_children: usize,
    pub asset_counts: BTreeMap<&'static str, usize>,
    pub distinct_titles: usize,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct BatchRow {
    id: Uuid,
    batch_key: String,
    doc: String,
    version: i64,
    created_at: DateTime<Utc>,
}

impl BatchRow {
    fn into_batch<C: ChildEntity>(self) -> StoreResult<Batch<C>> {
        let children: Vec<C> = serde_json::from_str(&self.doc)?;
        Ok(Batch {
            id: self.id,
            key: self.batch_key,
            children,
            version: self.version,
            created_at: self.created_at,
        })
    }
}

/// Store for one batch family, generic over the child entity type. Cheap to
/// clone; the pool is the only shared state.
pub struct BatchStore<C> {
    db: Arc<SqlitePool>,
    table: &'static str,
    key_kind: KeyKind,
    _child: PhantomData<fn() -> C>,
}

impl<C> Clone for BatchStore<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            table: self.table,
            key_kind: self.key_kind,
            _child: PhantomData,
        }
    }
}

impl<C: ChildEntity> BatchStore<C> {
    pub fn new(db: Arc<SqlitePool>, table: &'static str, key_kind: KeyKind) -> Self {
        Self {
            db,
            table,
            key_kind,
            _child: PhantomData,
        }
    }

    async fn fetch_row(&self, key: &str) -> StoreResult<Option<BatchRow>> {
        let sql = format!(
            "SELECT id, batch_key, doc, version, created_at FROM {} WHERE batch_key = ?",
            self.table
        );
        Ok(sqlx::query_as::<_, BatchRow>(&sql)
            .bind(key)
            .fetch_optional(&*self.db)
            .await?)
    }

    /// Create a batch, optionally seeded with an initial child list.
    pub async fn create_batch(&self, raw_key: &str, children: Vec<C>) -> StoreResult<Batch<C>> {
        let key = self.key_kind.canonicalize(raw_key)?;
        let batch = Batch {
            id: Uuid::new_v4(),
            key,
            children,
            version: 0,
            created_at: Utc::now(),
        };
        let doc = serde_json::to_string(&batch.children)?;
        let sql = format!(
            "INSERT INTO {} (id, batch_key, doc, version, created_at) VALUES (?, ?, ?, 0, ?)",
            self.table
        );
        match sqlx::query(&sql)
            .bind(batch.id)
            .bind(&batch.key)
            .bind(&doc)
            .bind(batch.created_at)
            .execute(&*self.db)
            .await
        {
            Ok(_) => Ok(batch),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::BatchAlreadyExists(batch.key))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn fetch_batch(&self, raw_key: &str) -> StoreResult<Batch<C>> {
        let key = self.key_kind.canonicalize(raw_key)?;
        match self.fetch_row(&key).await? {
            Some(row) => row.into_batch(),
            None => Err(StoreError::BatchNotFound(key)),
        }
    }

    pub async fn list_batches(
        &self,
        req: PageRequest,
        sort: BatchSort,
        order: SortOrder,
    ) -> StoreResult<(Vec<Batch<C>>, PageInfo)> {
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&*self.db)
            .await?;

        let sort_expr = match sort {
            BatchSort::CreatedAt => "created_at",
            BatchSort::BatchKey => self.key_kind.sort_key_expr(),
        };
        let sql = format!(
            "SELECT id, batch_key, doc, version, created_at FROM {} ORDER BY {} {} LIMIT ? OFFSET ?",
            self.table,
            sort_expr,
            order.sql()
        );
        let rows: Vec<BatchRow> = sqlx::query_as(&sql)
            .bind(req.limit as i64)
            .bind(req.offset() as i64)
            .fetch_all(&*self.db)
            .await?;

        let batches = rows
            .into_iter()
            .map(BatchRow::into_batch)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((batches, PageInfo::compute(req, total as usize)))
    }

    /// Update batch metadata. The key itself is immutable: a request naming a
    /// different key is rejected here, not merely ignored. A present child
    /// list replaces the collection wholesale; the returned batch is exactly
    /// the state that write persisted.
    pub async fn update_batch(
        &self,
        raw_key: &str,
        new_key: Option<&str>,
        children: Option<Vec<C>>,
    ) -> StoreResult<Batch<C>> {
        let key = self.key_kind.canonicalize(raw_key)?;
        if let Some(requested) = new_key {
            let requested = self.key_kind.canonicalize(requested)?;
            if requested != key {
                return Err(StoreError::Invalid("batch key is immutable".into()));
            }
        }
        match children {
            Some(replacement) => {
                let (_, batch) = self
                    .mutate_full(&key, move |existing| {
                        *existing = replacement.clone();
                        Ok(())
                    })
                    .await?;
                Ok(batch)
            }
            None => self.fetch_batch(&key).await,
        }
    }

    /// Delete the batch row. The children and their assets live inside the
    /// document, so the cascade is the row delete itself; nothing can remain
    /// retrievable afterwards.
    pub async fn delete_batch(&self, raw_key: &str) -> StoreResult<Batch<C>> {
        let batch = self.fetch_batch(raw_key).await?;
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
        let result = sqlx::query(&sql).bind(batch.id).execute(&*self.db).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::BatchNotFound(batch.key));
        }
        Ok(batch)
    }

    /// The mutation engine: load the parent, let `op` edit the child list in
    /// memory, persist the whole document back conditioned on the version it
    /// was read at. A missed condition means a concurrent writer won; reload
    /// and retry up to [`MUTATION_RETRIES`] times.
    pub async fn mutate<T, F>(&self, raw_key: &str, op: F) -> StoreResult<T>
    where
        F: Fn(&mut Vec<C>) -> StoreResult<T>,
    {
        Ok(self.mutate_full(raw_key, op).await?.0)
    }

    /// [`Self::mutate`], additionally returning the batch state the winning
    /// conditional write persisted, without a re-read.
    async fn mutate_full<T, F>(&self, raw_key: &str, op: F) -> StoreResult<(T, Batch<C>)>
    where
        F: Fn(&mut Vec<C>) -> StoreResult<T>,
    {
        let key = self.key_kind.canonicalize(raw_key)?;
        let sql = format!(
            "UPDATE {} SET doc = ?, version = version + 1 WHERE id = ? AND version = ?",
            self.table
        );
        for attempt in 0..MUTATION_RETRIES {
            let row = self
                .fetch_row(&key)
                .await?
                .ok_or_else(|| StoreError::BatchNotFound(key.clone()))?;
            let (row_id, version) = (row.id, row.version);
            let mut batch = row.into_batch::<C>()?;

            let out = op(&mut batch.children)?;
            let doc = serde_json::to_string(&batch.children)?;

            let result = sqlx::query(&sql)
                .bind(&doc)
                .bind(row_id)
                .bind(version)
                .execute(&*self.db)
                .await?;
            if result.rows_affected() == 1 {
                batch.version = version + 1;
                return Ok((out, batch));
            }
            debug!(
                batch = %key,
                attempt,
                "conditional write missed, batch changed underneath us; retrying"
            );
        }
        Err(StoreError::Contention(key))
    }

    /// Append a child at the end of the collection. Fails with a conflict if
    /// the family's uniqueness key collides with an existing child.
    pub async fn append_child(&self, raw_key: &str, child: C) -> StoreResult<C> {
        self.mutate(raw_key, move |children| {
            if children.iter().any(|existing| existing.conflicts_with(&child)) {
                return Err(StoreError::DuplicateChild(C::DUPLICATE_MESSAGE));
            }
            children.push(child.clone());
            Ok(child.clone())
        })
        .await
    }

    pub async fn get_child<F>(&self, raw_key: &str, find: F) -> StoreResult<C>
    where
        F: Fn(&C) -> bool,
    {
        let batch = self.fetch_batch(raw_key).await?;
        batch
            .children
            .into_iter()
            .find(|child| find(child))
            .ok_or(StoreError::ChildNotFound)
    }

    /// One page of children in insertion order; the collection is never
    /// reordered by content.
    pub async fn list_children(
        &self,
        raw_key: &str,
        req: PageRequest,
    ) -> StoreResult<(Vec<C>, PageInfo)> {
        let batch = self.fetch_batch(raw_key).await?;
        let total = batch.children.len();
        let page = paginate(&batch.children, req).to_vec();
        Ok((page, PageInfo::compute(req, total)))
    }

    /// Merge a partial update into one child and refresh its `updated_at`.
    pub async fn update_child<F, A>(&self, raw_key: &str, find: F, apply: A) -> StoreResult<C>
    where
        F: Fn(&C) -> bool,
        A: Fn(&mut C) -> StoreResult<()>,
    {
        let now = Utc::now();
        self.mutate(raw_key, move |children| {
            let idx = children
                .iter()
                .position(|child| find(child))
                .ok_or(StoreError::ChildNotFound)?;
            apply(&mut children[idx])?;
            children[idx].touch(now);
            Ok(children[idx].clone())
        })
        .await
    }

    /// Remove one child, preserving the order of the rest. Removing an
    /// absent child is an error, never a silent no-op.
    pub async fn remove_child<F>(&self, raw_key: &str, find: F) -> StoreResult<C>
    where
        F: Fn(&C) -> bool,
    {
        self.mutate(raw_key, move |children| {
            remove_child_at(children, &find).ok_or(StoreError::ChildNotFound)
        })
        .await
    }

    /// Flatten (batch, child) pairs across one batch or all of them, keep
    /// the children `matches` accepts, and sort by child creation time,
    /// newest first (stable, so insertion order breaks ties).
    pub async fn search<F>(
        &self,
        raw_key: Option<&str>,
        matches: F,
    ) -> StoreResult<Vec<SearchHit<C>>>
    where
        F: Fn(&C) -> bool,
    {
        let mut hits: Vec<SearchHit<C>> = Vec::new();

        match raw_key {
            Some(raw) => {
                let key = self.key_kind.canonicalize(raw)?;
                // An absent batch yields an empty result set, not an error.
                if let Some(row) = self.fetch_row(&key).await? {
                    collect_hits(row, &matches, &mut hits)?;
                }
            }
            None => {
                let sql = format!(
                    "SELECT id, batch_key, doc, version, created_at FROM {}",
                    self.table
                );
                let mut rows = sqlx::query_as::<_, BatchRow>(&sql).fetch(&*self.db);
                while let Some(row) = rows.try_next().await? {
                    collect_hits(row, &matches, &mut hits)?;
                }
            }
        }

        hits.sort_by(|a, b| b.child.created_at().cmp(&a.child.created_at()));
        Ok(hits)
    }

    /// Statistics are computed on demand from the live document, never
    /// cached. An empty batch reports its own creation time as
    /// `last_updated`.
    pub async fn stats(&self, raw_key: &str) -> StoreResult<BatchStats> {
        let batch = self.fetch_batch(raw_key).await?;

        let mut asset_counts = BTreeMap::new();
        for slot in C::ASSET_SLOTS {
            let count = batch
                .children
                .iter()
                .filter(|child| child.asset(slot).is_some())
                .count();
            asset_counts.insert(*slot, count);
        }

        let distinct_titles = {
            let mut titles: Vec<&str> = batch.children.iter().map(ChildEntity::title).collect();
            titles.sort_unstable();
            titles.dedup();
            titles.len()
        };

        let last_updated = batch
            .children
            .iter()
            .map(ChildEntity::updated_at)
            .max()
            .unwrap_or(batch.created_at);

        Ok(BatchStats {
            batch_key: batch.key,
            total_children: batch.children.len(),
            asset_counts,
            distinct_titles,
            created_at: batch.created_at,
            last_updated,
        })
    }
}

fn collect_hits<C: ChildEntity>(
    row: BatchRow,
    matches: &impl Fn(&C) -> bool,
    hits: &mut Vec<SearchHit<C>>,
) -> StoreResult<()> {
    let batch = row.into_batch::<C>()?;
    for child in batch.children {
        if matches(&child) {
            hits.push(SearchHit {
                batch_key: batch.key.clone(),
                batch_created_at: batch.created_at,
                child,
            });
        }
    }
    Ok(())
}

/// Targeted positional removal. Must leave the collection in the same state
/// as filtering the list and rewriting it (see tests).
fn remove_child_at<C: ChildEntity>(children: &mut Vec<C>, find: &impl Fn(&C) -> bool) -> Option<C> {
    let idx = children.iter().position(|child| find(child))?;
    Some(children.remove(idx))
}

/// Case-insensitive substring match used by the search filters.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Return true if a SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Apply the embedded schema. Idempotent; run at startup and by tests.
pub async fn apply_migrations(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let sql = include_str!("../../migrations/0001_init.sql");
    for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement).execute(db).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::internship::{Internship, InternshipDraft, InternshipPatch};
    use crate::models::team::{TeamDraft, TeamProject};
    use bytes::Bytes;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::models::asset::AssetEnvelope;

    async fn stores() -> (BatchStore<Internship>, BatchStore<TeamProject>) {
        let db = Arc::new(
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .unwrap(),
        );
        apply_migrations(&db).await.unwrap();
        (
            BatchStore::new(db.clone(), "internship_batches", KeyKind::YearRange),
            BatchStore::new(db, "team_batches", KeyKind::Numeric),
        )
    }

    fn intern(name: &str, roll_no: &str, title: &str) -> Internship {
        InternshipDraft {
            name: Some(name.into()),
            roll_no: Some(roll_no.into()),
            internship_title: Some(title.into()),
            ..Default::default()
        }
        .build(Utc::now())
        .unwrap()
    }

    fn team(number: i64) -> TeamProject {
        let asset = |name: &str| {
            AssetEnvelope::from_upload(Bytes::from_static(b"x"), "image/png", name, 64).unwrap()
        };
        TeamDraft {
            team_number: Some(number.to_string()),
            title: Some("Portal".into()),
            description: Some("desc".into()),
            deployment_link: Some("https://example.com".into()),
            github_link: Some("https://github.com/x/y".into()),
            project_image: Some(asset("a.png")),
            document: Some(asset("b.pdf")),
            video: None,
        }
        .build(Utc::now())
        .unwrap()
    }

    #[tokio::test]
    async fn duplicate_batch_key_is_a_conflict() {
        let (internships, _) = stores().await;
        internships.create_batch("2024-2025", vec![]).await.unwrap();
        let err = internships
            .create_batch("2024-2025", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BatchAlreadyExists(_)));

        let (_, info) = internships
            .list_batches(PageRequest::default(), BatchSort::CreatedAt, SortOrder::Desc)
            .await
            .unwrap();
        assert_eq!(info.total_items, 1);
    }

    #[tokio::test]
    async fn malformed_keys_are_rejected_per_family() {
        let (internships, teams) = stores().await;
        let err = internships.create_batch("2024/25", vec![]).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidBatchKey { .. }));
        let err = teams.create_batch("first", vec![]).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidBatchKey { .. }));
        // Numeric keys canonicalize, so "007" and "7" are the same batch.
        teams.create_batch("007", vec![]).await.unwrap();
        let err = teams.create_batch("7", vec![]).await.unwrap_err();
        assert!(matches!(err, StoreError::BatchAlreadyExists(_)));
    }

    #[tokio::test]
    async fn child_writes_are_isolated_between_batches() {
        let (internships, _) = stores().await;
        internships.create_batch("2023-2024", vec![]).await.unwrap();
        internships.create_batch("2024-2025", vec![]).await.unwrap();

        internships
            .append_child("2023-2024", intern("Ann", "R1", "SWE"))
            .await
            .unwrap();

        let other = internships.fetch_batch("2024-2025").await.unwrap();
        assert!(other.children.is_empty());
        let touched = internships.fetch_batch("2023-2024").await.unwrap();
        assert_eq!(touched.children.len(), 1);
    }

    #[tokio::test]
    async fn asset_round_trips_byte_identical() {
        let (internships, _) = stores().await;
        internships.create_batch("2024-2025", vec![]).await.unwrap();

        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let mut child = intern("Ann", "R1", "SWE");
        child.certificate = Some(
            AssetEnvelope::from_upload(
                Bytes::from(payload.clone()),
                "application/pdf",
                "cert.pdf",
                1 << 20,
            )
            .unwrap(),
        );
        let saved = internships.append_child("2024-2025", child).await.unwrap();

        let loaded = internships
            .get_child("2024-2025", |c| c.id == saved.id)
            .await
            .unwrap();
        let cert = loaded.certificate.unwrap();
        assert_eq!(cert.flat_bytes().unwrap().as_ref(), payload.as_slice());
        assert_eq!(cert.mime_type, "application/pdf");
        assert_eq!(cert.original_filename, "cert.pdf");
        assert_eq!(cert.size, 4096);
    }

    #[tokio::test]
    async fn children_paginate_in_insertion_order() {
        let (internships, _) = stores().await;
        internships.create_batch("2024-2025", vec![]).await.unwrap();
        for i in 0..25 {
            internships
                .append_child("2024-2025", intern(&format!("s{i}"), &format!("R{i}"), "T"))
                .await
                .unwrap();
        }

        let (page, info) = internships
            .list_children("2024-2025", PageRequest::new(Some(3), Some(10)))
            .await
            .unwrap();
        assert_eq!(info.total_pages, 3);
        assert_eq!(page.len(), 5);
        assert_eq!(page[0].name, "s20");
        assert!(info.has_prev);
        assert!(!info.has_next);
    }

    #[tokio::test]
    async fn update_merges_fields_and_advances_updated_at() {
        let (internships, _) = stores().await;
        internships.create_batch("2024-2025", vec![]).await.unwrap();
        let saved = internships
            .append_child("2024-2025", intern("Ann", "R1", "SWE Intern"))
            .await
            .unwrap();
        assert_eq!(saved.created_at, saved.updated_at);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let patch = InternshipPatch {
            duration: Some(Some("3 months".into())),
            ..Default::default()
        };
        let updated = internships
            .update_child(
                "2024-2025",
                |c| c.id == saved.id,
                |c| patch.apply(c).map_err(|e| StoreError::Invalid(e.0)),
            )
            .await
            .unwrap();

        assert_eq!(updated.duration.as_deref(), Some("3 months"));
        assert_eq!(updated.name, "Ann");
        assert_eq!(updated.roll_no, "R1");
        assert!(updated.updated_at > updated.created_at);
    }

    #[tokio::test]
    async fn removing_a_child_preserves_sibling_order() {
        let (internships, _) = stores().await;
        internships.create_batch("2024-2025", vec![]).await.unwrap();
        let mut ids = Vec::new();
        for i in 0..4 {
            let saved = internships
                .append_child("2024-2025", intern(&format!("s{i}"), &format!("R{i}"), "T"))
                .await
                .unwrap();
            ids.push(saved.id);
        }

        let removed = internships
            .remove_child("2024-2025", |c| c.id == ids[1])
            .await
            .unwrap();
        assert_eq!(removed.name, "s1");

        let batch = internships.fetch_batch("2024-2025").await.unwrap();
        let names: Vec<&str> = batch.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["s0", "s2", "s3"]);

        let err = internships
            .remove_child("2024-2025", |c| c.id == ids[1])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ChildNotFound));
    }

    #[tokio::test]
    async fn positional_remove_matches_filter_rewrite() {
        let mut positional: Vec<Internship> =
            (0..5).map(|i| intern(&format!("s{i}"), "R", "T")).collect();
        let mut filtered = positional.clone();
        let target = positional[2].id;

        remove_child_at(&mut positional, &|c: &Internship| c.id == target).unwrap();
        filtered.retain(|c| c.id != target);

        let a: Vec<Uuid> = positional.iter().map(|c| c.id).collect();
        let b: Vec<Uuid> = filtered.iter().map(|c| c.id).collect();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn deleting_a_batch_cascades_to_children() {
        let (internships, _) = stores().await;
        internships.create_batch("2024-2025", vec![]).await.unwrap();
        let mut ids = Vec::new();
        for i in 0..3 {
            let mut child = intern(&format!("s{i}"), &format!("R{i}"), "T");
            child.image = Some(
                AssetEnvelope::from_upload(Bytes::from_static(b"img"), "image/png", "a.png", 64)
                    .unwrap(),
            );
            ids.push(
                internships
                    .append_child("2024-2025", child)
                    .await
                    .unwrap()
                    .id,
            );
        }

        internships.delete_batch("2024-2025").await.unwrap();

        assert!(matches!(
            internships.fetch_batch("2024-2025").await.unwrap_err(),
            StoreError::BatchNotFound(_)
        ));
        for id in ids {
            let err = internships
                .get_child("2024-2025", |c| c.id == id)
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::BatchNotFound(_)));
        }
    }

    #[tokio::test]
    async fn duplicate_team_number_within_a_batch_conflicts() {
        let (_, teams) = stores().await;
        teams.create_batch("1", vec![]).await.unwrap();
        teams.append_child("1", team(7)).await.unwrap();
        let err = teams.append_child("1", team(7)).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateChild(_)));

        // Same number in a different batch is fine.
        teams.create_batch("2", vec![]).await.unwrap();
        teams.append_child("2", team(7)).await.unwrap();
    }

    /// Bump the version out from under an in-flight mutation, simulating a
    /// concurrent writer landing between the read and the conditional write.
    fn bump_version(db: &SqlitePool, table: &str) {
        futures::executor::block_on(
            sqlx::query(&format!("UPDATE {} SET version = version + 1", table)).execute(db),
        )
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conditional_write_miss_reloads_and_retries() {
        let (internships, _) = stores().await;
        internships.create_batch("2024-2025", vec![]).await.unwrap();
        let db = internships.db.clone();

        // First attempt reads version 0 and loses the race; the retry reads
        // the bumped version and lands.
        let raced = AtomicBool::new(false);
        let child = intern("Ann", "R1", "SWE");
        internships
            .mutate("2024-2025", |children: &mut Vec<Internship>| {
                if !raced.swap(true, Ordering::SeqCst) {
                    bump_version(&db, "internship_batches");
                }
                children.push(child.clone());
                Ok(child.clone())
            })
            .await
            .unwrap();

        let batch = internships.fetch_batch("2024-2025").await.unwrap();
        assert_eq!(batch.children.len(), 1);
        // One external bump plus the committed retry.
        assert_eq!(batch.version, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exhausted_retries_surface_as_contention() {
        let (internships, _) = stores().await;
        internships.create_batch("2024-2025", vec![]).await.unwrap();
        let db = internships.db.clone();

        // Every attempt loses the race.
        let err = internships
            .mutate("2024-2025", |children: &mut Vec<Internship>| {
                bump_version(&db, "internship_batches");
                children.push(intern("Ann", "R1", "SWE"));
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Contention(_)));

        // No attempt committed; there is no partial or lost write.
        let batch = internships.fetch_batch("2024-2025").await.unwrap();
        assert!(batch.children.is_empty());
    }

    #[tokio::test]
    async fn update_returns_the_state_the_write_persisted() {
        let (internships, _) = stores().await;
        internships
            .create_batch("2024-2025", vec![intern("Ann", "R1", "SWE")])
            .await
            .unwrap();

        let updated = internships
            .update_batch("2024-2025", None, Some(vec![intern("Bea", "R9", "Data")]))
            .await
            .unwrap();
        assert_eq!(updated.children.len(), 1);
        assert_eq!(updated.children[0].name, "Bea");
        assert_eq!(updated.version, 1);

        let fetched = internships.fetch_batch("2024-2025").await.unwrap();
        assert_eq!(fetched.version, updated.version);
        assert_eq!(fetched.children[0].name, "Bea");
    }

    #[tokio::test]
    async fn batch_key_is_immutable_through_update() {
        let (internships, _) = stores().await;
        internships.create_batch("2024-2025", vec![]).await.unwrap();
        let err = internships
            .update_batch("2024-2025", Some("2025-2026"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        // Restating the same key is a no-op, not an error.
        internships
            .update_batch("2024-2025", Some("2024-2025"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn search_composes_filters_case_insensitively() {
        let (internships, _) = stores().await;
        internships.create_batch("2024-2025", vec![]).await.unwrap();
        internships.create_batch("2023-2024", vec![]).await.unwrap();
        internships
            .append_child("2024-2025", intern("Annette", "R1", "SWE"))
            .await
            .unwrap();
        internships
            .append_child("2024-2025", intern("Bob", "R2", "SWE"))
            .await
            .unwrap();
        internships
            .append_child("2023-2024", intern("Anna", "R3", "SWE"))
            .await
            .unwrap();

        let hits = internships
            .search(Some("2024-2025"), |c| contains_ci(&c.name, "ANN"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].child.name, "Annette");
        assert_eq!(hits[0].batch_key, "2024-2025");
        let parent = internships.fetch_batch("2024-2025").await.unwrap();
        assert_eq!(hits[0].batch_created_at, parent.created_at);

        // No batch restriction: both matches, newest first.
        let hits = internships
            .search(None, |c| contains_ci(&c.name, "ann"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].child.created_at() >= hits[1].child.created_at());

        // Absent batch is an empty result, not an error.
        let hits = internships
            .search(Some("1999-2000"), |_| true)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn stats_report_assets_titles_and_last_updated() {
        let (internships, _) = stores().await;
        internships
            .create_batch("2024-2025", vec![])
            .await
            .unwrap();

        // Empty batch: lastUpdated falls back to the batch creation time.
        let stats = internships.stats("2024-2025").await.unwrap();
        assert_eq!(stats.total_children, 0);
        assert_eq!(stats.last_updated, stats.created_at);

        let mut with_image = intern("Ann", "R1", "SWE");
        with_image.image = Some(
            AssetEnvelope::from_upload(Bytes::from_static(b"i"), "image/png", "i.png", 64).unwrap(),
        );
        internships
            .append_child("2024-2025", with_image)
            .await
            .unwrap();
        internships
            .append_child("2024-2025", intern("Bob", "R2", "SWE"))
            .await
            .unwrap();
        internships
            .append_child("2024-2025", intern("Cid", "R3", "Data Intern"))
            .await
            .unwrap();

        let stats = internships.stats("2024-2025").await.unwrap();
        assert_eq!(stats.total_children, 3);
        assert_eq!(stats.asset_counts["image"], 1);
        assert_eq!(stats.asset_counts["certificate"], 0);
        assert_eq!(stats.distinct_titles, 2);
        assert!(stats.last_updated >= stats.created_at);
    }

    #[tokio::test]
    async fn deleting_an_absent_batch_is_not_found() {
        let (internships, _) = stores().await;
        let err = internships.delete_batch("2024-2025").await.unwrap_err();
        assert!(matches!(err, StoreError::BatchNotFound(_)));
    }
}
