//! Core data models for the club-portal batch store.
//!
//! Batches are parent documents owning an ordered collection of child
//! entities (internships or team projects); children carry optional binary
//! asset envelopes. Children serialize via `serde` both into the persisted
//! batch document and (through view types) onto the API surface.

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::models::asset::AssetEnvelope;

pub mod asset;
pub mod internship;
pub mod page;
pub mod team;

/// A field-level validation failure, surfaced to clients as a 400.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct FieldError(pub String);

/// Require a non-empty trimmed value for a mandatory scalar field.
pub fn require(field: &str, value: Option<String>) -> Result<String, FieldError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(FieldError(format!("field `{}` is required", field))),
    }
}

/// Normalize an optional scalar: a blank submission means "not provided".
pub fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Behaviour every batch-embedded child record shares. The store is generic
/// over this trait; the two families implement it with their own fields and
/// asset slots.
pub trait ChildEntity:
    Clone + Serialize + DeserializeOwned + Send + Sync + Unpin + 'static
{
    /// Asset slot names in the order they are reported by batch stats.
    const ASSET_SLOTS: &'static [&'static str];

    /// Message returned when appending a child whose key already exists.
    const DUPLICATE_MESSAGE: &'static str = "child already exists in this batch";

    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;

    /// Refresh `updated_at` after a successful mutation.
    fn touch(&mut self, now: DateTime<Utc>);

    /// The designated title field, used for distinct-title statistics.
    fn title(&self) -> &str;

    fn asset(&self, slot: &str) -> Option<&AssetEnvelope>;

    /// Whether two children collide on the family's uniqueness key. Children
    /// addressed purely by generated id never collide.
    fn conflicts_with(&self, _other: &Self) -> bool {
        false
    }
}
