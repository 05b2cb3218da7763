//! Internship child records, embedded in year-range batches ("2024-2025").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    ChildEntity, FieldError, optional, require,
    asset::{AssetEnvelope, AssetMeta},
};

/// One internship record inside a batch. Addressed by its generated id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Internship {
    pub id: Uuid,
    pub name: String,
    pub roll_no: String,
    pub internship_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<AssetEnvelope>,
    #[serde(default)]
    pub certificate: Option<AssetEnvelope>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChildEntity for Internship {
    const ASSET_SLOTS: &'static [&'static str] = &["image", "certificate"];

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn title(&self) -> &str {
        &self.internship_title
    }

    fn asset(&self, slot: &str) -> Option<&AssetEnvelope> {
        match slot {
            "image" => self.image.as_ref(),
            "certificate" => self.certificate.as_ref(),
            _ => None,
        }
    }
}

/// Fields collected from a create request (multipart form or JSON seed)
/// before the record exists.
#[derive(Debug, Default)]
pub struct InternshipDraft {
    pub name: Option<String>,
    pub roll_no: Option<String>,
    pub internship_title: Option<String>,
    pub company: Option<String>,
    pub duration: Option<String>,
    pub description: Option<String>,
    pub image: Option<AssetEnvelope>,
    pub certificate: Option<AssetEnvelope>,
}

impl InternshipDraft {
    /// Validate required fields and mint the record. Both timestamps start
    /// at the same instant.
    pub fn build(self, now: DateTime<Utc>) -> Result<Internship, FieldError> {
        Ok(Internship {
            id: Uuid::new_v4(),
            name: require("name", self.name)?,
            roll_no: require("rollNo", self.roll_no)?,
            internship_title: require("internshipTitle", self.internship_title)?,
            company: optional(self.company),
            duration: optional(self.duration),
            description: optional(self.description),
            image: self.image,
            certificate: self.certificate,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update. `None` leaves a field untouched; for the optional scalars
/// `Some(None)` explicitly clears the value (a blank form field). Present
/// asset slots replace the prior envelope wholesale.
#[derive(Debug, Default)]
pub struct InternshipPatch {
    pub name: Option<String>,
    pub roll_no: Option<String>,
    pub internship_title: Option<String>,
    pub company: Option<Option<String>>,
    pub duration: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub image: Option<AssetEnvelope>,
    pub certificate: Option<AssetEnvelope>,
}

impl InternshipPatch {
    pub fn apply(&self, record: &mut Internship) -> Result<(), FieldError> {
        if let Some(name) = &self.name {
            record.name = require("name", Some(name.clone()))?;
        }
        if let Some(roll_no) = &self.roll_no {
            record.roll_no = require("rollNo", Some(roll_no.clone()))?;
        }
        if let Some(title) = &self.internship_title {
            record.internship_title = require("internshipTitle", Some(title.clone()))?;
        }
        if let Some(company) = &self.company {
            record.company = company.clone();
        }
        if let Some(duration) = &self.duration {
            record.duration = duration.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(image) = &self.image {
            record.image = Some(image.clone());
        }
        if let Some(certificate) = &self.certificate {
            record.certificate = Some(certificate.clone());
        }
        Ok(())
    }
}

/// API projection: asset payloads are replaced by their metadata.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternshipView {
    pub id: Uuid,
    pub name: String,
    pub roll_no: String,
    pub internship_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub image: Option<AssetMeta>,
    pub certificate: Option<AssetMeta>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Internship> for InternshipView {
    fn from(record: &Internship) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            roll_no: record.roll_no.clone(),
            internship_title: record.internship_title.clone(),
            company: record.company.clone(),
            duration: record.duration.clone(),
            description: record.description.clone(),
            image: record.image.as_ref().map(AssetEnvelope::meta),
            certificate: record.certificate.as_ref().map(AssetEnvelope::meta),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> InternshipDraft {
        InternshipDraft {
            name: Some("Ann".into()),
            roll_no: Some("R1".into()),
            internship_title: Some("SWE Intern".into()),
            ..Default::default()
        }
    }

    #[test]
    fn build_requires_the_mandatory_fields() {
        let mut incomplete = draft();
        incomplete.roll_no = Some("   ".into());
        let err = incomplete.build(Utc::now()).unwrap_err();
        assert!(err.0.contains("rollNo"));
    }

    #[test]
    fn build_normalizes_blank_optionals_to_none() {
        let mut d = draft();
        d.company = Some("".into());
        d.duration = Some("3 months".into());
        let record = d.build(Utc::now()).unwrap();
        assert_eq!(record.company, None);
        assert_eq!(record.duration.as_deref(), Some("3 months"));
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let mut record = draft().build(Utc::now()).unwrap();
        let patch = InternshipPatch {
            duration: Some(Some("3 months".into())),
            ..Default::default()
        };
        patch.apply(&mut record).unwrap();
        assert_eq!(record.name, "Ann");
        assert_eq!(record.duration.as_deref(), Some("3 months"));

        let clear = InternshipPatch {
            duration: Some(None),
            ..Default::default()
        };
        clear.apply(&mut record).unwrap();
        assert_eq!(record.duration, None);
    }

    #[test]
    fn patch_rejects_blanking_a_required_field() {
        let mut record = draft().build(Utc::now()).unwrap();
        let patch = InternshipPatch {
            name: Some("  ".into()),
            ..Default::default()
        };
        assert!(patch.apply(&mut record).is_err());
        assert_eq!(record.name, "Ann");
    }
}
