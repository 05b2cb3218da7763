//! Team-project child records, embedded in integer-keyed batches and
//! addressed by team number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    ChildEntity, FieldError, require,
    asset::{AssetEnvelope, AssetMeta},
};

/// One deployed-project team inside a batch. The team number is the lookup
/// key and must be unique within its batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamProject {
    pub id: Uuid,
    pub team_number: i64,
    pub title: String,
    pub description: String,
    pub deployment_link: String,
    pub github_link: String,
    #[serde(default)]
    pub project_image: Option<AssetEnvelope>,
    #[serde(default)]
    pub document: Option<AssetEnvelope>,
    #[serde(default)]
    pub video: Option<AssetEnvelope>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChildEntity for TeamProject {
    const ASSET_SLOTS: &'static [&'static str] = &["projectImage", "document", "video"];
    const DUPLICATE_MESSAGE: &'static str = "team number already exists in this batch";

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
        &self.title
    }

    fn asset(&self, slot: &str) -> Option<&AssetEnvelope> {
        match slot {
            "projectImage" => self.project_image.as_ref(),
            "document" => self.document.as_ref(),
            "video" => self.video.as_ref(),
            _ => None,
        }
    }

    fn conflicts_with(&self, other: &Self) -> bool {
        self.team_number == other.team_number
    }
}

fn require_link(field: &str, value: Option<String>) -> Result<String, FieldError> {
    let link = require(field, value)?;
    if link.starts_with("http://") || link.starts_with("https://") {
        Ok(link)
    } else {
        Err(FieldError(format!("field `{}` must be an http(s) URL", field)))
    }
}

/// Fields collected from a multipart create request. The project image and
/// document parts are mandatory at creation; video is optional.
#[derive(Debug, Default)]
pub struct TeamDraft {
    pub team_number: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub deployment_link: Option<String>,
    pub github_link: Option<String>,
    pub project_image: Option<AssetEnvelope>,
    pub document: Option<AssetEnvelope>,
    pub video: Option<AssetEnvelope>,
}

impl TeamDraft {
    pub fn build(self, now: DateTime<Utc>) -> Result<TeamProject, FieldError> {
        let team_number = require("teamNumber", self.team_number)?
            .parse::<i64>()
            .map_err(|_| FieldError("field `teamNumber` must be an integer".into()))?;
        let project_image = self
            .project_image
            .ok_or_else(|| FieldError("file part `projectImage` is required".into()))?;
        let document = self
            .document
            .ok_or_else(|| FieldError("file part `document` is required".into()))?;
        Ok(TeamProject {
            id: Uuid::new_v4(),
            team_number,
            title: require("title", self.title)?,
            description: require("description", self.description)?,
            deployment_link: require_link("deploymentLink", self.deployment_link)?,
            github_link: require_link("githubLink", self.github_link)?,
            project_image: Some(project_image),
            document: Some(document),
            video: self.video,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update; the team number itself is not patchable (it is the lookup
/// key within the batch). Present asset slots replace the prior envelope.
#[derive(Debug, Default)]
pub struct TeamPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub deployment_link: Option<String>,
    pub github_link: Option<String>,
    pub project_image: Option<AssetEnvelope>,
    pub document: Option<AssetEnvelope>,
    pub video: Option<AssetEnvelope>,
}

impl TeamPatch {
    pub fn apply(&self, record: &mut TeamProject) -> Result<(), FieldError> {
        if let Some(title) = &self.title {
            record.title = require("title", Some(title.clone()))?;
        }
        if let Some(description) = &self.description {
            record.description = require("description", Some(description.clone()))?;
        }
        if let Some(link) = &self.deployment_link {
            record.deployment_link = require_link("deploymentLink", Some(link.clone()))?;
        }
        if let Some(link) = &self.github_link {
            record.github_link = require_link("githubLink", Some(link.clone()))?;
        }
        if let Some(image) = &self.project_image {
            record.project_image = Some(image.clone());
        }
        if let Some(document) = &self.document {
            record.document = Some(document.clone());
        }
        if let Some(video) = &self.video {
            record.video = Some(video.clone());
        }
        Ok(())
    }
}

/// API projection with asset metadata only.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamView {
    pub id: Uuid,
    pub team_number: i64,
    pub title: String,
    pub description: String,
    pub deployment_link: String,
    pub github_link: String,
    pub project_image: Option<AssetMeta>,
    pub document: Option<AssetMeta>,
    pub video: Option<AssetMeta>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&TeamProject> for TeamView {
    fn from(record: &TeamProject) -> Self {
        Self {
            id: record.id,
            team_number: record.team_number,
            title: record.title.clone(),
            description: record.description.clone(),
            deployment_link: record.deployment_link.clone(),
            github_link: record.github_link.clone(),
            project_image: record.project_image.as_ref().map(AssetEnvelope::meta),
            document: record.document.as_ref().map(AssetEnvelope::meta),
            video: record.video.as_ref().map(AssetEnvelope::meta),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn asset(name: &str) -> AssetEnvelope {
        AssetEnvelope::from_upload(Bytes::from_static(b"data"), "image/png", name, 1024).unwrap()
    }

    fn draft() -> TeamDraft {
        TeamDraft {
            team_number: Some("7".into()),
            title: Some("Portal".into()),
            description: Some("Club portal".into()),
            deployment_link: Some("https://example.com".into()),
            github_link: Some("https://github.com/club/portal".into()),
            project_image: Some(asset("shot.png")),
            document: Some(asset("report.pdf")),
            video: None,
        }
    }

    #[test]
    fn build_requires_image_and_document_parts() {
        let mut missing = draft();
        missing.document = None;
        let err = missing.build(Utc::now()).unwrap_err();
        assert!(err.0.contains("document"));
    }

    #[test]
    fn build_rejects_non_http_links() {
        let mut bad = draft();
        bad.github_link = Some("ftp://example.com".into());
        assert!(bad.build(Utc::now()).is_err());
    }

    #[test]
    fn build_rejects_non_numeric_team_number() {
        let mut bad = draft();
        bad.team_number = Some("seven".into());
        assert!(bad.build(Utc::now()).is_err());
    }

    #[test]
    fn teams_conflict_on_team_number() {
        let a = draft().build(Utc::now()).unwrap();
        let mut other = draft();
        other.team_number = Some("8".into());
        let b = other.build(Utc::now()).unwrap();
        assert!(a.conflicts_with(&a.clone()));
        assert!(!a.conflicts_with(&b));
    }
}
