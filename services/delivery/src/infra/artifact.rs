use anyhow::Context as _;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use crate::domain::repository::{ArtifactRenderer, ArtifactStore};
use crate::domain::types::AdmissionDraft;

#[derive(Serialize)]
struct ReservationDocument<'a> {
    document: &'static str,
    tenant_id: String,
    draft_id: String,
    applicant_name: &'a str,
    grade_level: &'a str,
    #[serde(serialize_with = "campus_core::serde::to_rfc3339_ms")]
    issued_at: chrono::DateTime<Utc>,
}

/// Renders the seat reservation confirmation as a JSON document.
#[derive(Clone, Default)]
pub struct ReservationDocumentRenderer;

impl ArtifactRenderer for ReservationDocumentRenderer {
    async fn render(&self, draft: &AdmissionDraft) -> anyhow::Result<Vec<u8>> {
        let document = ReservationDocument {
            document: "admission_reservation",
            tenant_id: draft.tenant_id.to_string(),
            draft_id: draft.id.to_string(),
            applicant_name: &draft.applicant_name,
            grade_level: &draft.grade_level,
            issued_at: Utc::now(),
        };
        serde_json::to_vec_pretty(&document).context("render reservation document")
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

/// Object storage reached with plain `PUT {base}/{path}`.
#[derive(Clone)]
pub struct HttpObjectStore {
    pub client: reqwest::Client,
    pub base_url: String,
    pub token: Option<String>,
}

impl ArtifactStore for HttpObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<()> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut request = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .with_context(|| format!("upload {path}"))?
            .error_for_status()
            .with_context(|| format!("upload {path}"))?;
        Ok(())
    }
}
