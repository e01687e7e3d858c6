use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use campus_domain::id::{DraftId, TenantId};

use crate::domain::repository::{AdmissionDraftRepository, ArtifactRenderer, ArtifactStore};
use crate::domain::types::{AdmissionDraft, reservation_artifact_path};
use crate::error::DeliveryServiceError;

/// Tries at recording a finished upload before the reservation is given up.
const MARK_READY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationArtifact {
    pub path: String,
    /// Whether this call produced the artifact, as opposed to waiting for another.
    pub generated: bool,
}

/// Generate the reservation document for a draft exactly once, however many
/// requests race for it.
///
/// The conditional write of `artifact_path` picks the winner. Everyone else
/// waits for the winner to mark the draft ready.
pub struct ReserveArtifactUseCase<D, Rn, St>
where
    D: AdmissionDraftRepository,
    Rn: ArtifactRenderer,
    St: ArtifactStore,
{
    pub drafts: D,
    pub renderer: Rn,
    pub store: St,
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
}

impl<D, Rn, St> ReserveArtifactUseCase<D, Rn, St>
where
    D: AdmissionDraftRepository,
    Rn: ArtifactRenderer,
    St: ArtifactStore,
{
    pub async fn execute(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
    ) -> Result<ReservationArtifact, DeliveryServiceError> {
        let path = reservation_artifact_path(tenant_id, draft_id);

        if self.drafts.try_reserve(tenant_id, draft_id, &path).await? {
            self.generate(tenant_id, draft_id, &path).await?;
            return Ok(ReservationArtifact {
                path,
                generated: true,
            });
        }

        let path = self.wait_until_ready(tenant_id, draft_id).await?;
        Ok(ReservationArtifact {
            path,
            generated: false,
        })
    }

    /// Runs with the reservation held. Any failure releases it so the next
    /// request can win again instead of waiting on a reservation nobody owns.
    async fn generate(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
        path: &str,
    ) -> Result<(), DeliveryServiceError> {
        let result = match self.upload(tenant_id, draft_id, path).await {
            Ok(()) => self.mark_ready(tenant_id, draft_id, path).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            tracing::warn!(
                tenant_id = %tenant_id,
                draft_id = %draft_id,
                error = ?e,
                "reservation artifact generation failed, releasing reservation"
            );
            if let Err(release_err) = self.drafts.release(tenant_id, draft_id, path).await {
                tracing::error!(
                    tenant_id = %tenant_id,
                    draft_id = %draft_id,
                    error = ?release_err,
                    "failed to release reservation"
                );
            }
        }
        result
    }

    async fn upload(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
        path: &str,
    ) -> Result<(), DeliveryServiceError> {
        let Some(draft) = self.drafts.find(tenant_id, draft_id).await? else {
            return Err(DeliveryServiceError::DraftNotFound);
        };
        self.render_and_upload(&draft, path)
            .await
            .map_err(DeliveryServiceError::ArtifactFailed)
    }

    /// The object is already uploaded here, so a transient store error is
    /// retried rather than throwing the upload away.
    async fn mark_ready(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
        path: &str,
    ) -> Result<(), DeliveryServiceError> {
        let mut attempt = 1;
        loop {
            match self
                .drafts
                .mark_ready(tenant_id, draft_id, path, Utc::now())
                .await
            {
                Ok(true) => {
                    tracing::info!(tenant_id = %tenant_id, draft_id = %draft_id, path, "reservation artifact ready");
                    return Ok(());
                }
                Ok(false) => {
                    return Err(DeliveryServiceError::ArtifactFailed(anyhow::anyhow!(
                        "reservation for {path} was lost before it became ready"
                    )));
                }
                Err(e) if attempt < MARK_READY_ATTEMPTS => {
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        draft_id = %draft_id,
                        attempt,
                        error = ?e,
                        "mark ready failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn render_and_upload(&self, draft: &AdmissionDraft, path: &str) -> anyhow::Result<()> {
        let bytes = self.renderer.render(draft).await?;
        self.store
            .put(path, bytes, self.renderer.content_type())
            .await
    }

    async fn wait_until_ready(
        &self,
        tenant_id: TenantId,
        draft_id: DraftId,
    ) -> Result<String, DeliveryServiceError> {
        let deadline = Instant::now() + self.wait_timeout;
        loop {
            let draft = self
                .drafts
                .find(tenant_id, draft_id)
                .await?
                .ok_or(DeliveryServiceError::DraftNotFound)?;

            if draft.is_ready() {
                if let Some(path) = draft.artifact_path {
                    return Ok(path);
                }
            }
            // The winner gave up. A later request may claim it again.
            if !draft.is_reserved() {
                return Err(DeliveryServiceError::ArtifactPending);
            }
            if Instant::now() >= deadline {
                tracing::debug!(tenant_id = %tenant_id, draft_id = %draft_id, "gave up waiting for reservation artifact");
                return Err(DeliveryServiceError::ArtifactPending);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
