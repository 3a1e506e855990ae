//! Redemption pipeline
//!
//! Turns a newly created redemption into a stored certificate, an email (in
//! live mode with delivery configured) and a terminal record update:
//!
//! 1. normalize the triggering record
//! 2. stop if it is already `processed` (the only idempotency barrier)
//! 3. load the certificate template, best effort
//! 4. render the certificate
//! 5. store it and sign a retrieval URL
//! 6. deliver or skip, then record the outcome
//!
//! Template loading and email delivery failures are recovered. Render, store
//! and record-write failures abort the run and leave the record non-terminal.

use crate::artifact_store::{ArtifactError, ArtifactStore};
use crate::notifier::{subject_for, CertificateEmail, Notifier};
use crate::renderer::{render_certificate, CertificateInput, RenderError};
use crate::storage::{RecordStore, StoreError};
use ceu_common::{CertificateTemplate, CreationEvent, Outcome, Redemption, RedemptionStatus};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Fatal pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Certificate rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Certificate storage failed: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Redemption update failed: {0}")]
    Record(#[from] StoreError),
}

/// How the learner was (or was not) notified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    SkippedTestMode,
    SkippedUnconfigured,
}

/// What a pipeline run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Record was already terminal; nothing was done
    AlreadyProcessed,

    /// Record marked `processed`
    Processed(Delivery),

    /// Certificate stored but the email failed; status left as it was
    EmailFailed { error: String },
}

/// The redemption processing orchestrator
pub struct Pipeline {
    records: Arc<dyn RecordStore>,
    artifacts: Arc<dyn ArtifactStore>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Pipeline {
    /// `notifier` is `None` when no delivery credential is configured
    pub fn new(
        records: Arc<dyn RecordStore>,
        artifacts: Arc<dyn ArtifactStore>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            records,
            artifacts,
            notifier,
        }
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    /// Process one created redemption
    pub async fn handle(
        &self,
        event: &CreationEvent,
        redemption: &Redemption,
    ) -> Result<Disposition, PipelineError> {
        let class_id = event.class_id.as_str();
        let redemption_id = event.redemption_id.as_str();
        let learner_email = redemption.learner_email.as_str();
        let learner_name = redemption.display_name();
        let license_number = redemption.license();
        let cert_id = redemption.effective_cert_id();
        let status = redemption.status;

        info!(
            class_id,
            redemption_id,
            email = if learner_email.is_empty() { "(missing)" } else { learner_email },
            status = status.as_str(),
            attempt = event.attempt,
            "Redemption received"
        );

        if status.is_terminal() {
            info!(class_id, redemption_id, "Redemption already processed, skipping");
            return Ok(Disposition::AlreadyProcessed);
        }

        let template = self.load_template(class_id, cert_id).await;

        let pdf = render_certificate(&CertificateInput {
            learner_name,
            learner_email,
            class_id,
            redemption_id,
            template: template.as_ref(),
            license_number,
        })?;

        let artifact = self
            .artifacts
            .put_certificate(class_id, redemption_id, pdf)
            .await?;
        info!(class_id, redemption_id, path = %artifact.path, "Certificate uploaded");

        let Some(notifier) = &self.notifier else {
            warn!(class_id, redemption_id, "Email delivery not configured, skipping send");
            self.records
                .apply_outcome(
                    class_id,
                    redemption_id,
                    redemption,
                    &Outcome::Processed { artifact },
                )
                .await?;
            return Ok(Disposition::Processed(Delivery::SkippedUnconfigured));
        };

        if status == RedemptionStatus::Test {
            info!(class_id, redemption_id, "Test mode, skipping send");
            self.records
                .apply_outcome(
                    class_id,
                    redemption_id,
                    redemption,
                    &Outcome::Processed { artifact },
                )
                .await?;
            return Ok(Disposition::Processed(Delivery::SkippedTestMode));
        }

        let email = CertificateEmail {
            to_email: learner_email.to_string(),
            to_name: learner_name.to_string(),
            signed_url: artifact.url.clone(),
            subject: subject_for(template.as_ref().map(|t| t.title.as_str())),
        };

        match notifier.send(&email).await {
            Ok(()) => {
                info!(class_id, redemption_id, email = learner_email, "Certificate email sent");
                self.records
                    .apply_outcome(
                        class_id,
                        redemption_id,
                        redemption,
                        &Outcome::Processed { artifact },
                    )
                    .await?;
                Ok(Disposition::Processed(Delivery::Sent))
            }
            Err(e) => {
                let message = e.to_string();
                error!(
                    class_id,
                    redemption_id,
                    email = learner_email,
                    error = %message,
                    "Certificate email failed"
                );
                let outcome = Outcome::EmailFailed {
                    artifact,
                    error: message.clone(),
                };
                self.records
                    .apply_outcome(class_id, redemption_id, redemption, &outcome)
                    .await?;
                Ok(Disposition::EmailFailed { error: message })
            }
        }
    }

    /// A missing or unreadable template degrades to renderer fallbacks
    async fn load_template(&self, class_id: &str, cert_id: &str) -> Option<CertificateTemplate> {
        match self.records.get_template(class_id, cert_id).await {
            Ok(Some(template)) => Some(template),
            Ok(None) => {
                info!(class_id, cert_id, "No certificate template, using defaults");
                None
            }
            Err(e) => {
                warn!(class_id, cert_id, error = %e, "Could not fetch certificate template");
                None
            }
        }
    }
}
