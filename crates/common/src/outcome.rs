//! Terminal outcomes of a pipeline run and the merge-patches they produce

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ArtifactRef, Redemption, RedemptionStatus};

/// Result of processing a redemption that must be written back to its record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Certificate generated; delivered, or skipped by mode or configuration
    Processed { artifact: ArtifactRef },

    /// Certificate generated but the email could not be delivered.
    /// The record's status is left untouched so the attempt can be retried.
    EmailFailed { artifact: ArtifactRef, error: String },
}

impl Outcome {
    pub fn artifact(&self) -> &ArtifactRef {
        match self {
            Outcome::Processed { artifact } | Outcome::EmailFailed { artifact, .. } => artifact,
        }
    }

    /// Build the merge-patch for this outcome
    pub fn to_patch(&self, now: DateTime<Utc>) -> RedemptionPatch {
        let artifact = self.artifact();
        let mut patch = RedemptionPatch {
            certificate_path: Some(artifact.path.clone()),
            certificate_url: Some(artifact.url.clone()),
            ..RedemptionPatch::default()
        };

        match self {
            Outcome::Processed { .. } => {
                patch.status = Some(RedemptionStatus::Processed);
                patch.processed_at = Some(now);
            }
            Outcome::EmailFailed { error, .. } => {
                patch.email_error = Some(Some(error.clone()));
                patch.email_error_at = Some(Some(now));
            }
        }

        patch
    }

    /// Patch for a record in the state `previous`. A retried delivery that
    /// succeeds also clears the earlier failure.
    pub fn settle(&self, previous: &Redemption, now: DateTime<Utc>) -> RedemptionPatch {
        let patch = self.to_patch(now);
        match self {
            Outcome::Processed { .. } if previous.email_error.is_some() => {
                patch.clearing_email_error()
            }
            _ => patch,
        }
    }
}

/// Partial redemption update; absent fields are left as they are
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RedemptionStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,

    /// `Some(None)` writes null, removing a stored error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_error: Option<Option<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_error_at: Option<Option<DateTime<Utc>>>,
}

impl RedemptionPatch {
    pub fn clearing_email_error(self) -> Self {
        Self {
            email_error: Some(None),
            email_error_at: Some(None),
            ..self
        }
    }
}
