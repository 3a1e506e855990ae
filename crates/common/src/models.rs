//! Document model for classes, certificate templates and redemptions
//!
//! Field names are camelCase both on the wire and in storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Certificate template key used when a redemption does not name one
pub const DEFAULT_CERT_ID: &str = "default";

fn default_cert_id() -> String {
    DEFAULT_CERT_ID.to_string()
}

/// Whether redemptions trigger real email delivery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrMode {
    /// Certificates are emailed to the learner
    #[default]
    Live,
    /// Dry run: certificates are generated but never emailed
    Test,
}

impl QrMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QrMode::Live => "live",
            QrMode::Test => "test",
        }
    }
}

/// Processing status of a redemption
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    /// Awaiting processing, live mode
    #[default]
    Pending,
    /// Awaiting processing, test mode (no email)
    Test,
    /// Terminal: certificate generated and recorded
    Processed,
}

impl RedemptionStatus {
    /// Strict parse, used for query filters
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RedemptionStatus::Pending),
            "test" => Some(RedemptionStatus::Test),
            "processed" => Some(RedemptionStatus::Processed),
            _ => None,
        }
    }

    /// Missing or unrecognised values are treated as `Pending`
    pub fn from_lenient(value: Option<&str>) -> Self {
        value.and_then(Self::parse).unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Pending => "pending",
            RedemptionStatus::Test => "test",
            RedemptionStatus::Processed => "processed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RedemptionStatus::Processed)
    }
}

impl<'de> Deserialize<'de> for RedemptionStatus {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(Self::from_lenient(raw.as_ref().and_then(|v| v.as_str())))
    }
}

/// A course offering owned by one creator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    /// Class identifier
    pub id: String,

    /// Display title
    pub title: String,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// CEU hours awarded for attending
    #[serde(default)]
    pub ceu_hours: Option<f64>,

    /// Owning creator
    pub owner_uid: String,

    /// When the class was created
    pub created_at: DateTime<Utc>,
}

impl ClassRecord {
    /// Create a validated class record
    pub fn new(
        id: String,
        title: &str,
        description: &str,
        ceu_hours: Option<f64>,
        owner_uid: &str,
    ) -> Result<Self> {
        let class = Self {
            id,
            title: title.trim().to_string(),
            description: description.trim().to_string(),
            ceu_hours,
            owner_uid: owner_uid.trim().to_string(),
            created_at: Utc::now(),
        };
        class.validate()?;
        Ok(class)
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.is_empty() {
            return Err(Error::Validation("Title is required.".to_string()));
        }
        if self.owner_uid.is_empty() {
            return Err(Error::Validation("Owner is required.".to_string()));
        }
        if let Some(hours) = self.ceu_hours {
            validate_hours(hours)?;
        }
        Ok(())
    }
}

/// Per-class configuration describing issued certificates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateTemplate {
    /// Certificate title
    pub title: String,

    /// CEU hours printed on the certificate
    #[serde(default)]
    pub ceu_hours: f64,

    /// Issuing organization
    #[serde(default)]
    pub issuer_org_name: String,

    /// Instructor line, omitted when blank
    #[serde(default)]
    pub instructor_name: Option<String>,

    /// Logo shown on the redemption page
    #[serde(default)]
    pub logo_url: Option<String>,

    /// Live or test redemption mode
    #[serde(default)]
    pub qr_mode: Option<QrMode>,

    /// Owning creator
    #[serde(default)]
    pub owner_uid: String,

    /// Issue cap; null means unlimited
    #[serde(default)]
    pub max_issues: Option<u32>,

    /// Redemptions accepted so far. Maintained by the store only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_count: Option<u64>,

    /// First upsert time. Maintained by the store only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Last upsert time
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CertificateTemplate {
    pub fn mode(&self) -> QrMode {
        self.qr_mode.unwrap_or_default()
    }

    /// Instructor name with surrounding whitespace removed, if any remains
    pub fn instructor(&self) -> Option<&str> {
        self.instructor_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("Title is required.".to_string()));
        }
        validate_hours(self.ceu_hours)?;
        if self.max_issues == Some(0) {
            return Err(Error::Validation(
                "Max issues must be a positive number.".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_hours(hours: f64) -> Result<()> {
    if !hours.is_finite() || hours < 0.0 {
        return Err(Error::Validation(
            "CEU Hours must be a non-negative number.".to_string(),
        ));
    }
    Ok(())
}

/// One learner's request to receive a certificate for a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    /// Certificate template key
    #[serde(default = "default_cert_id")]
    pub cert_id: String,

    /// Learner email, lower-cased
    #[serde(default)]
    pub learner_email: String,

    /// Learner display name
    #[serde(default)]
    pub learner_name: Option<String>,

    /// Professional license number printed on the certificate
    #[serde(default)]
    pub license_number: Option<String>,

    /// Processing status
    #[serde(default)]
    pub status: RedemptionStatus,

    /// When the learner submitted the redemption
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// Artifact store path of the generated certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_path: Option<String>,

    /// Signed retrieval URL of the generated certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,

    /// When the redemption reached `processed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    /// Last email delivery failure, verbatim from the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_error: Option<String>,

    /// When the last email delivery failure happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_error_at: Option<DateTime<Utc>>,
}

impl Redemption {
    /// Create a new, unprocessed redemption
    pub fn new(
        learner_email: String,
        learner_name: Option<String>,
        license_number: Option<String>,
        status: RedemptionStatus,
    ) -> Self {
        Self {
            cert_id: default_cert_id(),
            learner_email,
            learner_name: non_blank(learner_name),
            license_number: non_blank(license_number),
            status,
            created_at: Some(Utc::now()),
            certificate_path: None,
            certificate_url: None,
            processed_at: None,
            email_error: None,
            email_error_at: None,
        }
    }

    /// Template key, falling back to `default` when blank
    pub fn effective_cert_id(&self) -> &str {
        if self.cert_id.trim().is_empty() {
            DEFAULT_CERT_ID
        } else {
            &self.cert_id
        }
    }

    /// Learner name if present, otherwise the email
    pub fn display_name(&self) -> &str {
        self.learner_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.learner_email)
    }

    pub fn license(&self) -> Option<&str> {
        self.license_number
            .as_deref()
            .map(str::trim)
            .filter(|license| !license.is_empty())
    }

    /// Whether a delivery attempt failed and may be retried
    pub fn is_retryable(&self) -> bool {
        !self.status.is_terminal() && self.email_error.is_some()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Trigger payload emitted when a redemption record is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationEvent {
    /// Owning class
    pub class_id: String,

    /// Created redemption
    pub redemption_id: String,

    /// Delivery attempt, starting at zero
    #[serde(default)]
    pub attempt: u32,
}

impl CreationEvent {
    pub fn new(class_id: impl Into<String>, redemption_id: impl Into<String>) -> Self {
        Self {
            class_id: class_id.into(),
            redemption_id: redemption_id.into(),
            attempt: 0,
        }
    }

    /// The same event, scheduled for another delivery
    pub fn redelivery(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

/// Non-owning reference to a stored certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Deterministic store path
    pub path: String,

    /// Time-limited retrieval URL
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_lenient_parsing() {
        let parse = |value: serde_json::Value| -> RedemptionStatus {
            serde_json::from_value(value).unwrap()
        };

        assert_eq!(parse(json!("test")), RedemptionStatus::Test);
        assert_eq!(parse(json!("processed")), RedemptionStatus::Processed);
        assert_eq!(parse(json!("archived")), RedemptionStatus::Pending);
        assert_eq!(parse(json!(null)), RedemptionStatus::Pending);
        assert_eq!(parse(json!(7)), RedemptionStatus::Pending);
    }

    #[test]
    fn test_redemption_defaults_from_sparse_document() {
        let redemption: Redemption =
            serde_json::from_value(json!({ "learnerEmail": "a@b.com" })).unwrap();

        assert_eq!(redemption.cert_id, "default");
        assert_eq!(redemption.status, RedemptionStatus::Pending);
        assert_eq!(redemption.display_name(), "a@b.com");
        assert!(redemption.license().is_none());
    }

    #[test]
    fn test_blank_cert_id_falls_back() {
        let redemption: Redemption =
            serde_json::from_value(json!({ "learnerEmail": "a@b.com", "certId": "" })).unwrap();
        assert_eq!(redemption.effective_cert_id(), "default");
    }

    #[test]
    fn test_display_name_prefers_learner_name() {
        let redemption = Redemption::new(
            "a@b.com".to_string(),
            Some("  Ada Lovelace ".to_string()),
            Some("   ".to_string()),
            RedemptionStatus::Pending,
        );

        assert_eq!(redemption.display_name(), "Ada Lovelace");
        assert!(redemption.license_number.is_none());
    }

    #[test]
    fn test_template_validation() {
        let mut template: CertificateTemplate = serde_json::from_value(json!({
            "title": "HVAC 101",
            "ceuHours": 3,
            "issuerOrgName": "Acme"
        }))
        .unwrap();
        assert!(template.validate().is_ok());
        assert_eq!(template.mode(), QrMode::Live);

        template.ceu_hours = -1.0;
        assert!(template.validate().is_err());

        template.ceu_hours = 1.5;
        template.max_issues = Some(0);
        assert!(template.validate().is_err());

        template.max_issues = None;
        template.title = "  ".to_string();
        assert!(template.validate().is_err());
    }

    #[test]
    fn test_template_store_fields_not_serialized_when_absent() {
        let template: CertificateTemplate =
            serde_json::from_value(json!({ "title": "HVAC 101" })).unwrap();
        let value = serde_json::to_value(&template).unwrap();

        assert!(value.get("issuedCount").is_none());
        assert!(value.get("createdAt").is_none());
        assert_eq!(value["maxIssues"], serde_json::Value::Null);
    }

    #[test]
    fn test_class_requires_title() {
        let result = ClassRecord::new("c1".to_string(), "   ", "", None, "owner");
        assert!(result.is_err());

        let class = ClassRecord::new("c1".to_string(), " Refrigerants ", "", Some(2.0), "owner")
            .unwrap();
        assert_eq!(class.title, "Refrigerants");
    }

    #[test]
    fn test_redelivery_increments_attempt() {
        let event = CreationEvent::new("C1", "R1");
        let again = event.redelivery().redelivery();
        assert_eq!(again.attempt, 2);
        assert_eq!(again.redemption_id, "R1");
    }
}
