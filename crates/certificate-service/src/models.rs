//! Request and response bodies for the certificate API

use ceu_common::{QrMode, RedemptionStatus};
use serde::{Deserialize, Deserializer, Serialize};

/// Listing size when none is requested
pub const DEFAULT_LIST_LIMIT: usize = 50;
/// Largest listing a single request may ask for
pub const MAX_LIST_LIMIT: usize = 200;

/// Request to create a class
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClassRequest {
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub ceu_hours: Option<f64>,

    /// Creator who will own the class
    pub owner_uid: String,
}

/// Response from creating a class
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClassResponse {
    pub success: bool,
    pub class_id: String,
}

/// Query naming the acting creator (class listing and deletion)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerQuery {
    pub owner_uid: String,
}

/// Edit of a class; absent fields keep their stored value
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClassRequest {
    /// Creator making the edit; must own the class
    pub owner_uid: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// `null` clears the hours
    #[serde(default, deserialize_with = "present")]
    pub ceu_hours: Option<Option<f64>>,
}

/// Distinguishes an explicit `null` from an absent field
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Response from deleting a class
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteClassResponse {
    pub success: bool,
    pub class_id: String,
}

/// Request to create or overwrite a certificate template
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTemplateRequest {
    pub title: String,

    pub ceu_hours: f64,

    #[serde(default)]
    pub issuer_org_name: String,

    #[serde(default)]
    pub instructor_name: Option<String>,

    #[serde(default)]
    pub logo_url: Option<String>,

    #[serde(default)]
    pub qr_mode: QrMode,

    pub owner_uid: String,

    /// Issue cap; omit or null for unlimited
    #[serde(default)]
    pub max_issues: Option<u32>,
}

/// Public redemption form submission
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub email: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub license_number: Option<String>,

    /// Template to redeem; defaults to `default`
    #[serde(default)]
    pub cert_id: Option<String>,
}

/// Response from a redemption submission
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemResponse {
    pub success: bool,
    pub redemption_id: String,
    pub status: RedemptionStatus,
    pub message: String,
}

/// Query for the certificates listing
#[derive(Debug, Default, Deserialize)]
pub struct ListRedemptionsQuery {
    /// `pending`, `test` or `processed`
    pub status: Option<String>,
    pub limit: Option<usize>,
}

impl ListRedemptionsQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

/// Response from a resend request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendResponse {
    pub success: bool,
    pub redemption_id: String,
}
