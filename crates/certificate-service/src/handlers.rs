//! API handlers for classes, certificate templates and redemptions

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ceu_common::{
    parse_learner_email, CertificateTemplate, ClassRecord, CreationEvent, QrMode, Redemption,
    RedemptionStatus, DEFAULT_CERT_ID,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    CreateClassRequest, CreateClassResponse, DeleteClassResponse, ListRedemptionsQuery,
    OwnerQuery, RedeemRequest, RedeemResponse, ResendResponse, UpdateClassRequest,
    UpsertTemplateRequest,
};
use crate::storage::{RecordStore, StoreError};

/// Shared application state
pub struct AppState {
    pub records: Arc<dyn RecordStore>,
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => {
                ApiError::new(StatusCode::NOT_FOUND, format!("Not found: {path}"))
            }
            other => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl From<ceu_common::Error> for ApiError {
    fn from(err: ceu_common::Error) -> Self {
        match err {
            ceu_common::Error::InvalidEmail => {
                ApiError::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            ceu_common::Error::Validation(message) => {
                ApiError::new(StatusCode::BAD_REQUEST, message)
            }
            other => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

/// Health check
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "certificate-service"
    }))
}

/// Create a class
pub async fn create_class_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateClassRequest>,
) -> Result<Json<CreateClassResponse>, ApiError> {
    let class = ClassRecord::new(
        Uuid::new_v4().to_string(),
        &payload.title,
        &payload.description,
        payload.ceu_hours,
        &payload.owner_uid,
    )?;

    state.records.create_class(&class).await?;

    Ok(Json(CreateClassResponse {
        success: true,
        class_id: class.id,
    }))
}

/// List a creator's classes
pub async fn list_classes_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let classes = state.records.list_classes(&query.owner_uid).await?;

    Ok(Json(serde_json::json!({
        "ownerUid": query.owner_uid,
        "classes": classes,
        "total": classes.len()
    })))
}

/// Get one class
pub async fn get_class_handler(
    State(state): State<Arc<AppState>>,
    Path(class_id): Path<String>,
) -> Result<Json<ClassRecord>, ApiError> {
    state
        .records
        .get_class(&class_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Class not found."))
}

/// Edit a class's title, description or CEU hours
pub async fn update_class_handler(
    State(state): State<Arc<AppState>>,
    Path(class_id): Path<String>,
    Json(payload): Json<UpdateClassRequest>,
) -> Result<Json<ClassRecord>, ApiError> {
    let mut class = owned_class(&state, &class_id, &payload.owner_uid).await?;

    if let Some(title) = payload.title {
        class.title = title.trim().to_string();
    }
    if let Some(description) = payload.description {
        class.description = description.trim().to_string();
    }
    if let Some(ceu_hours) = payload.ceu_hours {
        class.ceu_hours = ceu_hours;
    }
    class.validate()?;

    state.records.update_class(&class).await?;

    Ok(Json(class))
}

/// Delete a class
pub async fn delete_class_handler(
    State(state): State<Arc<AppState>>,
    Path(class_id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<DeleteClassResponse>, ApiError> {
    let class = owned_class(&state, &class_id, &query.owner_uid).await?;

    state
        .records
        .delete_class(&class.id, &class.owner_uid)
        .await?;

    Ok(Json(DeleteClassResponse {
        success: true,
        class_id,
    }))
}

/// Create or overwrite a class's certificate template
pub async fn upsert_template_handler(
    State(state): State<Arc<AppState>>,
    Path((class_id, cert_id)): Path<(String, String)>,
    Json(payload): Json<UpsertTemplateRequest>,
) -> Result<Json<CertificateTemplate>, ApiError> {
    let class = owned_class(&state, &class_id, &payload.owner_uid).await?;

    let template = CertificateTemplate {
        title: payload.title.trim().to_string(),
        ceu_hours: payload.ceu_hours,
        issuer_org_name: payload.issuer_org_name.trim().to_string(),
        instructor_name: trimmed(payload.instructor_name),
        logo_url: trimmed(payload.logo_url),
        qr_mode: Some(payload.qr_mode),
        owner_uid: class.owner_uid,
        max_issues: payload.max_issues,
        issued_count: None,
        created_at: None,
        updated_at: Some(Utc::now()),
    };
    template.validate()?;

    state
        .records
        .upsert_template(&class_id, &cert_id, &template)
        .await?;

    let saved = state
        .records
        .get_template(&class_id, &cert_id)
        .await?
        .unwrap_or(template);
    Ok(Json(saved))
}

/// Get a certificate template
pub async fn get_template_handler(
    State(state): State<Arc<AppState>>,
    Path((class_id, cert_id)): Path<(String, String)>,
) -> Result<Json<CertificateTemplate>, ApiError> {
    state
        .records
        .get_template(&class_id, &cert_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Certificate not found."))
}

/// Public redemption: records the learner's request and fires the pipeline
pub async fn redeem_handler(
    State(state): State<Arc<AppState>>,
    Path(class_id): Path<String>,
    Json(payload): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, ApiError> {
    let email = parse_learner_email(&payload.email)?;
    let cert_id = trimmed(payload.cert_id).unwrap_or_else(|| DEFAULT_CERT_ID.to_string());

    let template = state
        .records
        .get_template(&class_id, &cert_id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Certificate not found."))?;

    if !state.records.reserve_issue(&class_id, &cert_id).await? {
        warn!(class_id = %class_id, cert_id = %cert_id, "Redemption rejected, issue cap reached");
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "This certificate has reached its issue limit.",
        ));
    }

    let status = match template.mode() {
        QrMode::Test => RedemptionStatus::Test,
        QrMode::Live => RedemptionStatus::Pending,
    };

    let mut redemption = Redemption::new(email, payload.name, payload.license_number, status);
    redemption.cert_id = cert_id;

    let redemption_id = Uuid::new_v4().to_string();
    if let Err(e) = state
        .records
        .create_redemption(&class_id, &redemption_id, &redemption)
        .await
    {
        if let Err(release) = state
            .records
            .release_issue(&class_id, &redemption.cert_id)
            .await
        {
            error!(
                class_id = %class_id,
                cert_id = %redemption.cert_id,
                "Failed to release reserved issue: {}", release
            );
        }
        return Err(e.into());
    }

    info!(class_id = %class_id, redemption_id = %redemption_id, "Redemption submitted");

    let message = match status {
        RedemptionStatus::Test => "Test submission received. No email will be sent.",
        _ => "Thanks! Your certificate will be emailed to you shortly.",
    };

    Ok(Json(RedeemResponse {
        success: true,
        redemption_id,
        status,
        message: message.to_string(),
    }))
}

/// Certificates listing for a class
pub async fn list_redemptions_handler(
    State(state): State<Arc<AppState>>,
    Path(class_id): Path<String>,
    Query(query): Query<ListRedemptionsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(RedemptionStatus::parse(raw).ok_or_else(|| {
            ApiError::new(StatusCode::BAD_REQUEST, format!("Unknown status: {raw}"))
        })?),
        None => None,
    };

    let redemptions = state
        .records
        .list_redemptions(&class_id, status, query.effective_limit())
        .await?;

    Ok(Json(serde_json::json!({
        "classId": class_id,
        "redemptions": redemptions,
        "total": redemptions.len()
    })))
}

/// Get one redemption
pub async fn get_redemption_handler(
    State(state): State<Arc<AppState>>,
    Path((class_id, redemption_id)): Path<(String, String)>,
) -> Result<Json<Redemption>, ApiError> {
    state
        .records
        .get_redemption(&class_id, &redemption_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Redemption not found."))
}

/// Queue another delivery attempt for a redemption whose email failed
pub async fn resend_handler(
    State(state): State<Arc<AppState>>,
    Path((class_id, redemption_id)): Path<(String, String)>,
) -> Result<Json<ResendResponse>, ApiError> {
    let redemption = state
        .records
        .get_redemption(&class_id, &redemption_id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Redemption not found."))?;

    if redemption.status.is_terminal() {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "Redemption already processed.",
        ));
    }
    if !redemption.is_retryable() {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "No failed delivery to retry.",
        ));
    }

    state
        .records
        .enqueue_event(&CreationEvent::new(&class_id, &redemption_id))
        .await?;

    info!(class_id = %class_id, redemption_id = %redemption_id, "Certificate resend queued");

    Ok(Json(ResendResponse {
        success: true,
        redemption_id,
    }))
}

/// Load a class the acting creator owns
async fn owned_class(
    state: &AppState,
    class_id: &str,
    owner_uid: &str,
) -> Result<ClassRecord, ApiError> {
    let class = state
        .records
        .get_class(class_id)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Class not found."))?;

    if class.owner_uid != owner_uid.trim() {
        warn!(class_id, owner_uid, "Change rejected, creator does not own the class");
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "Only the class owner can change this class.",
        ));
    }
    Ok(class)
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
