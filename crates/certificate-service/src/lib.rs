//! Certificate Service
//!
//! Issues continuing-education certificates. Creators define classes and
//! certificate templates; learners redeem a class QR code, which records a
//! redemption and fires the redemption pipeline: render the certificate PDF,
//! store it, email a signed link to the learner and record the outcome back
//! on the redemption.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /api/classes` - Create a class
//! - `GET /api/classes?ownerUid=` - List a creator's classes
//! - `GET /api/classes/{class_id}` - Get a class
//! - `PATCH /api/classes/{class_id}` - Edit a class (owner only)
//! - `DELETE /api/classes/{class_id}?ownerUid=` - Delete a class (owner only)
//! - `PUT /api/classes/{class_id}/certificates/{cert_id}` - Upsert a template (owner only)
//! - `GET /api/classes/{class_id}/certificates/{cert_id}` - Get a template
//! - `POST /api/classes/{class_id}/redemptions` - Redeem a certificate
//! - `GET /api/classes/{class_id}/redemptions` - Certificates listing
//! - `GET /api/classes/{class_id}/redemptions/{redemption_id}` - Get a redemption
//! - `POST /api/classes/{class_id}/redemptions/{redemption_id}/resend` - Retry a failed delivery

pub mod artifact_store;
pub mod config;
pub mod handlers;
pub mod models;
pub mod notifier;
pub mod pipeline;
pub mod renderer;
pub mod storage;
pub mod worker;

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use artifact_store::{ArtifactStore, MemoryArtifactStore, S3ArtifactStore};
pub use config::Config;
pub use handlers::AppState;
pub use notifier::{Notifier, PostmarkNotifier};
pub use pipeline::{Delivery, Disposition, Pipeline, PipelineError};
pub use storage::{MemoryStore, RecordStore, RedisStore};
pub use worker::{Worker, WorkerConfig};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/api/classes",
            post(handlers::create_class_handler).get(handlers::list_classes_handler),
        )
        .route(
            "/api/classes/{class_id}",
            get(handlers::get_class_handler)
                .patch(handlers::update_class_handler)
                .delete(handlers::delete_class_handler),
        )
        .route(
            "/api/classes/{class_id}/certificates/{cert_id}",
            put(handlers::upsert_template_handler).get(handlers::get_template_handler),
        )
        .route(
            "/api/classes/{class_id}/redemptions",
            post(handlers::redeem_handler).get(handlers::list_redemptions_handler),
        )
        .route(
            "/api/classes/{class_id}/redemptions/{redemption_id}",
            get(handlers::get_redemption_handler),
        )
        .route(
            "/api/classes/{class_id}/redemptions/{redemption_id}/resend",
            post(handlers::resend_handler),
        )
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
