pub mod document;
pub mod email;
pub mod error;
pub mod models;
pub mod outcome;

pub use email::{is_valid_email, normalize_email, parse_learner_email};
pub use error::{Error, Result};
pub use models::{
    ArtifactRef, CertificateTemplate, ClassRecord, CreationEvent, QrMode, Redemption,
    RedemptionStatus, DEFAULT_CERT_ID,
};
pub use outcome::{Outcome, RedemptionPatch};
