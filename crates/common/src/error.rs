use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Enter a valid email address.")]
    InvalidEmail,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Document is not a JSON object")]
    NotADocument,

    #[error("Invalid document field {field}: {source}")]
    InvalidField {
        field: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
