use http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LeadflowError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("invalid status transition: {0}")]
    InvalidStatus(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("webhook signature missing or invalid")]
    InvalidSignature,

    #[error("JSON error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, LeadflowError>;

impl From<std::io::Error> for LeadflowError {
    fn from(e: std::io::Error) -> Self {
        LeadflowError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for LeadflowError {
    fn from(e: serde_json::Error) -> Self {
        LeadflowError::Json(e.to_string())
    }
}

impl LeadflowError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        LeadflowError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        LeadflowError::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            LeadflowError::NotFound { .. } => StatusCode::NOT_FOUND,
            LeadflowError::AlreadyExists { .. } => StatusCode::CONFLICT,
            LeadflowError::InvalidStatus(_) => StatusCode::CONFLICT,
            LeadflowError::Validation(_) => StatusCode::BAD_REQUEST,
            LeadflowError::MissingField(_) => StatusCode::BAD_REQUEST,
            LeadflowError::InvalidSignature => StatusCode::UNAUTHORIZED,
            LeadflowError::Json(_) => StatusCode::BAD_REQUEST,
            LeadflowError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
