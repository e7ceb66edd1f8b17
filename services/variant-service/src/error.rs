// =============================================================================
// ERROR MODULE
// =============================================================================
// Error taxonomy for variant generation and the inventory ledger, plus the
// mapping of each error onto an HTTP response.
//
// - Validation errors are raised before anything is written
// - Ledger errors always reach the caller
// - Storage details never leak into response bodies
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::ids::VariantId;
use crate::models::ErrorResponse;

// =============================================================================
// CUSTOM ERROR TYPE
// =============================================================================
#[derive(Debug, Error)]
pub enum AppError {
    // -------------------------------------------------------------------------
    // GENERATION ERRORS
    // -------------------------------------------------------------------------
    /// A selected type or value is unknown, inactive, misowned or not a
    /// variant dimension.
    #[error("Invalid attribute selection: {0}")]
    InvalidAttributeSelection(String),

    /// The request did not name a single variant-participating type.
    #[error("No variant attributes selected")]
    NoVariantAttributesSelected,

    /// Compatibility rules leave no valid combination.
    #[error("Unsatisfiable constraint: {0}")]
    UnsatisfiableConstraint(String),

    /// Every disambiguated SKU candidate was already taken.
    #[error("SKU allocation exhausted for {sku} after {attempts} attempts")]
    SkuAllocationExhausted { sku: String, attempts: u32 },

    // -------------------------------------------------------------------------
    // LEDGER ERRORS
    // -------------------------------------------------------------------------
    /// Available stock does not cover the requested quantity
    #[error("Insufficient stock for variant {variant_id}: available {available}, requested {requested}")]
    InsufficientStock {
        variant_id: VariantId,
        available: i64,
        requested: i64,
    },

    /// Reserved stock does not cover a commit or release
    #[error("Insufficient reserved stock for variant {variant_id}: reserved {reserved}, requested {requested}")]
    InsufficientReservedStock {
        variant_id: VariantId,
        reserved: i64,
        requested: i64,
    },

    /// The variant is discontinued and closed for sales
    #[error("Variant {0} is discontinued")]
    Discontinued(VariantId),

    // -------------------------------------------------------------------------
    // INPUT ERRORS
    // -------------------------------------------------------------------------
    /// An identifier failed to parse at a boundary
    #[error("Invalid {kind} identifier: {value:?}")]
    InvalidIdentifier { kind: &'static str, value: String },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // -------------------------------------------------------------------------
    // STORAGE ERRORS
    // -------------------------------------------------------------------------
    /// A write batch could not be applied; nothing from it is visible
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// Database query failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis operation failed
    #[error("Cache error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and stable machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::InvalidAttributeSelection(_) => {
                (StatusCode::BAD_REQUEST, "INVALID_ATTRIBUTE_SELECTION")
            }
            AppError::NoVariantAttributesSelected => {
                (StatusCode::BAD_REQUEST, "NO_VARIANT_ATTRIBUTES_SELECTED")
            }
            AppError::InvalidIdentifier { .. } => (StatusCode::BAD_REQUEST, "INVALID_IDENTIFIER"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::UnsatisfiableConstraint(_) => {
                (StatusCode::CONFLICT, "UNSATISFIABLE_CONSTRAINT")
            }
            AppError::SkuAllocationExhausted { .. } => {
                (StatusCode::CONFLICT, "SKU_ALLOCATION_EXHAUSTED")
            }
            AppError::InsufficientStock { .. } => (StatusCode::CONFLICT, "INSUFFICIENT_STOCK"),
            AppError::InsufficientReservedStock { .. } => {
                (StatusCode::CONFLICT, "INSUFFICIENT_RESERVED_STOCK")
            }
            AppError::Discontinued(_) => (StatusCode::CONFLICT, "DISCONTINUED"),
            AppError::PersistenceFailure(_) | AppError::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_FAILURE")
            }
            AppError::Redis(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CACHE_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

// =============================================================================
// HTTP RESPONSE CONVERSION
// =============================================================================
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        // Storage errors get a generic message; the detail goes to the log only.
        let message = match &self {
            AppError::Database(_) | AppError::PersistenceFailure(_) => {
                "A persistence error occurred".to_string()
            }
            AppError::Redis(_) => "A cache error occurred".to_string(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(error_code = error_code, error = %self, "Request failed");
        } else {
            tracing::warn!(error_code = error_code, error = %self, "Request rejected");
        }

        let body = ErrorResponse::new(error_code, message);

        (status, Json(body)).into_response()
    }
}

// =============================================================================
// RESULT TYPE ALIAS
// =============================================================================
pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
