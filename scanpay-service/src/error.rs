//! Domain error taxonomy for the payment lifecycle engine.

use axum::http::StatusCode;
use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Deliberately carries no detail: wrong, expired, exhausted and missing
    /// codes all look the same to the caller.
    #[error("Verification failed")]
    VerificationFailed,

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Refund amount {requested} exceeds original amount {original}")]
    AmountExceedsOriginal {
        requested: Decimal,
        original: Decimal,
    },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Payment gateway declined: {0}")]
    GatewayDeclined(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn not_found(entity: &str) -> Self {
        PaymentError::NotFound(entity.to_string())
    }

    /// Stable machine code for clients to branch on.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::NotFound(_) => "NOT_FOUND",
            PaymentError::InvalidState(_) => "INVALID_STATE",
            PaymentError::VerificationFailed => "VERIFICATION_FAILED",
            PaymentError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            PaymentError::AmountExceedsOriginal { .. } => "AMOUNT_EXCEEDS_ORIGINAL",
            PaymentError::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            PaymentError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            PaymentError::GatewayDeclined(_) => "GATEWAY_DECLINED",
            PaymentError::Validation(_) => "VALIDATION_ERROR",
            PaymentError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        let code = err.code();
        let message = err.to_string();
        let status = match err {
            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::InvalidState(_) => StatusCode::CONFLICT,
            PaymentError::VerificationFailed => StatusCode::UNAUTHORIZED,
            PaymentError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PaymentError::AmountExceedsOriginal { .. } => StatusCode::BAD_REQUEST,
            PaymentError::RateLimitExceeded => {
                return AppError::TooManyRequests("Rate limit exceeded".to_string(), Some(60));
            }
            PaymentError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            PaymentError::GatewayDeclined(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PaymentError::Validation(_) => StatusCode::BAD_REQUEST,
            PaymentError::Internal(e) => return AppError::InternalError(e),
        };

        AppError::Rejected {
            status,
            code,
            message,
        }
    }
}
