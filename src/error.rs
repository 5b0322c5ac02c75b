use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Stock exceeded: {0}")]
    StockExceeded(String),

    #[error("Invalid fulfillment method: {0}")]
    InvalidFulfillment(String),

    #[error("Insufficient points: requested {requested}, available {available}")]
    InsufficientPoints { requested: i64, available: i64 },

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl AppError {
    /// Machine readable error code returned to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) | AppError::JwtError(_) => "AUTH_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden | AppError::PermissionDenied => "FORBIDDEN",
            AppError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            AppError::StockExceeded(_) => "STOCK_EXCEEDED",
            AppError::InvalidFulfillment(_) => "INVALID_FULFILLMENT",
            AppError::InsufficientPoints { .. } => "INSUFFICIENT_POINTS",
            AppError::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Unprocessable(_) => "UNPROCESSABLE",
            AppError::PaymentFailed(_) => "PAYMENT_FAILED",
            AppError::ExternalApiError(_) | AppError::ReqwestError(_) => "EXTERNAL_API_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Domain rule violations; these abort the surrounding transaction and are
    /// reported to the caller as-is.
    pub fn is_domain_violation(&self) -> bool {
        matches!(
            self,
            AppError::ValidationError(_)
                | AppError::CapacityExceeded(_)
                | AppError::StockExceeded(_)
                | AppError::InvalidFulfillment(_)
                | AppError::InsufficientPoints { .. }
                | AppError::InsufficientBalance(_)
                | AppError::Conflict(_)
                | AppError::Unprocessable(_)
        )
    }

    /// Unique index violation reported by the database driver.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            AppError::DatabaseError(err)
                if matches!(err.sql_err(), Some(sea_orm::SqlErr::UniqueConstraintViolation(_)))
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) | AppError::JwtError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden | AppError::PermissionDenied => StatusCode::FORBIDDEN,
            AppError::CapacityExceeded(_) | AppError::StockExceeded(_) | AppError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            AppError::InvalidFulfillment(_)
            | AppError::InsufficientPoints { .. }
            | AppError::InsufficientBalance(_)
            | AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::ExternalApiError(_) | AppError::ReqwestError(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let message = match self {
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                "Database error".to_string()
            }
            AppError::PaymentFailed(msg) => {
                log::warn!("Payment failed: {msg}");
                msg.clone()
            }
            AppError::ExternalApiError(msg) => {
                log::error!("External API error: {msg}");
                msg.clone()
            }
            AppError::AuthError(msg) => {
                log::warn!("Authentication error: {msg}");
                msg.clone()
            }
            AppError::JwtError(_) => "Invalid access token".to_string(),
            AppError::Forbidden | AppError::PermissionDenied => {
                log::warn!("Forbidden access");
                self.to_string()
            }
            err if err.is_domain_violation() => {
                log::warn!("{err}");
                match err {
                    AppError::ValidationError(msg)
                    | AppError::CapacityExceeded(msg)
                    | AppError::StockExceeded(msg)
                    | AppError::InvalidFulfillment(msg)
                    | AppError::InsufficientBalance(msg)
                    | AppError::Conflict(msg)
                    | AppError::Unprocessable(msg) => msg.clone(),
                    other => other.to_string(),
                }
            }
            AppError::NotFound(msg) => msg.clone(),
            _ => {
                log::error!("Internal error: {self}");
                "Internal server error".to_string()
            }
        };

        HttpResponse::build(status_code).json(json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": message
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_map_to_client_statuses() {
        assert_eq!(
            AppError::StockExceeded("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Unprocessable("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::PaymentFailed("declined".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert!(AppError::CapacityExceeded("x".into()).is_domain_violation());
        assert!(!AppError::InternalError("x".into()).is_domain_violation());
    }
}
