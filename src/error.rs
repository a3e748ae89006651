use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::common::ErrorBody;

/// Failure reported by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("store backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("authentication required: {0}")]
    Authentication(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("missing required fields: {}", .0.join(", "))]
    MissingRequiredFields(Vec<String>),

    #[error("notification carries no payment identifier")]
    MissingPaymentId,

    #[error("subscription plan {0} not found")]
    PlanNotFound(String),

    #[error("tenant {0} not found")]
    TenantNotFound(String),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("payment gateway returned an unusable response: {0}")]
    GatewayResponseInvalid(String),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl BillingError {
    /// Short client-facing message. Internal detail goes to `details()` or the log.
    fn message(&self) -> String {
        match self {
            BillingError::Authentication(_) => "Authentication required".to_string(),
            BillingError::Forbidden(_) => "Not allowed".to_string(),
            BillingError::Validation(_) => "Invalid request".to_string(),
            BillingError::MissingRequiredFields(_) => "Missing required fields".to_string(),
            BillingError::MissingPaymentId => "Missing payment identifier".to_string(),
            BillingError::PlanNotFound(_) => "Subscription plan not found".to_string(),
            BillingError::TenantNotFound(_) => "Gym not found".to_string(),
            BillingError::InvalidSignature => "Invalid signature".to_string(),
            BillingError::Gateway(_) => "Failed to contact payment gateway".to_string(),
            BillingError::GatewayResponseInvalid(_) => {
                "Payment gateway did not return a checkout URL".to_string()
            }
            BillingError::Persistence(_) => "Internal error while saving billing state".to_string(),
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            BillingError::Authentication(d)
            | BillingError::Forbidden(d)
            | BillingError::Validation(d)
            | BillingError::Gateway(d)
            | BillingError::GatewayResponseInvalid(d) => Some(d.clone()),
            BillingError::MissingRequiredFields(fields) => Some(fields.join(", ")),
            BillingError::PlanNotFound(id) | BillingError::TenantNotFound(id) => Some(id.clone()),
            BillingError::MissingPaymentId
            | BillingError::InvalidSignature
            | BillingError::Persistence(_) => None,
        }
    }
}

impl ResponseError for BillingError {
    fn status_code(&self) -> StatusCode {
        match self {
            BillingError::Authentication(_) | BillingError::InvalidSignature => StatusCode::UNAUTHORIZED,
            BillingError::Forbidden(_) => StatusCode::FORBIDDEN,
            BillingError::Validation(_)
            | BillingError::MissingRequiredFields(_)
            | BillingError::MissingPaymentId => StatusCode::BAD_REQUEST,
            BillingError::PlanNotFound(_) | BillingError::TenantNotFound(_) => StatusCode::NOT_FOUND,
            BillingError::Gateway(_)
            | BillingError::GatewayResponseInvalid(_)
            | BillingError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::warn!("{}", self);
        }

        HttpResponse::build(status).json(ErrorBody {
            error: self.message(),
            details: self.details(),
        })
    }
}
