use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use std::future::{ready, Ready};

use crate::error::BillingError;
use crate::models::principal::Principal;
use crate::services::auth::Authenticator;

impl FromRequest for Principal {
    type Error = BillingError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> Result<Principal, BillingError> {
    let authenticator = req.app_data::<web::Data<dyn Authenticator>>().ok_or_else(|| {
        log::error!("No authenticator registered");
        BillingError::Authentication("authentication is not configured".to_string())
    })?;

    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| BillingError::Authentication("missing bearer token".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| BillingError::Authentication("malformed Authorization header".to_string()))?;

    authenticator
        .authenticate(token)
        .ok_or_else(|| BillingError::Authentication("unknown token".to_string()))
}

pub fn require_admin(principal: &Principal) -> Result<(), BillingError> {
    if principal.is_system_admin() {
        Ok(())
    } else {
        Err(BillingError::Forbidden(format!(
            "user {} is not a system administrator",
            principal.user_id
        )))
    }
}
