use actix_web::web::{Data, Json};
use actix_web::{post, HttpResponse};

use crate::error::BillingError;
use crate::models::{payment::CheckoutRequest, principal::Principal};
use crate::services::checkout::CheckoutInitiator;

// POST /checkout
#[post("/checkout")]
pub async fn create_checkout(
    principal: Principal,
    checkout: Data<CheckoutInitiator>,
    payload: Json<CheckoutRequest>,
) -> Result<HttpResponse, BillingError> {
    let response = checkout.initiate(&principal, &payload).await?;
    Ok(HttpResponse::Ok().json(response))
}
