use actix_web::web::{Bytes, Data};
use actix_web::{post, HttpRequest, HttpResponse};

use crate::error::BillingError;
use crate::handlers::SignatureHeader;
use crate::services::webhook::WebhookReconciler;

// POST /webhooks/payments
#[post("/webhooks/payments")]
pub async fn receive_payment_notification(
    req: HttpRequest,
    body: Bytes,
    reconciler: Data<WebhookReconciler>,
    header: Data<SignatureHeader>,
) -> Result<HttpResponse, BillingError> {
    let signature = req
        .headers()
        .get(header.0.as_str())
        .and_then(|value| value.to_str().ok());
    log::debug!("Payment notification received, {} bytes", body.len());

    let ack = reconciler.receive(&body, signature).await?;
    Ok(HttpResponse::Ok().json(ack))
}
