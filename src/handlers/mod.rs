pub mod admin;
pub mod checkout;
pub mod extractors;
pub mod health;
pub mod tenant;
pub mod webhook;

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{web, HttpRequest, HttpResponse};

use crate::models::common::ErrorBody;
use crate::services::BillingServices;

/// Name of the header that carries the webhook HMAC.
#[derive(Debug, Clone)]
pub struct SignatureHeader(pub String);

/// Registers the billing components and every route under `/api/v1`.
pub fn configure(cfg: &mut web::ServiceConfig, services: &BillingServices) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::Data::from(services.store.clone()))
        .app_data(web::Data::from(services.authenticator.clone()))
        .app_data(web::Data::new(services.trials.clone()))
        .app_data(web::Data::new(services.catalog.clone()))
        .app_data(web::Data::new(services.checkout.clone()))
        .app_data(web::Data::new(services.webhook.clone()))
        .app_data(web::Data::new(services.admin.clone()))
        .app_data(web::Data::new(services.entitlement.clone()))
        .app_data(web::Data::new(SignatureHeader(services.signature_header.clone())))
        .service(
            web::scope("/api/v1")
                .service(webhook::receive_payment_notification)
                .service(checkout::create_checkout)
                .service(tenant::get_entitlement)
                .service(
                    web::scope("/admin/tenants")
                        .service(admin::provision_tenant)
                        .service(admin::activate_tenant)
                        .service(admin::deactivate_tenant)
                        .service(admin::extend_trial)
                        .service(admin::get_tenant_snapshot),
                )
                .route("/health", web::get().to(health::health_check)),
        );
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorBody {
        error: "Invalid JSON body".to_string(),
        details: Some(err.to_string()),
    });
    InternalError::from_response(err, response).into()
}
