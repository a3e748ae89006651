use actix_web::web::Data;
use actix_web::HttpResponse;
use serde_json::json;

use crate::services::store::BillingStore;

pub async fn health_check(store: Data<dyn BillingStore>) -> HttpResponse {
    match store.health_check().await {
        Ok(()) => HttpResponse::Ok().json(json!({ "status": "ok" })),
        Err(e) => {
            log::error!("Health check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(json!({ "status": "unavailable" }))
        }
    }
}
