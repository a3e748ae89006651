use actix_web::web::{Data, Json, Path};
use actix_web::{get, post, HttpResponse};
use serde::Deserialize;
use validator::Validate;

use crate::error::BillingError;
use crate::handlers::extractors::require_admin;
use crate::models::principal::Principal;
use crate::services::{admin::AdminOverride, catalog::SubscriptionCatalog, trial::TrialManager};

#[derive(Debug, Deserialize, Validate)]
pub struct ExtendTrialRequest {
    #[validate(range(min = 1, max = 365, message = "days must be between 1 and 365"))]
    pub days: i64,
}

// POST /admin/tenants/{gym_id}/provision
#[post("/{gym_id}/provision")]
pub async fn provision_tenant(
    principal: Principal,
    catalog: Data<SubscriptionCatalog>,
    path: Path<String>,
) -> Result<HttpResponse, BillingError> {
    require_admin(&principal)?;
    let onboarding = catalog.onboard(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(onboarding))
}

// POST /admin/tenants/{gym_id}/activate
#[post("/{gym_id}/activate")]
pub async fn activate_tenant(
    principal: Principal,
    admin: Data<AdminOverride>,
    path: Path<String>,
) -> Result<HttpResponse, BillingError> {
    require_admin(&principal)?;
    let gym_id = path.into_inner();
    log::info!("Admin {} activating gym {}", principal.user_id, gym_id);
    let tenant = admin.activate(&gym_id).await?;
    Ok(HttpResponse::Ok().json(tenant))
}

// POST /admin/tenants/{gym_id}/deactivate
#[post("/{gym_id}/deactivate")]
pub async fn deactivate_tenant(
    principal: Principal,
    admin: Data<AdminOverride>,
    path: Path<String>,
) -> Result<HttpResponse, BillingError> {
    require_admin(&principal)?;
    let gym_id = path.into_inner();
    log::info!("Admin {} deactivating gym {}", principal.user_id, gym_id);
    let tenant = admin.deactivate(&gym_id).await?;
    Ok(HttpResponse::Ok().json(tenant))
}

// POST /admin/tenants/{gym_id}/extend-trial
#[post("/{gym_id}/extend-trial")]
pub async fn extend_trial(
    principal: Principal,
    trials: Data<TrialManager>,
    path: Path<String>,
    payload: Json<ExtendTrialRequest>,
) -> Result<HttpResponse, BillingError> {
    require_admin(&principal)?;
    payload
        .validate()
        .map_err(|e| BillingError::Validation(e.to_string()))?;

    let tenant = trials.extend_trial(&path.into_inner(), payload.days).await?;
    Ok(HttpResponse::Ok().json(tenant))
}

// GET /admin/tenants/{gym_id}
#[get("/{gym_id}")]
pub async fn get_tenant_snapshot(
    principal: Principal,
    admin: Data<AdminOverride>,
    path: Path<String>,
) -> Result<HttpResponse, BillingError> {
    require_admin(&principal)?;
    let snapshot = admin.snapshot(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}
