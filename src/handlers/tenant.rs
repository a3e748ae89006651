use actix_web::web::{Data, Path};
use actix_web::{get, HttpResponse};

use crate::error::BillingError;
use crate::models::principal::Principal;
use crate::services::entitlement::EntitlementQuery;

// GET /tenants/{gym_id}/entitlement
#[get("/tenants/{gym_id}/entitlement")]
pub async fn get_entitlement(
    principal: Principal,
    query: Data<EntitlementQuery>,
    path: Path<String>,
) -> Result<HttpResponse, BillingError> {
    let gym_id = path.into_inner();
    if !principal.can_access_gym(&gym_id) {
        return Err(BillingError::Forbidden(format!(
            "user {} cannot read gym {}",
            principal.user_id, gym_id
        )));
    }

    let status = query.check(&gym_id).await?;
    Ok(HttpResponse::Ok().json(status))
}
