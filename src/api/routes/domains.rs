use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::routes::error::{ApiError, ApiJson};
use crate::api::routes::state::AppState;
use crate::domains::DomainRecord;

/// Request structure for adding a domain
#[derive(Debug, Deserialize)]
pub struct AddDomainRequest {
    pub domain: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct AddDomainResponse {
    pub status: u16,
    pub record: DomainRecord,
}

#[derive(Debug, Deserialize)]
pub struct DeleteDomainRequest {
    #[serde(rename = "domainID")]
    pub domain_id: i64,
}

#[derive(Debug, Serialize)]
pub struct DeleteDomainResponse {
    pub status: u16,
    #[serde(rename = "domainID")]
    pub domain_id: i64,
}

/// GET /api/get-domains
/// Returns all monitored domains in the order they were added
pub async fn get_domains(State(state): State<AppState>) -> Result<Json<Vec<DomainRecord>>, ApiError> {
    let conn = state.db.get_connection()?;
    let records = DomainRecord::list(&conn)?;
    Ok(Json(records))
}

/// POST /api/add-domain
pub async fn add_domain(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AddDomainRequest>,
) -> Result<(StatusCode, Json<AddDomainResponse>), ApiError> {
    let conn = state.db.get_connection()?;
    let record = DomainRecord::create(&conn, &req.domain, &req.created_at)?;

    log::info!("Added domain {} (id: {})", record.domain, record.id);

    Ok((
        StatusCode::CREATED,
        Json(AddDomainResponse {
            status: StatusCode::CREATED.as_u16(),
            record,
        }),
    ))
}

/// DELETE /api/delete-domain
pub async fn delete_domain(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<DeleteDomainRequest>,
) -> Result<Json<DeleteDomainResponse>, ApiError> {
    state.scheduler.delete_domain(req.domain_id)?;

    log::info!("Deleted domain id {}", req.domain_id);

    Ok(Json(DeleteDomainResponse {
        status: StatusCode::OK.as_u16(),
        domain_id: req.domain_id,
    }))
}
