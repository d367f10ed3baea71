use axum::{extract::State, Json};
use serde::Deserialize;

use crate::api::routes::error::{ApiError, ApiJson};
use crate::api::routes::state::AppState;
use crate::domains::DomainRecord;
use crate::reputation::parse_check_url;
use crate::scheduler::CheckTask;

#[derive(Debug, Deserialize)]
pub struct ManualCheckRequest {
    pub url: String,
    #[serde(rename = "domainID")]
    pub domain_id: i64,
}

/// POST /api/manual-check
///
/// Runs a reputation check for one domain and returns the updated record.
/// If a check for the domain is already in flight the stored record is
/// returned unchanged.
pub async fn manual_check(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ManualCheckRequest>,
) -> Result<Json<DomainRecord>, ApiError> {
    parse_check_url(&req.url).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let record = state.scheduler.manual_check(req.domain_id, &req.url).await?;
    Ok(Json(record))
}

/// GET /api/check-status
/// Returns the latest check task of every domain that has one
pub async fn check_status(State(state): State<AppState>) -> Json<Vec<CheckTask>> {
    Json(state.scheduler.check_statuses())
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, TestApp};
    use axum::http::{Method, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_add_check_delete_scenario() {
        let app = TestApp::new();
        let id = app.add("example.com").await;

        let (_, body) = send(&app.router, Method::GET, "/api/get-domains", None).await;
        assert_eq!(body[0]["analysis_result"], serde_json::Value::Null);
        assert_eq!(body[0]["checked_at"], serde_json::Value::Null);

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/api/manual-check",
            Some(json!({"url": "https://example.com", "domainID": id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["analysis_result"],
            json!({"malicious": false, "suspicious": false})
        );
        assert_eq!(body["verdict"], "safe");
        assert!(body["checked_at"].is_string());

        let (_, body) = send(&app.router, Method::GET, "/api/check-status", None).await;
        assert_eq!(body[0]["domain_id"], id);
        assert_eq!(body[0]["status"], "done");
        assert_eq!(body[0]["source"], "manual");

        let (status, _) = send(
            &app.router,
            Method::DELETE,
            "/api/delete-domain",
            Some(json!({"domainID": id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app.router, Method::GET, "/api/get-domains", None).await;
        assert_eq!(body, json!([]));
        let (_, body) = send(&app.router, Method::GET, "/api/check-status", None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_manual_check_validation() {
        let app = TestApp::new();
        let id = app.add("example.com").await;

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/api/manual-check",
            Some(json!({"url": "ftp://example.com", "domainID": id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");

        let (status, _) = send(
            &app.router,
            Method::POST,
            "/api/manual-check",
            Some(json!({"url": "https://example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/api/manual-check",
            Some(json!({"url": "https://example.com", "domainID": id + 100})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
        assert_eq!(app.source.call_count(), 0);
    }

    #[tokio::test]
    async fn test_manual_check_url_must_match_domain() {
        let app = TestApp::new();
        let id = app.add("example.com").await;
        let (_, before) = send(&app.router, Method::GET, "/api/get-domains", None).await;

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/api/manual-check",
            Some(json!({"url": "https://evil.org/", "domainID": id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");
        assert_eq!(app.source.call_count(), 0);

        let (_, after) = send(&app.router, Method::GET, "/api/get-domains", None).await;
        assert_eq!(after, before);
        assert_eq!(after[0]["checked_at"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_manual_check_upstream_failure() {
        let app = TestApp::failing();
        let id = app.add("example.com").await;

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/api/manual-check",
            Some(json!({"url": "https://example.com", "domainID": id})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "check_failed");
        assert_eq!(body["transient"], true);

        let (_, body) = send(&app.router, Method::GET, "/api/get-domains", None).await;
        assert_eq!(body[0]["analysis_result"], serde_json::Value::Null);

        let (_, body) = send(&app.router, Method::GET, "/api/check-status", None).await;
        assert_eq!(body[0]["status"], "failed");
        assert!(body[0]["error"].is_string());
    }
}
