use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::routes::error::{ApiError, ApiJson};
use crate::api::routes::state::AppState;
use crate::settings::AutoCheckSetting;

#[derive(Debug, Deserialize)]
pub struct AutoCheckRequest {
    pub is_auto_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct AutoCheckResponse {
    pub status: u16,
    pub is_auto_enabled: bool,
}

/// GET /api/get-auto
///
/// The UI expects the flag wrapped in a one-element array.
pub async fn get_auto(State(state): State<AppState>) -> Result<Json<Vec<AutoCheckSetting>>, ApiError> {
    let is_auto_enabled = state.scheduler.is_auto_enabled()?;
    Ok(Json(vec![AutoCheckSetting { is_auto_enabled }]))
}

/// POST /api/auto-check
/// Persists the auto-check flag and starts or stops the background sweep
pub async fn auto_check(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AutoCheckRequest>,
) -> Result<Json<AutoCheckResponse>, ApiError> {
    state.scheduler.set_auto_enabled(req.is_auto_enabled)?;

    log::info!(
        "Auto-check {}",
        if req.is_auto_enabled { "enabled" } else { "disabled" }
    );

    Ok(Json(AutoCheckResponse {
        status: 200,
        is_auto_enabled: req.is_auto_enabled,
    }))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::{send, TestApp};
    use axum::http::{Method, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_toggle_auto_check() {
        let app = TestApp::new();

        let (status, body) = send(&app.router, Method::GET, "/api/get-auto", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"is_auto_enabled": false}]));

        let (status, body) = send(
            &app.router,
            Method::POST,
            "/api/auto-check",
            Some(json!({"is_auto_enabled": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": 200, "is_auto_enabled": true}));
        assert!(app.state.scheduler.is_sweep_running());

        let (_, body) = send(&app.router, Method::GET, "/api/get-auto", None).await;
        assert_eq!(body, json!([{"is_auto_enabled": true}]));

        let (status, _) = send(
            &app.router,
            Method::POST,
            "/api/auto-check",
            Some(json!({"is_auto_enabled": false})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!app.state.scheduler.is_sweep_running());
    }

    #[tokio::test]
    async fn test_auto_check_requires_boolean() {
        let app = TestApp::new();

        for body in [json!({"is_auto_enabled": "yes"}), json!({})] {
            let (status, resp) =
                send(&app.router, Method::POST, "/api/auto-check", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(resp["kind"], "invalid_request");
        }

        let (_, body) = send(&app.router, Method::GET, "/api/get-auto", None).await;
        assert_eq!(body, json!([{"is_auto_enabled": false}]));
    }
}
