//! HTTP routes for the controller.
//!
//! Every JSON endpoint answers `{status, message, kind?}`. Domain failures
//! (validation, duplicates, missing accounts, launch errors) are reported in
//! that body with a 2xx code; only malformed requests and unknown routes get
//! an error status.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::assets::{content_type, StaticAssets};
use super::templates::{IndexView, PageSettings, TemplateEngine};
use crate::accounts::{AccountError, AccountRecord, AccountStore};
use crate::daemon::{DaemonRecord, DaemonRegistry, RegistrationDiscovery, StatusResponse};
use crate::error::ErrorKind;
use crate::launcher::LaunchDispatcher;

/// Shared application state.
pub struct AppState {
    pub accounts: Arc<AccountStore>,
    pub daemons: Arc<DaemonRegistry>,
    pub registrations: Arc<RegistrationDiscovery>,
    pub dispatcher: Arc<LaunchDispatcher>,
    pub template_engine: TemplateEngine,
    pub settings: PageSettings,
}

/// Build the router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/assets/*path", get(assets_handler))
        .route("/heartbeat", get(heartbeat_handler))
        .route("/get_daemons", get(get_daemons_handler))
        .route("/get_accounts", get(get_accounts_handler))
        .route("/launch_account", post(launch_handler))
        .route("/add_account", post(add_account_handler))
        .route("/update_account", put(update_account_handler))
        .route("/delete_account", post(delete_account_handler))
        .route("/register_daemon", post(register_daemon_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Body of `POST /launch_account`.
#[derive(Debug, Deserialize)]
pub struct LaunchRequest {
    pub account_id: String,
    #[serde(default)]
    pub daemon_nickname: Option<String>,
}

/// Body of `POST /add_account`.
#[derive(Debug, Deserialize)]
pub struct AddAccountRequest {
    #[serde(default)]
    pub nickname: String,
    #[serde(flatten)]
    pub record: AccountRecord,
}

/// Body of `PUT /update_account`.
#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    #[serde(rename = "originalNickname", default)]
    pub original_nickname: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(flatten)]
    pub record: AccountRecord,
}

/// Body of `POST /delete_account`.
#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    #[serde(default)]
    pub nickname: String,
}

type Reply = (StatusCode, Json<StatusResponse>);

fn success(code: StatusCode, message: impl Into<String>) -> Reply {
    (code, Json(StatusResponse::success(message)))
}

fn failure(kind: ErrorKind, message: impl Into<String>) -> Reply {
    (StatusCode::OK, Json(StatusResponse::error(kind, message)))
}

fn account_failure(e: AccountError) -> Reply {
    match e.kind() {
        ErrorKind::PersistenceError => error!("{}", e),
        _ => warn!("{}", e),
    }
    failure(e.kind(), e.to_string())
}

/// Handler for the launcher page.
async fn index_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let view = IndexView::new(&state.accounts.list(), state.daemons.list(), state.settings);
    match state.template_engine.render_index(&view) {
        Ok(html) => Html(html).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Template error: {}", e),
        )
            .into_response(),
    }
}

/// Handler for static assets.
async fn assets_handler(Path(path): Path<String>) -> Response {
    match StaticAssets::get(&path) {
        Some(file) => (
            [(header::CONTENT_TYPE, content_type(&path))],
            file.data.into_owned(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

async fn heartbeat_handler() -> Json<StatusResponse> {
    Json(StatusResponse::success("Controller is alive"))
}

async fn get_daemons_handler(State(state): State<Arc<AppState>>) -> Json<Vec<DaemonRecord>> {
    Json(state.daemons.list())
}

async fn get_accounts_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.accounts.list())
}

async fn launch_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LaunchRequest>,
) -> Reply {
    let nickname = request.account_id.trim();
    match state
        .dispatcher
        .launch(nickname, request.daemon_nickname.as_deref())
        .await
    {
        Ok(outcome) => success(StatusCode::OK, outcome.message),
        Err(e) => {
            warn!("Launch of '{}' failed: {}", nickname, e);
            failure(e.kind(), e.to_string())
        }
    }
}

async fn add_account_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddAccountRequest>,
) -> Reply {
    let nickname = request.nickname.trim();
    match state.accounts.add(nickname, request.record) {
        Ok(()) => success(
            StatusCode::CREATED,
            format!("Account '{}' added", nickname),
        ),
        Err(e) => account_failure(e),
    }
}

async fn update_account_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateAccountRequest>,
) -> Reply {
    let nickname = request.nickname.trim();
    match state
        .accounts
        .update(request.original_nickname.trim(), nickname, request.record)
    {
        Ok(()) => success(StatusCode::OK, format!("Account '{}' updated", nickname)),
        Err(e) => account_failure(e),
    }
}

async fn delete_account_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteAccountRequest>,
) -> Reply {
    let nickname = request.nickname.trim();
    match state.accounts.delete(nickname) {
        Ok(()) => success(StatusCode::OK, format!("Account '{}' deleted", nickname)),
        Err(e) => account_failure(e),
    }
}

async fn register_daemon_handler(
    State(state): State<Arc<AppState>>,
    Json(daemon): Json<DaemonRecord>,
) -> Reply {
    if daemon.nickname.trim().is_empty() {
        return failure(ErrorKind::ValidationError, "Daemon nickname is required");
    }

    debug!("Registration from '{}' at {}", daemon.nickname, daemon.socket_addr());
    let message = format!("Daemon '{}' registered", daemon.nickname);
    state.registrations.register(daemon);
    info!("{}", message);
    success(StatusCode::OK, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    use crate::daemon::mock::MockTransport;
    use crate::launcher::mock::MockLauncher;

    struct Fixture {
        _temp_dir: TempDir,
        launcher: MockLauncher,
        transport: MockTransport,
        state: Arc<AppState>,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let accounts = Arc::new(AccountStore::open_in(temp_dir.path()).unwrap());
        let transport = MockTransport::new();
        let registrations = Arc::new(RegistrationDiscovery::new(Arc::new(transport.clone())));
        let daemons = Arc::new(DaemonRegistry::new(registrations.clone()));
        let launcher = MockLauncher::new();
        let dispatcher = Arc::new(LaunchDispatcher::new(
            Arc::clone(&accounts),
            Arc::clone(&daemons),
            Arc::new(launcher.clone()),
            Arc::new(transport.clone()),
        ));

        let state = Arc::new(AppState {
            accounts,
            daemons,
            registrations,
            dispatcher,
            template_engine: TemplateEngine::new().unwrap(),
            settings: PageSettings::default(),
        });

        Fixture {
            _temp_dir: temp_dir,
            launcher,
            transport,
            state,
        }
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = build_router(Arc::clone(state)).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    const BOB: &str =
        r#"{"nickname":"acc1","JX_CHARACTER_ID":"c1","JX_SESSION_ID":"s1","JX_DISPLAY_NAME":"Bob"}"#;

    #[tokio::test]
    async fn test_index_returns_html() {
        let f = fixture();
        let response = build_router(Arc::clone(&f.state))
            .oneshot(get("/"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/html"));
    }

    #[tokio::test]
    async fn test_assets_handler() {
        let f = fixture();
        let response = build_router(Arc::clone(&f.state))
            .oneshot(get("/assets/app.js"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("javascript"));

        let response = build_router(Arc::clone(&f.state))
            .oneshot(get("/assets/nonexistent.css"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_add_then_get_accounts() {
        let f = fixture();

        let (status, body) = send(&f.state, json_request("POST", "/add_account", BOB)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "success");

        let (status, body) = send(&f.state, get("/get_accounts")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["acc1"]["JX_DISPLAY_NAME"], "Bob");
        assert_eq!(body["acc1"]["JX_REFRESH_TOKEN"], "");
    }

    #[tokio::test]
    async fn test_add_duplicate_reports_error() {
        let f = fixture();
        send(&f.state, json_request("POST", "/add_account", BOB)).await;

        let (status, body) = send(&f.state, json_request("POST", "/add_account", BOB)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert_eq!(body["kind"], "duplicate_key");
    }

    #[tokio::test]
    async fn test_add_missing_field_is_validation_error() {
        let f = fixture();
        let (_, body) = send(
            &f.state,
            json_request(
                "POST",
                "/add_account",
                r#"{"nickname":"acc1","JX_CHARACTER_ID":"c1","JX_SESSION_ID":"  "}"#,
            ),
        )
        .await;

        assert_eq!(body["status"], "error");
        assert_eq!(body["kind"], "validation_error");
        assert!(f.state.accounts.is_empty());
    }

    #[tokio::test]
    async fn test_update_renames_account() {
        let f = fixture();
        send(&f.state, json_request("POST", "/add_account", BOB)).await;

        let (status, body) = send(
            &f.state,
            json_request(
                "PUT",
                "/update_account",
                r#"{"originalNickname":"acc1","nickname":"acc2","JX_CHARACTER_ID":"c1","JX_SESSION_ID":"s1","JX_DISPLAY_NAME":"Bobby"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");

        let accounts = f.state.accounts.list();
        assert!(!accounts.contains_key("acc1"));
        assert_eq!(accounts["acc2"].display_name, "Bobby");
    }

    #[tokio::test]
    async fn test_update_unknown_original_is_not_found() {
        let f = fixture();
        let (_, body) = send(
            &f.state,
            json_request(
                "PUT",
                "/update_account",
                r#"{"originalNickname":"ghost","nickname":"ghost","JX_CHARACTER_ID":"c1","JX_SESSION_ID":"s1","JX_DISPLAY_NAME":"Bob"}"#,
            ),
        )
        .await;

        assert_eq!(body["status"], "error");
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_delete_account() {
        let f = fixture();
        send(&f.state, json_request("POST", "/add_account", BOB)).await;

        let (_, body) = send(
            &f.state,
            json_request("POST", "/delete_account", r#"{"nickname":"acc1"}"#),
        )
        .await;
        assert_eq!(body["status"], "success");

        let (_, body) = send(
            &f.state,
            json_request("POST", "/delete_account", r#"{"nickname":"acc1"}"#),
        )
        .await;
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_padded_nicknames_resolve_everywhere() {
        let f = fixture();
        let (_, body) = send(
            &f.state,
            json_request(
                "POST",
                "/add_account",
                r#"{"nickname":" acc1 ","JX_CHARACTER_ID":"c1","JX_SESSION_ID":"s1","JX_DISPLAY_NAME":"Bob"}"#,
            ),
        )
        .await;
        assert_eq!(body["status"], "success");
        assert!(f.state.accounts.get("acc1").is_some());

        let (_, body) = send(
            &f.state,
            json_request("POST", "/launch_account", r#"{"account_id":"acc1  "}"#),
        )
        .await;
        assert_eq!(body["status"], "success");
        assert_eq!(f.launcher.launch_count(), 1);

        let (_, body) = send(
            &f.state,
            json_request(
                "PUT",
                "/update_account",
                r#"{"originalNickname":" acc1","nickname":"acc2 ","JX_CHARACTER_ID":"c1","JX_SESSION_ID":"s1","JX_DISPLAY_NAME":"Bob"}"#,
            ),
        )
        .await;
        assert_eq!(body["status"], "success");
        assert!(f.state.accounts.get("acc2").is_some());

        let (_, body) = send(
            &f.state,
            json_request("POST", "/delete_account", r#"{"nickname":"	acc2 "}"#),
        )
        .await;
        assert_eq!(body["status"], "success");
        assert!(f.state.accounts.is_empty());
    }

    #[tokio::test]
    async fn test_launch_local() {
        let f = fixture();
        send(&f.state, json_request("POST", "/add_account", BOB)).await;

        let (_, body) = send(
            &f.state,
            json_request("POST", "/launch_account", r#"{"account_id":"acc1"}"#),
        )
        .await;

        assert_eq!(body["status"], "success");
        assert_eq!(f.launcher.launches(), vec![AccountRecord::new("c1", "s1", "Bob")]);
    }

    #[tokio::test]
    async fn test_launch_unknown_account_does_nothing() {
        let f = fixture();
        let (_, body) = send(
            &f.state,
            json_request(
                "POST",
                "/launch_account",
                r#"{"account_id":"ghost","daemon_nickname":"pc2"}"#,
            ),
        )
        .await;

        assert_eq!(body["kind"], "not_found");
        assert_eq!(f.launcher.launch_count(), 0);
        assert!(f.transport.launches().is_empty());
    }

    #[tokio::test]
    async fn test_launch_unknown_daemon_is_launch_error() {
        let f = fixture();
        send(&f.state, json_request("POST", "/add_account", BOB)).await;

        let (_, body) = send(
            &f.state,
            json_request(
                "POST",
                "/launch_account",
                r#"{"account_id":"acc1","daemon_nickname":"pc9"}"#,
            ),
        )
        .await;

        assert_eq!(body["status"], "error");
        assert_eq!(body["kind"], "launch_error");
        assert_eq!(f.launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_registered_daemon_is_listed_after_refresh() {
        let f = fixture();
        let (_, body) = send(
            &f.state,
            json_request(
                "POST",
                "/register_daemon",
                r#"{"nickname":"pc2","ip_address":"10.0.0.2","port":5001}"#,
            ),
        )
        .await;
        assert_eq!(body["status"], "success");

        let (_, body) = send(&f.state, get("/get_daemons")).await;
        assert_eq!(body, serde_json::json!([]));

        f.state.daemons.refresh().await.unwrap();
        let (_, body) = send(&f.state, get("/get_daemons")).await;
        assert_eq!(
            body,
            serde_json::json!([{"nickname":"pc2","ip_address":"10.0.0.2","port":5001}])
        );
    }

    #[tokio::test]
    async fn test_launch_forwards_to_daemon() {
        let f = fixture();
        send(&f.state, json_request("POST", "/add_account", BOB)).await;
        f.state
            .registrations
            .register(DaemonRecord::new("pc2", [10, 0, 0, 2].into(), 5001));
        f.state.daemons.refresh().await.unwrap();

        let (_, body) = send(
            &f.state,
            json_request(
                "POST",
                "/launch_account",
                r#"{"account_id":"acc1","daemon_nickname":"pc2"}"#,
            ),
        )
        .await;

        assert_eq!(body["status"], "success");
        let forwarded = f.transport.launches();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].0, "pc2");
        assert_eq!(f.launcher.launch_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let f = fixture();
        let (status, _) = send(&f.state, json_request("POST", "/add_account", "not json")).await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn test_controller_heartbeat() {
        let f = fixture();
        let (status, body) = send(&f.state, get("/heartbeat")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
    }
}
