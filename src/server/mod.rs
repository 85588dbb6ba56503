//! HTTP API for fetchgate.
//!
//! Exposes the gateway as a JSON API. The server binds to `127.0.0.1:3000`
//! by default and exposes:
//!
//! - `POST /api/execute`         — evaluate a request and run it if allowed
//! - `GET  /api/policies`        — summaries of the loaded policies
//! - `POST /api/policies/reload` — re-read the policy directory
//!
//! Every endpoint answers `200 OK` with a JSON body. A denied request is a
//! normal response carrying `"allowed": false` and an `error` message, not
//! an HTTP error; only the bearer guard ([`auth`]) produces a non-200
//! status. Policy details beyond title, description and pattern never leave
//! the process.

pub mod auth;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::{middleware, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::{FetchgateError, Result};
use crate::executor::RequestExecutor;
use crate::policy::engine::{PolicyEngine, RequestContext};
use crate::policy::store::{PolicyStore, MANIFEST_FILE};

/// Shared application state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Policy store backing the gateway (hot-reloadable).
    pub store: Arc<PolicyStore>,
    /// First-match evaluator over the store.
    pub engine: PolicyEngine,
    /// Shared HTTP client for approved requests.
    pub executor: RequestExecutor,
    /// Bearer token required on every endpoint, when set.
    pub auth_token: Option<String>,
}

/// Build the axum router with all API endpoints and the bearer guard.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/execute", post(execute_request))
        .route("/api/policies", get(list_policies))
        .route("/api/policies/reload", post(reload_policies))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .with_state(state)
}

/// Start the API server on the given address.
pub async fn start(listen_addr: &str, state: Arc<AppState>) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!("fetchgate API listening on {}", listen_addr);
    axum::serve(listener, app)
        .await
        .map_err(|e| FetchgateError::Server(e.to_string()))?;
    Ok(())
}

// ─── Request Types ──────────────────────────────────────────────────────────

/// Methods accepted by the execute endpoint.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

/// Body of `POST /api/execute`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
}

// ─── Handlers ───────────────────────────────────────────────────────────────

/// `POST /api/execute` — run a request through the policy pipeline.
async fn execute_request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteRequest>,
) -> Json<serde_json::Value> {
    let mut ctx = RequestContext {
        url: req.url,
        method: req.method.as_str().to_string(),
        headers: req.headers,
        body: req.body,
        query_params: req.query_params,
    };

    let verdict = state.engine.evaluate(&mut ctx);
    if !verdict.allowed {
        info!(
            "denied {} {}: {}",
            ctx.method,
            ctx.url,
            verdict.error.as_deref().unwrap_or("denied")
        );
        return Json(json!({
            "error": verdict.error,
            "allowed": false,
            "matchedPolicy": verdict.matched,
        }));
    }

    info!("allowed {} {}", ctx.method, ctx.url);
    match state.executor.execute(&ctx).await {
        Ok(response) => Json(json!({
            "allowed": true,
            "matchedPolicy": verdict.matched,
            "response": response,
        })),
        Err(e) => Json(json!({
            "error": format!("request failed: {}", e),
            "allowed": true,
            "matchedPolicy": verdict.matched,
        })),
    }
}

/// `GET /api/policies` — summaries of the current policy set.
async fn list_policies(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let set = state.store.current();
    Json(json!({
        "message": policy_count_message(set.len()),
        "policies": set.summaries(),
    }))
}

/// `POST /api/policies/reload` — re-read the policy directory and manifest.
async fn reload_policies(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let set = state.store.reload();
    info!("reloaded {} policies via API", set.len());
    Json(json!({
        "message": format!("Reloaded {} policy(s)", set.len()),
        "policies": set.summaries(),
    }))
}

fn policy_count_message(count: usize) -> String {
    if count == 0 {
        format!(
            "No policies configured. Add policy files to the policy directory and list them in {}.",
            MANIFEST_FILE
        )
    } else {
        format!("Found {} policy(s)", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    fn write_policies(dir: &Path, files: &[(&str, serde_json::Value)]) {
        let names: Vec<&str> = files.iter().map(|(name, _)| *name).collect();
        let manifest = json!({ "middlewares": names });
        fs::write(dir.join(MANIFEST_FILE), manifest.to_string()).unwrap();
        for (name, policy) in files {
            fs::write(dir.join(name), policy.to_string()).unwrap();
        }
    }

    fn test_state(
        files: &[(&str, serde_json::Value)],
        auth_token: Option<&str>,
    ) -> (Arc<AppState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        write_policies(dir.path(), files);
        let store = Arc::new(PolicyStore::new(dir.path()));
        store.reload();
        let state = AppState {
            store: store.clone(),
            engine: PolicyEngine::new(store),
            executor: RequestExecutor::new(None).unwrap(),
            auth_token: auth_token.map(str::to_string),
        };
        (Arc::new(state), dir)
    }

    fn example_policy() -> serde_json::Value {
        json!({
            "title": "Example API",
            "description": "httpbin-style example",
            "pattern": "https://api.example.com/**",
            "handle": {}
        })
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// Send a request to the router and parse the JSON response body.
    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        use tower::ServiceExt as _;
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn execute_denies_unmatched_urls_with_status_200() {
        let (state, _dir) = test_state(&[("api.json", example_policy())], None);
        let app = router(state);

        let req = post_json(
            "/api/execute",
            json!({"url": "https://other.example.com/data", "method": "GET"}),
        );
        let (status, body) = send(app, req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["allowed"], false);
        assert_eq!(body["matchedPolicy"], serde_json::Value::Null);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("https://other.example.com/data"));
    }

    #[tokio::test]
    async fn execute_reports_the_denying_policy() {
        let (state, _dir) = test_state(
            &[(
                "deny.json",
                json!({
                    "title": "Blocked",
                    "description": "always denies",
                    "pattern": "https://api.example.com/**",
                    "handle": { "result": false }
                }),
            )],
            None,
        );
        let app = router(state);

        let req = post_json(
            "/api/execute",
            json!({"url": "https://api.example.com/users", "method": "GET"}),
        );
        let (_, body) = send(app, req).await;

        assert_eq!(body["allowed"], false);
        assert_eq!(body["matchedPolicy"]["title"], "Blocked");
        assert!(body["error"].as_str().unwrap().contains("Blocked"));
    }

    #[tokio::test]
    async fn execute_with_empty_policy_set_reports_it() {
        let (state, _dir) = test_state(&[], None);
        let app = router(state);

        let req = post_json(
            "/api/execute",
            json!({"url": "https://api.example.com/users", "method": "GET"}),
        );
        let (_, body) = send(app, req).await;

        assert_eq!(body["error"], "no policies configured");
        assert_eq!(body["allowed"], false);
    }

    #[tokio::test]
    async fn list_policies_returns_summaries_and_a_count() {
        let (state, _dir) = test_state(
            &[
                ("api.json", example_policy()),
                (
                    "other.json",
                    json!({
                        "title": "Other API",
                        "description": "second policy",
                        "pattern": "https://other.example.com/**",
                        "handle": {}
                    }),
                ),
            ],
            None,
        );
        let app = router(state);

        let (status, body) = send(app, get("/api/policies")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Found 2 policy(s)");
        let policies = body["policies"].as_array().unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0]["title"], "Example API");
        assert_eq!(policies[1]["title"], "Other API");
    }

    #[tokio::test]
    async fn list_policies_hides_handler_details() {
        let (state, _dir) = test_state(&[("api.json", example_policy())], None);
        let app = router(state);

        let (_, body) = send(app, get("/api/policies")).await;
        let policy = &body["policies"][0];
        assert!(policy.get("handle").is_none());
        assert!(policy.get("source").is_none());
        assert!(policy.get("handler").is_none());
    }

    #[tokio::test]
    async fn list_policies_explains_an_empty_set() {
        let (state, _dir) = test_state(&[], None);
        let app = router(state);

        let (_, body) = send(app, get("/api/policies")).await;
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("No policies configured"));
        assert!(body["policies"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reload_picks_up_newly_written_policies() {
        let (state, dir) = test_state(&[("api.json", example_policy())], None);

        write_policies(
            dir.path(),
            &[
                ("api.json", example_policy()),
                (
                    "new.json",
                    json!({
                        "title": "New API",
                        "description": "added after startup",
                        "pattern": "https://new.example.com/**",
                        "handle": {}
                    }),
                ),
            ],
        );

        let app = router(state.clone());
        let (_, body) = send(app, post_json("/api/policies/reload", json!({}))).await;
        assert_eq!(body["message"], "Reloaded 2 policy(s)");
        assert_eq!(body["policies"].as_array().unwrap().len(), 2);

        let (_, body) = send(router(state), get("/api/policies")).await;
        assert_eq!(body["message"], "Found 2 policy(s)");
    }

    #[tokio::test]
    async fn missing_authorization_header_is_rejected() {
        let (state, _dir) = test_state(&[("api.json", example_policy())], Some("secret"));
        let app = router(state);

        let (status, body) = send(app, get("/api/policies")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authorization header is required");
    }

    #[tokio::test]
    async fn non_bearer_authorization_is_rejected() {
        let (state, _dir) = test_state(&[("api.json", example_policy())], Some("secret"));
        let app = router(state);

        let req = Request::builder()
            .uri("/api/policies")
            .header("authorization", "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body["error"],
            "Invalid authorization format. Use: Bearer <token>"
        );
    }

    #[tokio::test]
    async fn empty_bearer_token_is_a_format_error() {
        let (state, _dir) = test_state(&[("api.json", example_policy())], Some("secret"));
        let app = router(state);

        let req = Request::builder()
            .uri("/api/policies")
            .header("authorization", "Bearer ")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body["error"],
            "Invalid authorization format. Use: Bearer <token>"
        );
    }

    #[tokio::test]
    async fn padded_bearer_token_is_a_format_error() {
        let (state, _dir) = test_state(&[("api.json", example_policy())], Some("secret"));
        let app = router(state);

        let req = Request::builder()
            .uri("/api/policies")
            .header("authorization", "Bearer  secret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body["error"],
            "Invalid authorization format. Use: Bearer <token>"
        );
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let (state, _dir) = test_state(&[("api.json", example_policy())], Some("secret"));
        let app = router(state);

        let req = Request::builder()
            .uri("/api/policies")
            .header("authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid token");
    }

    #[tokio::test]
    async fn correct_token_is_accepted() {
        let (state, _dir) = test_state(&[("api.json", example_policy())], Some("secret"));
        let app = router(state);

        let req = Request::builder()
            .uri("/api/policies")
            .header("authorization", "Bearer secret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Found 1 policy(s)");
    }

    #[tokio::test]
    async fn without_a_configured_token_the_api_is_open() {
        let (state, _dir) = test_state(&[("api.json", example_policy())], None);
        let app = router(state);

        let (status, _) = send(app, get("/api/policies")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn an_empty_configured_token_leaves_the_api_open() {
        let (state, _dir) = test_state(&[("api.json", example_policy())], Some(""));
        let app = router(state);

        let (status, _) = send(app, get("/api/policies")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
