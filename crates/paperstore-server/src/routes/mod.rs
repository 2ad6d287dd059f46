//! HTTP routes.

mod auth;
mod batch;
mod files;
mod papers;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router(state: AppState, cors_allow_any_origin: bool) -> Router {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .merge(papers::routes())
        .merge(batch::routes())
        .merge(auth::routes())
        .merge(files::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_allow_any_origin {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

async fn healthz(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .db
        .with_conn(|conn| Ok(conn.query_row("SELECT 1", [], |_| Ok(()))?))?;
    Ok(Json(json!({ "status": "ok" })))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::Value;
    use tower::ServiceExt;

    use paperstore::arxiv::ArxivClient;
    use paperstore::batch::{BatchClient, BatchRequest, BatchState, BatchStatus};
    use paperstore::config::BatchConfig;
    use paperstore::storage::LocalStore;
    use paperstore::{
        BatchError, Database, ExtractionWorker, IngestionService, MetadataSupervisor, ObjectStore,
    };

    use super::*;

    pub(crate) struct IdleBatchClient;

    #[async_trait]
    impl BatchClient for IdleBatchClient {
        async fn submit(&self, _requests: Vec<BatchRequest>) -> Result<String, BatchError> {
            Ok("batches/test".to_string())
        }

        async fn status(&self, _handle: &str) -> Result<BatchStatus, BatchError> {
            Ok(BatchStatus::in_progress(BatchState::Running))
        }
    }

    pub(crate) struct TestApp {
        pub router: Router,
        pub state: AppState,
        _dir: tempfile::TempDir,
    }

    /// App over an in-memory database and a local store in a temp dir.
    pub(crate) fn test_app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalStore::new(dir.path()).unwrap());
        let worker = Arc::new(ExtractionWorker::spawn().unwrap());
        let arxiv = ArxivClient::with_urls("http://127.0.0.1:9/api/query", "http://127.0.0.1:9/pdf")
            .unwrap();
        let ingest =
            IngestionService::new(db.clone(), store.clone(), worker.clone(), arxiv).unwrap();
        let supervisor = MetadataSupervisor::with_client(
            db.clone(),
            store.clone(),
            worker.clone(),
            Arc::new(IdleBatchClient),
            BatchConfig::default(),
        );
        let state = AppState::from_parts(
            db,
            store,
            worker,
            Arc::new(ingest),
            supervisor,
            None,
            true,
        );
        TestApp {
            router: router(state.clone(), true),
            state,
            _dir: dir,
        }
    }

    pub(crate) async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
        let response: Response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub(crate) fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    pub(crate) fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let app = test_app();
        let (status, body) = send(&app, get("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
