//! HTTP API for the pipeline.
//!
//! Routes:
//! - `POST /api/index` `{documents_folder?}` starts a background indexing job
//! - `POST /api/query` `{query, documents_folder?, background?}` answers a query
//! - `GET /api/status/{job_id}` reports a job record
//! - `DELETE /admin/clear-all` wipes the store
//! - `GET /health` reports store connectivity
//! - `GET /metrics` Prometheus text exposition

use std::convert::Infallible;
use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::graphrag::{JobRegistry, PipelineController};
use crate::store::Store;
use crate::{metrics, Error};

/// Shared handles for request handlers.
pub struct AppState {
    pub controller: Arc<PipelineController>,
    pub jobs: Arc<JobRegistry>,
    pub documents_folder: String,
}

impl AppState {
    pub fn new(jobs: Arc<JobRegistry>, documents_folder: impl Into<String>) -> Self {
        Self {
            controller: jobs.controller().clone(),
            jobs,
            documents_folder: documents_folder.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct IndexRequest {
    documents_folder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    query: String,
    documents_folder: Option<String>,
    #[serde(default)]
    background: bool,
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn error_response(err: &Error) -> Response<Full<Bytes>> {
    let status = match err {
        Error::InvalidArgument(_) | Error::SerializationError(_) => StatusCode::BAD_REQUEST,
        Error::JobNotFound(_) => StatusCode::NOT_FOUND,
        Error::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    }
    json_response(status, &json!({ "detail": err.to_string() }))
}

async fn read_json<B, T>(req: Request<B>) -> Result<Option<T>, Error>
where
    B: Body,
    B::Error: Display,
    T: serde::de::DeserializeOwned,
{
    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| Error::Http(format!("Failed to read request body: {}", e)))?
        .to_bytes();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&body)?))
}

async fn index(state: &AppState, request: IndexRequest) -> Result<Response<Full<Bytes>>, Error> {
    let folder = request
        .documents_folder
        .unwrap_or_else(|| state.documents_folder.clone());
    let job_id = state.jobs.start_index(folder.clone()).await?;
    Ok(json_response(
        StatusCode::OK,
        &json!({
            "status": "started",
            "message": format!("Indexing started for folder: {}", folder),
            "job_id": job_id,
        }),
    ))
}

async fn query(state: &AppState, request: QueryRequest) -> Result<Response<Full<Bytes>>, Error> {
    if request.query.trim().is_empty() {
        return Err(Error::InvalidArgument("query must not be empty".to_string()));
    }
    let folder = request
        .documents_folder
        .unwrap_or_else(|| state.documents_folder.clone());

    if request.background {
        let job_id = state.jobs.start_query(request.query, folder.clone()).await?;
        return Ok(json_response(
            StatusCode::OK,
            &json!({
                "status": "started",
                "message": format!("Query started for folder: {}", folder),
                "job_id": job_id,
            }),
        ));
    }

    let answer = state.controller.query_folder(&request.query, &folder).await?;
    Ok(json_response(
        StatusCode::OK,
        &json!({ "query": request.query, "answer": answer }),
    ))
}

async fn job_status(state: &AppState, job_id: &str) -> Result<Response<Full<Bytes>>, Error> {
    let record = state.jobs.status(job_id).await?;
    Ok(json_response(StatusCode::OK, &serde_json::to_value(record)?))
}

async fn clear_all(state: &AppState) -> Result<Response<Full<Bytes>>, Error> {
    state.controller.store().clear_all().await?;
    warn!("All cached data cleared");
    Ok(json_response(
        StatusCode::OK,
        &json!({ "status": "success", "message": "All data cleared from the store" }),
    ))
}

async fn health(state: &AppState) -> Response<Full<Bytes>> {
    let store = state.controller.store();
    let (status, health, database) = match store.ping().await {
        Ok(()) => (StatusCode::OK, "healthy", "connected"),
        Err(err) => {
            warn!(error = %err, "Store health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "disconnected")
        }
    };
    json_response(
        status,
        &json!({
            "status": health,
            "service": "graphrag",
            "store": store.backend(),
            "database": database,
        }),
    )
}

fn metrics_response() -> Response<Full<Bytes>> {
    match metrics::render() {
        Ok((content_type, buffer)) => {
            let mut response = Response::new(Full::from(buffer));
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            response
        }
        Err(err) => {
            error!("Failed to encode metrics: {}", err);
            let mut response = Response::new(Full::from("encode error"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

/// Dispatch one request.
pub async fn route<B>(state: Arc<AppState>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let result = match (&method, path.as_str()) {
        (&Method::POST, "/api/index") => match read_json::<_, IndexRequest>(req).await {
            Ok(request) => index(&state, request.unwrap_or_default()).await,
            Err(err) => Err(err),
        },
        (&Method::POST, "/api/query") => match read_json::<_, QueryRequest>(req).await {
            Ok(Some(request)) => query(&state, request).await,
            Ok(None) => Err(Error::InvalidArgument("request body is required".to_string())),
            Err(err) => Err(err),
        },
        (&Method::GET, p) if p.starts_with("/api/status/") => {
            let job_id = p.trim_start_matches("/api/status/");
            job_status(&state, job_id).await
        }
        (&Method::DELETE, "/admin/clear-all") => clear_all(&state).await,
        (&Method::GET, "/health") => Ok(health(&state).await),
        (&Method::GET, "/metrics") => Ok(metrics_response()),
        _ => Ok(json_response(
            StatusCode::NOT_FOUND,
            &json!({ "detail": "Not found" }),
        )),
    };

    result.unwrap_or_else(|err| error_response(&err))
}

async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route(state, req).await)
}

/// Accept connections until the listener fails.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Graph RAG API listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(state.clone(), req));
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Connection error: {}", err);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphrag::JobStatus;
    use crate::store::{Collection, MemoryStore};
    use crate::test_support::{self, EchoBackend};
    use std::fs;
    use tempfile::tempdir;

    fn state(store: Arc<MemoryStore>) -> Arc<AppState> {
        let controller = test_support::controller(store, Arc::new(EchoBackend::default()));
        let jobs = Arc::new(JobRegistry::new(controller));
        Arc::new(AppState::new(jobs, "missing_docs"))
    }

    fn request(method: Method, uri: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response<Full<Bytes>>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn index_returns_job_id_and_status_tracks_it() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "Alice works at Acme.").unwrap();
        let state = state(Arc::new(MemoryStore::new()));

        let body = json!({ "documents_folder": dir.path().to_string_lossy() }).to_string();
        let response = route(state.clone(), request(Method::POST, "/api/index", &body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "started");
        let job_id = json["job_id"].as_str().unwrap().to_string();

        let record = state.jobs.wait(&job_id).await.unwrap();
        assert_eq!(record.status, JobStatus::Completed);

        let response = route(
            state.clone(),
            request(Method::GET, &format!("/api/status/{}", job_id), ""),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "completed");
        assert_eq!(json["documents_processed"], 1);
    }

    #[tokio::test]
    async fn unknown_job_is_404() {
        let state = state(Arc::new(MemoryStore::new()));
        let response = route(state, request(Method::GET, "/api/status/nope", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn query_requires_a_body_and_a_query() {
        let state = state(Arc::new(MemoryStore::new()));

        let response = route(state.clone(), request(Method::POST, "/api/query", "")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = route(
            state,
            request(Method::POST, "/api/query", r#"{"query": "  "}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let state = state(Arc::new(MemoryStore::new()));
        let response = route(state, request(Method::POST, "/api/index", "{not json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn clear_all_empties_the_store() {
        let store = Arc::new(MemoryStore::new());
        store
            .put(Collection::QueryAnswer, "k", "\"a\"".into())
            .await
            .unwrap();
        let state = state(store.clone());

        let response = route(state, request(Method::DELETE, "/admin/clear-all", "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn health_reports_store_backend() {
        let state = state(Arc::new(MemoryStore::new()));
        let response = route(state, request(Method::GET, "/health", "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["store"], "memory");
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_text() {
        let state = state(Arc::new(MemoryStore::new()));
        let response = route(state, request(Method::GET, "/metrics", "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let state = state(Arc::new(MemoryStore::new()));
        let response = route(state, request(Method::GET, "/nowhere", "")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
