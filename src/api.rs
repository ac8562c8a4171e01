//! HTTP surface for the document question-answering service.
//!
//! - `GET /` – Liveness probe.
//! - `POST /upload` – Multipart upload of one or more `files` parts. Stores, parses and indexes
//!   them, replacing the current index. Returns `{ message, total_chunks }`.
//! - `POST /query` – Answer `{ query, top_k?, history? }` against the current index. Returns
//!   `{ response, sources: [{ file, page, text }] }`.
//! - `GET /metrics` – Ingestion and query counters.
//!
//! Failures are reported as `{ "detail": "..." }` with a status derived from the error.

use crate::metrics::MetricsSnapshot;
use crate::processing::{
    ChatMessage, Citation, IngestError, QueryError, QueryRequest as PipelineQuery, RagApi,
};
use crate::storage::UploadedFile;
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State, multipart::MultipartError, rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

const FILES_FIELD: &str = "files";

/// Build the HTTP router exposing the upload and query surface.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: RagApi + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health))
        .route(
            "/upload",
            post(upload_documents::<S>).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/query", post(query_documents::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service)
        .layer(cors)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "Active",
        "message": "RAG Backend is running",
    }))
}

/// Success response for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    message: String,
    /// Fragments recovered across the batch, before node splitting.
    total_chunks: usize,
}

/// Store, parse and index every `files` part of the request.
///
/// Parts under other field names are ignored. A part without a filename is stored under a
/// generated one.
async fn upload_documents<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: RagApi,
{
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILES_FIELD) {
            tracing::debug!(field = ?field.name(), "Ignoring non-file multipart field");
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("file_{}.bin", Uuid::new_v4()));
        let bytes = field.bytes().await?;
        tracing::debug!(file = %file_name, bytes = bytes.len(), "Received upload");
        files.push(UploadedFile {
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    let outcome = service.ingest(files).await?;
    tracing::info!(
        processed = outcome.processed_count,
        failed = outcome.failed_count,
        total_chunks = outcome.total_chunks,
        "Upload request completed"
    );
    Ok(Json(UploadResponse {
        message: format!("Successfully processed {} files.", outcome.processed_count),
        total_chunks: outcome.total_chunks,
    }))
}

/// Request body for `POST /query`.
#[derive(Deserialize)]
struct QueryBody {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    /// Prior turns, oldest first. Enables follow-up questions.
    #[serde(default)]
    history: Vec<ChatMessage>,
}

/// Success response for `POST /query`.
#[derive(Serialize)]
struct QueryResponse {
    response: String,
    sources: Vec<Citation>,
}

/// Malformed bodies are reported through the same `{detail}` envelope as pipeline errors.
async fn query_documents<S>(
    State(service): State<Arc<S>>,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: RagApi,
{
    let Json(body) = body?;
    let QueryBody {
        query,
        top_k,
        history,
    } = body;
    let result = service
        .query(PipelineQuery {
            question: query,
            top_k,
            history,
        })
        .await?;
    Ok(Json(QueryResponse {
        response: result.answer,
        sources: result.sources,
    }))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: RagApi,
{
    Json(service.metrics_snapshot())
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("Failed to read upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Invalid request body: {}", .0.body_text())]
    InvalidBody(#[from] JsonRejection),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Ingest(IngestError::NoFiles) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Query(QueryError::IndexNotBuilt) => StatusCode::BAD_REQUEST,
            Self::Multipart(inner) => inner.status(),
            Self::InvalidBody(inner) => inner.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::index::IndexError;
    use crate::metrics::MetricsSnapshot;
    use crate::parser::FragmentMetadata;
    use crate::processing::{
        Citation, IngestError, IngestOutcome, QueryError, QueryRequest, QueryResult, RagApi,
    };
    use crate::storage::UploadedFile;
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docqa-test-boundary";

    #[derive(Default)]
    struct StubRagService {
        indexed: bool,
        empty_corpus: bool,
        uploads: Mutex<Vec<UploadedFile>>,
        queries: Mutex<Vec<QueryRequest>>,
    }

    #[async_trait]
    impl RagApi for StubRagService {
        async fn ingest(&self, files: Vec<UploadedFile>) -> Result<IngestOutcome, IngestError> {
            if files.is_empty() {
                return Err(IngestError::NoFiles);
            }
            if self.empty_corpus {
                return Err(IndexError::EmptyCorpus.into());
            }
            let processed_count = files.len();
            self.uploads.lock().await.extend(files);
            Ok(IngestOutcome {
                processed_count,
                total_chunks: 3,
                failed_count: 0,
            })
        }

        async fn query(&self, request: QueryRequest) -> Result<QueryResult, QueryError> {
            if !self.indexed {
                return Err(QueryError::IndexNotBuilt);
            }
            self.queries.lock().await.push(request);
            let metadata = FragmentMetadata {
                file_name: Some("report.pdf".into()),
                page_label: Some("2".into()),
                file_path: None,
            };
            Ok(QueryResult {
                answer: "Revenue grew 12%.".into(),
                sources: vec![Citation::from_node("Revenue grew 12% year over year.", &metadata)],
            })
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                files_attempted: 4,
                parse_failures: 1,
                ..MetricsSnapshot::default()
            }
        }
    }

    fn app(service: Arc<StubRagService>) -> Router {
        create_router(service, 1024 * 1024)
    }

    fn multipart_request(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (field, file_name, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match file_name {
                Some(name) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\n\
Content-Type: application/octet-stream\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{field}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    fn json_request(uri: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn root_reports_active() {
        let response = app(Arc::default())
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "Active");
        assert_eq!(json["message"], "RAG Backend is running");
    }

    #[tokio::test]
    async fn upload_collects_file_parts_only() {
        let service = Arc::new(StubRagService::default());
        let response = app(service.clone())
            .oneshot(multipart_request(&[
                ("files", Some("report.pdf"), "%PDF-1.4 body"),
                ("note", None, "ignored"),
                ("files", Some("notes.txt"), "plain notes"),
            ]))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["message"], "Successfully processed 2 files.");
        assert_eq!(json["total_chunks"], 3);

        let uploads = service.uploads.lock().await;
        let names: Vec<_> = uploads.iter().map(|file| file.file_name.as_str()).collect();
        assert_eq!(names, vec!["report.pdf", "notes.txt"]);
        assert_eq!(uploads[1].bytes, b"plain notes");
    }

    #[tokio::test]
    async fn unnamed_file_part_gets_generated_name() {
        let service = Arc::new(StubRagService::default());
        let response = app(service.clone())
            .oneshot(multipart_request(&[("files", None, "raw bytes")]))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let uploads = service.uploads.lock().await;
        let pattern = regex::Regex::new(r"^file_[0-9a-f-]{36}\.bin$").expect("regex");
        assert!(pattern.is_match(&uploads[0].file_name));
    }

    #[tokio::test]
    async fn upload_without_files_is_unprocessable() {
        let response = app(Arc::default())
            .oneshot(multipart_request(&[("note", None, "no files here")]))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = json_body(response).await;
        assert!(json["detail"].is_string());
    }

    #[tokio::test]
    async fn empty_corpus_is_a_server_error() {
        let service = Arc::new(StubRagService {
            empty_corpus: true,
            ..StubRagService::default()
        });
        let response = app(service)
            .oneshot(multipart_request(&[("files", Some("scan.pdf"), "x")]))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert!(
            json["detail"]
                .as_str()
                .expect("detail")
                .contains("empty corpus")
        );
    }

    #[tokio::test]
    async fn query_before_upload_is_bad_request() {
        let response = app(Arc::default())
            .oneshot(json_request("/query", json!({ "query": "What is revenue?" })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["detail"], "Index not built. Upload documents first.");
    }

    #[tokio::test]
    async fn query_returns_answer_and_sources() {
        let service = Arc::new(StubRagService {
            indexed: true,
            ..StubRagService::default()
        });
        let response = app(service.clone())
            .oneshot(json_request(
                "/query",
                json!({
                    "query": "And last year?",
                    "top_k": 4,
                    "history": [{ "role": "user", "content": "How did revenue change?" }]
                }),
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["response"], "Revenue grew 12%.");
        assert_eq!(json["sources"][0]["file"], "report.pdf");
        assert_eq!(json["sources"][0]["page"], "2");
        assert_eq!(
            json["sources"][0]["text"],
            "Revenue grew 12% year over year...."
        );

        let queries = service.queries.lock().await;
        assert_eq!(queries[0].question, "And last year?");
        assert_eq!(queries[0].top_k, Some(4));
        assert_eq!(queries[0].history.len(), 1);
    }

    #[tokio::test]
    async fn malformed_query_body_uses_detail_envelope() {
        for payload in [json!({ "top_k": 3 }), json!({ "query": "Revenue?", "top_k": -1 })] {
            let service = Arc::new(StubRagService {
                indexed: true,
                ..StubRagService::default()
            });
            let response = app(service.clone())
                .oneshot(json_request("/query", payload))
                .await
                .expect("router response");

            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
            let json = json_body(response).await;
            assert!(
                json["detail"]
                    .as_str()
                    .expect("detail")
                    .starts_with("Invalid request body")
            );
            assert!(service.queries.lock().await.is_empty());
        }
    }

    #[tokio::test]
    async fn query_without_json_content_type_is_rejected_with_detail() {
        let response = app(Arc::default())
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/query")
                    .body(Body::from(r#"{"query":"Revenue?"}"#))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let json = json_body(response).await;
        assert!(json["detail"].is_string());
    }

    #[tokio::test]
    async fn metrics_route_serializes_snapshot() {
        let response = app(Arc::default())
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["files_attempted"], 4);
        assert_eq!(json["parse_failures"], 1);
        assert_eq!(json["queries_answered"], 0);
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let response = app(Arc::default())
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/query")
                    .header("origin", "http://localhost:3000")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|value| value.to_str().ok()),
            Some("*")
        );
    }
}
