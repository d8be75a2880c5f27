use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use stampa::application::{
    AdmissionScheduler, ConvertEngine, EngineJob, RenderOrchestrator, WorkspaceStore,
};
use stampa::domain::RenderFailure;
use stampa::infra::http::{AppState, build_router};

const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";
const BODY_LIMIT: usize = 15 * 1024 * 1024;

/// Writes a fixed payload to the job output, simulating a healthy engine.
struct FixedEngine {
    payload: &'static [u8],
}

#[async_trait]
impl ConvertEngine for FixedEngine {
    async fn convert(&self, job: &EngineJob) -> Result<(), RenderFailure> {
        tokio::fs::write(&job.output, self.payload)
            .await
            .map_err(RenderFailure::from)
    }
}

/// Echoes the staged template back, exposing any cross-request mixup.
struct EchoEngine;

#[async_trait]
impl ConvertEngine for EchoEngine {
    async fn convert(&self, job: &EngineJob) -> Result<(), RenderFailure> {
        let template = tokio::fs::read(&job.input).await?;
        tokio::fs::write(&job.output, template).await?;
        Ok(())
    }
}

/// Echoes the staged data payload back.
struct DataEchoEngine;

#[async_trait]
impl ConvertEngine for DataEchoEngine {
    async fn convert(&self, job: &EngineJob) -> Result<(), RenderFailure> {
        let data = tokio::fs::read(&job.data).await?;
        tokio::fs::write(&job.output, data).await?;
        Ok(())
    }
}

struct FailingEngine;

#[async_trait]
impl ConvertEngine for FailingEngine {
    async fn convert(&self, _job: &EngineJob) -> Result<(), RenderFailure> {
        Err(RenderFailure::render("template could not be parsed"))
    }
}

/// Sleeps before producing output, tracking peak concurrency.
struct SlowEngine {
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowEngine {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ConvertEngine for SlowEngine {
    async fn convert(&self, job: &EngineJob) -> Result<(), RenderFailure> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        tokio::fs::write(&job.output, b"slow-output")
            .await
            .map_err(RenderFailure::from)
    }
}

struct TestService {
    router: Router,
    workspace_root: std::path::PathBuf,
    _guard: TempDir,
}

fn service_with(
    engine: Arc<dyn ConvertEngine>,
    concurrency: usize,
    queue_capacity: usize,
    deadline: Duration,
) -> TestService {
    let guard = TempDir::new().expect("temp dir");
    let workspace_root = guard.path().join("work");
    let workspaces = WorkspaceStore::new(workspace_root.clone()).expect("store");
    let scheduler = Arc::new(AdmissionScheduler::new(
        engine,
        NonZeroUsize::new(concurrency).unwrap(),
        queue_capacity,
    ));
    let orchestrator = Arc::new(RenderOrchestrator::new(workspaces, scheduler, deadline));
    let router = build_router(AppState { orchestrator }, BODY_LIMIT);
    TestService {
        router,
        workspace_root,
        _guard: guard,
    }
}

fn service(engine: Arc<dyn ConvertEngine>) -> TestService {
    service_with(engine, 2, 8, Duration::from_secs(5))
}

fn workspace_entries(root: &Path) -> usize {
    std::fs::read_dir(root)
        .map(|entries| entries.count())
        .unwrap_or(0)
}

fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, content) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/render")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .expect("request")
}

fn base64_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/render-base64")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_reports_ok() {
    let service = service(Arc::new(FixedEngine { payload: b"x" }));
    let response = service
        .router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn multipart_render_returns_attachment() {
    let service = service(Arc::new(FixedEngine {
        payload: b"%PDF-1.7 fake",
    }));
    let response = service
        .router
        .clone()
        .oneshot(multipart_request(&[
            ("template", Some("invoice.odt"), b"template-bytes"),
            ("data", None, br#"{"name":"Ada"}"#),
            ("format", None, b"pdf"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"invoice.pdf\""
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), b"%PDF-1.7 fake");
    assert_eq!(workspace_entries(&service.workspace_root), 0);
}

#[tokio::test]
async fn multipart_name_field_controls_the_download_filename() {
    let service = service(Arc::new(FixedEngine { payload: b"out" }));
    let response = service
        .router
        .oneshot(multipart_request(&[
            ("template", Some("upload.docx"), b"template-bytes"),
            ("name", None, b"Quarterly Report"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"Quarterly Report.pdf\""
    );
}

#[tokio::test]
async fn missing_template_is_rejected_without_creating_a_workspace() {
    let service = service(Arc::new(FixedEngine { payload: b"x" }));
    let response = service
        .router
        .clone()
        .oneshot(multipart_request(&[("data", None, b"{}")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["message"], json!("template file is required"));
    assert_eq!(workspace_entries(&service.workspace_root), 0);
}

#[tokio::test]
async fn invalid_data_json_is_a_bad_request() {
    let service = service(Arc::new(FixedEngine { payload: b"x" }));
    let response = service
        .router
        .clone()
        .oneshot(multipart_request(&[
            ("template", Some("t.odt"), b"bytes"),
            ("data", None, b"{not json"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(workspace_entries(&service.workspace_root), 0);
}

#[tokio::test]
async fn base64_round_trip_reproduces_engine_output() {
    let service = service(Arc::new(FixedEngine {
        payload: b"%PDF-1.7 round-trip",
    }));
    let response = service
        .router
        .clone()
        .oneshot(base64_request(json!({
            "templateBase64": BASE64.encode(b"template-bytes"),
            "data": { "name": "Ada" },
            "format": "pdf",
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], json!(true));
    let decoded = BASE64
        .decode(body["data"].as_str().expect("base64 data"))
        .expect("valid base64");
    assert_eq!(decoded, b"%PDF-1.7 round-trip");
    assert_eq!(workspace_entries(&service.workspace_root), 0);
}

#[tokio::test]
async fn base64_request_data_reaches_the_engine() {
    let service = service(Arc::new(DataEchoEngine));
    let response = service
        .router
        .oneshot(base64_request(json!({
            "templateBase64": BASE64.encode(b"template"),
            "data": { "name": "Ada" },
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let decoded = BASE64.decode(body["data"].as_str().unwrap()).unwrap();
    let staged: Value = serde_json::from_slice(&decoded).expect("staged data json");
    assert_eq!(staged, json!({ "name": "Ada" }));
}

#[tokio::test]
async fn missing_template_base64_is_a_bad_request() {
    let service = service(Arc::new(FixedEngine { payload: b"x" }));
    let response = service
        .router
        .clone()
        .oneshot(base64_request(json!({ "templateBase64": "" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(workspace_entries(&service.workspace_root), 0);
}

#[tokio::test]
async fn absent_template_base64_field_keeps_the_failure_shape() {
    let service = service(Arc::new(FixedEngine { payload: b"x" }));
    let response = service
        .router
        .clone()
        .oneshot(base64_request(json!({ "data": {} })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["message"], json!("templateBase64 is required"));
    assert_eq!(workspace_entries(&service.workspace_root), 0);
}

#[tokio::test]
async fn malformed_json_body_keeps_the_failure_shape() {
    let service = service(Arc::new(FixedEngine { payload: b"x" }));
    let response = service
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/render-base64")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .expect("request"),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["message"], json!("invalid JSON payload"));
}

#[tokio::test]
async fn invalid_base64_is_a_bad_request() {
    let service = service(Arc::new(FixedEngine { payload: b"x" }));
    let response = service
        .router
        .oneshot(base64_request(
            json!({ "templateBase64": "not--valid--base64!!!" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn render_failure_maps_to_500_and_cleans_up() {
    let service = service(Arc::new(FailingEngine));
    let response = service
        .router
        .clone()
        .oneshot(multipart_request(&[(
            "template",
            Some("broken.odt"),
            b"bytes",
        )]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("render_error"));
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("template could not be parsed")
    );
    assert_eq!(workspace_entries(&service.workspace_root), 0);
}

#[tokio::test]
async fn deadline_expiry_maps_to_timeout_and_cleans_up() {
    let engine = Arc::new(SlowEngine::new(Duration::from_millis(500)));
    let service = service_with(engine, 1, 8, Duration::from_millis(50));
    let response = service
        .router
        .clone()
        .oneshot(multipart_request(&[(
            "template",
            Some("slow.odt"),
            b"bytes",
        )]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response_json(response).await;
    assert_eq!(body["error"], json!("timeout"));
    assert_eq!(workspace_entries(&service.workspace_root), 0);
}

#[tokio::test]
async fn overload_sheds_excess_requests_and_bounds_engine_concurrency() {
    let engine = Arc::new(SlowEngine::new(Duration::from_millis(200)));
    let service = service_with(engine.clone(), 2, 2, Duration::from_secs(5));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let router = service.router.clone();
        handles.push(tokio::spawn(async move {
            let response = router
                .oneshot(multipart_request(&[(
                    "template",
                    Some("load.odt"),
                    b"bytes",
                )]))
                .await
                .unwrap();
            let status = response.status();
            (status, response_json(response).await)
        }));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut overloaded = 0;
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            assert_eq!(body["success"], json!(false));
            if body["error"] == json!("overloaded") {
                overloaded += 1;
            }
        }
    }

    assert!(overloaded >= 1, "expected at least one shed request");
    assert!(
        engine.peak.load(Ordering::SeqCst) <= 2,
        "engine concurrency exceeded the configured limit"
    );
    assert_eq!(workspace_entries(&service.workspace_root), 0);
}

#[tokio::test]
async fn concurrent_identical_filenames_do_not_cross_requests() {
    let service = service(Arc::new(EchoEngine));

    let mut handles = Vec::new();
    for index in 0..8usize {
        let router = service.router.clone();
        handles.push(tokio::spawn(async move {
            let payload = format!("payload-{index}");
            let response = router
                .oneshot(multipart_request(&[(
                    "template",
                    Some("invoice.odt"),
                    payload.as_bytes(),
                )]))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(bytes.as_ref(), payload.as_bytes());
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(workspace_entries(&service.workspace_root), 0);
}
