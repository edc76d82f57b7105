//! Invoice Extractor - prompt-selected invoice extraction server backed by Gemini.

mod config;
mod document;
mod error;
mod fetch;
mod gemini;
mod normalize;
mod pipeline;
mod prompts;
mod staging;
mod validation;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use config::AppConfig;
use document::Document;
use error::ExtractError;
use fetch::UrlFetcher;
use gemini::GeminiClient;
use pipeline::InvoicePipeline;
use prompts::PromptCatalog;
use serde_json::Value;
use staging::Stager;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: InvoicePipeline,
    fetcher: UrlFetcher,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "invoice_extractor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let catalog = PromptCatalog::new(&config.prompts_dir);
    let available = catalog.available();
    if available.is_empty() {
        warn!("No invoice prompts found in {:?}", catalog.dir());
    } else {
        info!("Loaded {} invoice prompts: {:?}", available.len(), available);
    }

    let model = GeminiClient::new(&config.model)?;
    info!(
        "Gemini client initialized: model={} upload_mode={:?}",
        config.model.model, config.model.upload_mode
    );

    let state = AppState {
        pipeline: InvoicePipeline::new(catalog, Stager::new(&config.upload_dir), Arc::new(model)),
        fetcher: UrlFetcher::new(FETCH_TIMEOUT, config.max_upload_bytes)?,
    };

    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/invoice_types", get(list_invoice_types))
        .route("/process_invoice", post(process_invoice))
        .route("/upload_invoice", post(upload_invoice))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn root() -> Json<Value> {
    Json(serde_json::json!({ "message": "Hello World" }))
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Invoice types whose prompts are currently available.
async fn list_invoice_types(State(state): State<AppState>) -> Json<Vec<&'static str>> {
    Json(
        state
            .pipeline
            .catalog()
            .available()
            .into_iter()
            .map(|t| t.label())
            .collect(),
    )
}

#[derive(serde::Deserialize)]
struct InvoiceRequest {
    image_url: String,
    invoice_type: String,
}

/// Fetch a document by URL and extract it.
async fn process_invoice(
    State(state): State<AppState>,
    Json(request): Json<InvoiceRequest>,
) -> Result<Json<Value>, ExtractError> {
    let document = state.fetcher.fetch(&request.image_url).await?;

    let value = state
        .pipeline
        .process(document, Some(&request.invoice_type))
        .await?;

    Ok(Json(value))
}

/// Extract an uploaded document. `invoice_type` is optional.
async fn upload_invoice(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ExtractError> {
    let mut document = None;
    let mut invoice_type = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ExtractError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ExtractError::BadRequest("Uploaded file has no content type".to_string())
                    })?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ExtractError::BadRequest(format!("Failed to read file: {}", e)))?;
                document = Some(Document::new(data.to_vec(), content_type, filename));
            }
            Some("invoice_type") => {
                let label = field
                    .text()
                    .await
                    .map_err(|e| ExtractError::BadRequest(format!("Multipart error: {}", e)))?;
                invoice_type = Some(label);
            }
            _ => {}
        }
    }

    let document = document
        .filter(|d| !d.data.is_empty())
        .ok_or_else(|| ExtractError::BadRequest("No file uploaded".to_string()))?;

    info!(
        "Received upload: {} ({} bytes) invoice_type={:?}",
        document.display_name(),
        document.data.len(),
        invoice_type
    );

    let value = state
        .pipeline
        .process(document, invoice_type.as_deref())
        .await?;

    Ok(Json(value))
}

/// Turn a handler panic into a 500 with the panic message.
fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    };

    ExtractError::Internal(detail).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{fixture, staged_count, FakeModel, Fixture};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    const BOUNDARY: &str = "INVOICE-BOUNDARY";

    fn app(fx: &Fixture) -> Router {
        let state = AppState {
            pipeline: fx.pipeline.clone(),
            fetcher: UrlFetcher::new(Duration::from_secs(5), 1024 * 1024).unwrap(),
        };
        router(state, 1024 * 1024)
    }

    fn multipart_body(file: Option<(&str, &str, &[u8])>, invoice_type: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some((filename, content_type, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        if let Some(label) = invoice_type {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"invoice_type\"\r\n\r\n{label}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload_invoice")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_upload_pdf_returns_parsed_object() {
        let fx = fixture(FakeModel::replying(
            "```json\n{\"invoice_number\": \"123\", \"grand_total\": 115.0}\n```",
        ));

        let body = multipart_body(
            Some(("invoice.pdf", "application/pdf", b"%PDF-1.7 body".as_slice())),
            Some("Almarai"),
        );
        let response = app(&fx).oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"invoice_number": "123", "grand_total": 115.0})
        );

        let calls = fx.model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt, "Almarai instructions");
        assert_eq!(calls[0].staged_bytes, b"%PDF-1.7 body");
        assert_eq!(staged_count(fx.uploads.path()), 0);
    }

    #[tokio::test]
    async fn test_upload_invoice_type_before_file() {
        let fx = fixture(FakeModel::replying("{\"ok\": 1}"));

        let mut body = Vec::new();
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"invoice_type\"\r\n\r\nsadafco\r\n").as_bytes(),
        );
        body.extend_from_slice(&multipart_body(Some(("a.png", "image/png", b"png".as_slice())), None));

        let response = app(&fx).oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(fx.model.calls()[0].prompt, "Sadafco instructions");
    }

    #[tokio::test]
    async fn test_upload_unknown_type_is_400() {
        let fx = fixture(FakeModel::replying("{}"));

        let body = multipart_body(Some(("a.pdf", "application/pdf", b"x".as_slice())), Some("Unknown"));
        let response = app(&fx).oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let detail = json_body(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.contains("Invalid invoice type"));
        assert!(fx.model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upload_empty_or_padded_type_is_400() {
        for label in ["", "  Almarai  "] {
            let fx = fixture(FakeModel::replying("{}"));

            let body = multipart_body(Some(("a.pdf", "application/pdf", b"x".as_slice())), Some(label));
            let response = app(&fx).oneshot(upload_request(body)).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "label {:?}", label);
            let detail = json_body(response).await["detail"].as_str().unwrap().to_string();
            assert!(detail.contains("Invalid invoice type"), "label {:?}: {}", label, detail);
            assert!(fx.model.calls().is_empty());
            assert_eq!(staged_count(fx.uploads.path()), 0);
        }
    }

    #[tokio::test]
    async fn test_upload_disallowed_type_is_400() {
        let fx = fixture(FakeModel::replying("{}"));

        let body = multipart_body(Some(("a.exe", "application/x-msdownload", b"MZ".as_slice())), Some("Almarai"));
        let response = app(&fx).oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(staged_count(fx.uploads.path()), 0);
    }

    #[tokio::test]
    async fn test_upload_without_file_is_400() {
        let fx = fixture(FakeModel::replying("{}"));

        let response = app(&fx)
            .oneshot(upload_request(multipart_body(None, Some("Almarai"))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["detail"], "No file uploaded");
    }

    #[tokio::test]
    async fn test_malformed_model_output_is_500() {
        let fx = fixture(FakeModel::replying("Sorry, I cannot read this invoice."));

        let body = multipart_body(Some(("a.pdf", "application/pdf", b"x".as_slice())), Some("Almarai"));
        let response = app(&fx).oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = json_body(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.starts_with("Failed to parse response as JSON"));
        assert_eq!(staged_count(fx.uploads.path()), 0);
    }

    #[tokio::test]
    async fn test_model_failure_is_500() {
        let fx = fixture(FakeModel::failing());

        let body = multipart_body(Some(("a.pdf", "application/pdf", b"x".as_slice())), Some("Almarai"));
        let response = app(&fx).oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(staged_count(fx.uploads.path()), 0);
    }

    #[tokio::test]
    async fn test_process_invoice_by_url() {
        let fx = fixture(FakeModel::replying("```json\n{\"vendor\": \"Almarai\"}\n```"));

        let source = Router::new().route(
            "/scan.jpg",
            get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], b"\xff\xd8jpeg".to_vec()) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, source).await.unwrap() });

        let request = Request::builder()
            .method("POST")
            .uri("/process_invoice")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({
                    "image_url": format!("http://{}/scan.jpg", addr),
                    "invoice_type": "Almarai"
                })
                .to_string(),
            ))
            .unwrap();

        let response = app(&fx).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({"vendor": "Almarai"}));

        let calls = fx.model.calls();
        assert_eq!(calls[0].staged_bytes, b"\xff\xd8jpeg");
        assert_eq!(calls[0].staged_path.extension().unwrap(), "jpg");
    }

    #[tokio::test]
    async fn test_process_invoice_fetch_failure_is_400() {
        let fx = fixture(FakeModel::replying("{}"));

        let request = Request::builder()
            .method("POST")
            .uri("/process_invoice")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"image_url": "http://127.0.0.1:1/x.png", "invoice_type": "Almarai"}"#,
            ))
            .unwrap();

        let response = app(&fx).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(fx.model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_root_and_invoice_types() {
        let fx = fixture(FakeModel::replying("{}"));

        let response = app(&fx)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await, serde_json::json!({"message": "Hello World"}));

        let response = app(&fx)
            .oneshot(Request::get("/invoice_types").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            json_body(response).await,
            serde_json::json!(["Almarai", "sadafco"])
        );
    }

    #[test]
    fn test_panic_maps_to_500() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
