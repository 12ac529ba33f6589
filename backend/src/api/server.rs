//! HTTP server for the campusload API.
//!
//! # API Endpoints
//!
//! | Method | Path                                   | Description                     |
//! |--------|----------------------------------------|---------------------------------|
//! | GET    | `/health`                              | Health check                    |
//! | GET    | `/api/logs`                            | SSE stream of pipeline logs     |
//! | POST   | `/api/establishments/import`           | Upload establishments (multipart `file`) |
//! | POST   | `/api/establishments/export`           | Export establishments (JSON body) |
//! | GET    | `/api/establishments/import/template`  | CSV import template             |
//! | POST   | `/api/programs/import`                 | Upload programs (multipart `file`) |
//! | GET    | `/api/programs/export`                 | Export programs (query string)  |
//! | GET    | `/api/programs/import/template`        | CSV import template             |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{bad_request, export_error, import_error, ApiError, ExportQuery, ExportRequest, ImportResponse};
use crate::codec::SpreadsheetKind;
use crate::config::ServerConfig;
use crate::error::{ExportError, ImportError};
use crate::export::{self, ExportArtifact};
use crate::import::import_bytes;
use crate::models::{EntityKind, ExportFormat};
use crate::store::Store;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: Store, config: ServerConfig) -> Self {
        Self { store, config: Arc::new(config) }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/logs", get(sse_logs))
        .route("/api/establishments/import", post(import_establishments))
        .route("/api/establishments/export", post(export_establishments))
        .route("/api/establishments/import/template", get(establishment_template))
        .route("/api/programs/import", post(import_programs))
        .route("/api/programs/export", get(export_programs))
        .route("/api/programs/import/template", get(program_template))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Connect the store and serve until the process stops.
pub async fn start_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::connect(&config.database_url).await?;
    let port = config.port;
    let app = router(AppState::new(store, config));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Campusload server running on http://localhost:{}", port);
    println!("   POST /api/establishments/import  - Upload establishments");
    println!("   POST /api/establishments/export  - Export establishments");
    println!("   POST /api/programs/import        - Upload programs");
    println!("   GET  /api/programs/export        - Export programs");
    println!("   GET  /api/logs                   - SSE log stream");
    println!("   GET  /health                     - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "campusload",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers drop entries rather than the connection.
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

// =============================================================================
// Import
// =============================================================================

struct Upload {
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Take the `file` part, or failing that the first part carrying a file name.
async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {}", e)))?
    {
        let is_file = field.name() == Some("file");
        if !is_file && (upload.is_some() || field.file_name().is_none()) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Read error: {}", e)))?
            .to_vec();
        upload = Some(Upload { file_name, content_type, bytes });
        if is_file {
            break;
        }
    }

    upload.ok_or_else(|| import_error(ImportError::NoFile))
}

async fn import_upload(
    state: &AppState,
    kind: EntityKind,
    mut multipart: Multipart,
) -> Result<Json<ImportResponse>, ApiError> {
    let upload = read_upload(&mut multipart).await?;
    let file_name = upload.file_name.as_deref().unwrap_or("unknown");

    let format = SpreadsheetKind::detect(upload.content_type.as_deref(), upload.file_name.as_deref())
        .ok_or_else(|| import_error(ImportError::UnsupportedFileType(file_name.to_string())))?;

    let import_id = Uuid::new_v4();
    println!("\n{}", "=".repeat(70));
    log_info(format!("📄 NEW IMPORT {} [{}]: {} ({} bytes)", kind, import_id, file_name, upload.bytes.len()));
    println!("{}\n", "=".repeat(70));

    let summary = import_bytes(&state.store, kind, &upload.bytes, format)
        .await
        .map_err(import_error)?;

    Ok(Json(ImportResponse::new(import_id, summary)))
}

async fn import_establishments(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ImportResponse>, ApiError> {
    import_upload(&state, EntityKind::Establishment, multipart).await
}

async fn import_programs(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ImportResponse>, ApiError> {
    import_upload(&state, EntityKind::Program, multipart).await
}

// =============================================================================
// Export
// =============================================================================

fn download(artifact: ExportArtifact) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", artifact.filename);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response()
}

fn parse_format(requested: Option<&str>, kind: EntityKind) -> Result<ExportFormat, ApiError> {
    match requested.map(str::trim).filter(|f| !f.is_empty()) {
        None => Ok(kind.profile().default_export_format),
        Some(raw) => raw
            .parse()
            .map_err(|other: String| export_error(ExportError::UnknownFormat(other))),
    }
}

async fn export_establishments(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    let kind = EntityKind::Establishment;
    let format = parse_format(request.format.as_deref(), kind)?;
    let artifact = export::export(&state.store, kind, &request.spec(), format)
        .await
        .map_err(export_error)?;
    Ok(download(artifact))
}

async fn export_programs(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let kind = EntityKind::Program;
    let format = parse_format(query.format.as_deref(), kind)?;
    let artifact = export::export(&state.store, kind, &query.spec(kind.profile()), format)
        .await
        .map_err(export_error)?;
    Ok(download(artifact))
}

async fn establishment_template() -> Result<Response, ApiError> {
    export::template(EntityKind::Establishment).map(download).map_err(export_error)
}

async fn program_template() -> Result<Response, ApiError> {
    export::template(EntityKind::Program).map(download).map_err(export_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::codec::{encode_xlsx, CellValue, ColumnSpec};
    use crate::models::XLSX_CONTENT_TYPE;

    const BOUNDARY: &str = "campusload-test-boundary";

    async fn app() -> (Router, Store) {
        let store = Store::in_memory().await.unwrap();
        let app = router(AppState::new(store.clone(), ServerConfig::default()));
        (app, store)
    }

    fn upload(uri: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn workbook(rows: &[&[&str]]) -> Vec<u8> {
        let columns: Vec<ColumnSpec> = rows[0].iter().map(|h| ColumnSpec::new(*h, *h, 20.0)).collect();
        let data: Vec<Vec<CellValue>> = rows[1..]
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| if v.is_empty() { CellValue::Empty } else { CellValue::Text(v.to_string()) })
                    .collect()
            })
            .collect();
        encode_xlsx("Feuil1", &columns, &data).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app().await;
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_blank_name_rejects_whole_establishment_file() {
        let (app, store) = app().await;
        store.create_university("Université de Lille").await.unwrap();

        let bytes = workbook(&[
            &["Nom", "Code", "Nom Université"],
            &["IUT A", "A", "Université de Lille"],
            &["", "B", "Université de Lille"],
            &["IUT C", "C", "Université de Lille"],
        ]);
        let request = upload("/api/establishments/import", "etabs.xlsx", XLSX_CONTENT_TYPE, &bytes);
        let (status, body) = send_json(&app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        let errors = body["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].as_str().unwrap().contains("Row 2"));
        assert_eq!(store.count(EntityKind::Establishment).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_university_rejects_only_its_row() {
        let (app, store) = app().await;
        store.create_university("Université de Lille").await.unwrap();

        let bytes = workbook(&[
            &["Nom", "Nom Université"],
            &["IUT Fantôme", "Université Inconnue"],
            &["IUT Nord", "Université de Lille"],
        ]);
        let request = upload("/api/establishments/import", "etabs.xlsx", XLSX_CONTENT_TYPE, &bytes);
        let (status, body) = send_json(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["totalRows"], 2);
        assert_eq!(body["imported"], 1);
        assert_eq!(body["skipped"], 0);
        let error = body["errors"][0].as_str().unwrap();
        assert!(error.contains("Row 1"));
        assert!(error.contains("not found"));
        assert_eq!(store.count(EntityKind::Establishment).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_export_then_reimport_skips_everything() {
        let (app, store) = app().await;
        let u = store.create_university("Université de Lille").await.unwrap();
        store.create_establishment("IUT Nord", u).await.unwrap();
        store.create_establishment("École Sud", u).await.unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/api/establishments/export")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"fields":["nom","code","university_id"],"filters":{}}"#))
            .unwrap();
        let (status, exported) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let request = upload("/api/establishments/import", "export.xlsx", XLSX_CONTENT_TYPE, &exported);
        let (status, body) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["imported"], 0);
        assert_eq!(body["skipped"], 2);
        assert_eq!(store.count(EntityKind::Establishment).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_program_reimport_updates() {
        let (app, store) = app().await;
        let u = store.create_university("Université de Lille").await.unwrap();
        store.create_establishment("IUT Nord", u).await.unwrap();

        let csv = "Nom;Code;Établissement\nLicence Info;LINF;IUT Nord\nMaster Info;MINF;IUT Nord\n";
        let request = upload("/api/programs/import", "filieres.csv", "text/csv", csv.as_bytes());
        let (_, first) = send_json(&app, request).await;
        assert_eq!(first["imported"], 2);

        let request = upload("/api/programs/import", "filieres.csv", "text/csv", csv.as_bytes());
        let (status, second) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["imported"], 0);
        assert_eq!(second["updated"], 2);
        assert_eq!(store.count(EntityKind::Program).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_filled_template_imports() {
        let (app, store) = app().await;
        store.create_university("Université Exemple").await.unwrap();

        let request = Request::builder()
            .uri("/api/establishments/import/template")
            .body(Body::empty())
            .unwrap();
        let (status, template) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let request = upload("/api/establishments/import", "modele.csv", "text/csv", &template);
        let (status, body) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["imported"], 1);
    }

    #[tokio::test]
    async fn test_structural_failures_are_bad_requests() {
        let (app, _) = app().await;

        let request = upload("/api/programs/import", "logo.png", "image/png", b"\x89PNG");
        let (status, body) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Unsupported file type"));

        let request = upload("/api/programs/import", "broken.xlsx", XLSX_CONTENT_TYPE, b"not a zip");
        let (status, _) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = upload("/api/programs/import", "empty.csv", "text/csv", b"Nom,Code,Etablissement\n");
        let (status, body) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "The file contains no data rows");

        let request = upload("/api/programs/import", "f.csv", "text/csv", b"Nom,Etablissement\nA,B\n");
        let (status, body) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required column \"Code\"");
    }

    #[tokio::test]
    async fn test_program_export_csv() {
        let (app, store) = app().await;
        let u = store.create_university("Université de Lille").await.unwrap();
        store.create_establishment("IUT Nord", u).await.unwrap();
        let csv = "Nom,Code,Établissement\nLicence Info,LINF,IUT Nord\n";
        send(&app, upload("/api/programs/import", "f.csv", "text/csv", csv.as_bytes())).await;

        let request = Request::builder()
            .uri("/api/programs/export?format=csv&fields=nom,code,unknown")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.starts_with("attachment; filename=\"filieres_export_"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), "Nom,Code\nLicence Info,LINF\n");
    }

    #[tokio::test]
    async fn test_export_rejects_bad_requests() {
        let (app, _) = app().await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/establishments/export")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"fields":["password"]}"#))
            .unwrap();
        let (status, body) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No valid field specified for export");

        let request = Request::builder()
            .uri("/api/programs/export?format=pdf")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
