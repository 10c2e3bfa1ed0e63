// QuadLedger - Web Server
// REST surface consumed by the presentation layer

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use quadledger::{
    db, impact, pipeline, ChainSequencer, ChartOfAccounts, Dashboard, FallbackExtractor,
    FieldExtractor, ImpactEntry, ImpactMetrics, Invoice, LedgerEntry, LedgerError, RuleSet,
    VerifiedTransaction, MAX_UPLOAD_BYTES,
};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    sequencer: Arc<ChainSequencer>,
    extractor: Arc<dyn FieldExtractor>,
    rules: Arc<RuleSet>,
    chart: Arc<ChartOfAccounts>,
}

// ============================================================================
// Response shapes
// ============================================================================

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// Map an engine error onto the REST status taxonomy.
fn api_error(err: LedgerError) -> ApiError {
    let status = match &err {
        LedgerError::Validation { .. } => StatusCode::BAD_REQUEST,
        LedgerError::InvoiceNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::UnclassifiableInvoice { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::BalanceViolation { .. }
        | LedgerError::ChainIntegrity { .. }
        | LedgerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "request failed");
    }
    (
        status,
        Json(ErrorBody {
            detail: err.to_string(),
        }),
    )
}

fn bad_request(message: impl ToString) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            detail: message.to_string(),
        }),
    )
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

/// Ledger entry row with its invoice's supplier folded in for display.
#[derive(Serialize)]
struct LedgerEntryRow {
    #[serde(flatten)]
    entry: LedgerEntry,
    supplier: String,
}

#[derive(Serialize)]
struct LedgerEntriesResponse {
    ledger_entries: Vec<LedgerEntryRow>,
}

#[derive(Serialize)]
struct VerifiedTransactionsResponse {
    verified_transactions: Vec<VerifiedTransaction>,
}

/// Impact row with supplier and invoice amount folded in for display.
#[derive(Serialize)]
struct ImpactRow {
    #[serde(flatten)]
    entry: ImpactEntry,
    supplier: String,
    amount: Decimal,
}

#[derive(Serialize)]
struct ImpactEntriesResponse {
    impact_entries: Vec<ImpactRow>,
}

#[derive(Serialize)]
struct InvoicesResponse {
    invoices: Vec<Invoice>,
}

#[derive(Serialize)]
struct InvoiceResponse {
    invoice: Invoice,
}

#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    invoice: Invoice,
    ledger_entries: Vec<LedgerEntry>,
    verified_transaction: VerifiedTransaction,
}

#[derive(Deserialize)]
struct ImpactSubmission {
    invoice_id: Uuid,
    #[serde(flatten)]
    metrics: ImpactMetrics,
}

#[derive(Serialize)]
struct ImpactSubmissionResponse {
    message: &'static str,
    impact_entry: ImpactEntry,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "QuadLedger API",
    })
}

/// GET /api/dashboard-summary - Aggregated stats
async fn dashboard_summary(State(state): State<AppState>) -> Result<Json<Dashboard>, ApiError> {
    let conn = state.db.lock().unwrap();
    quadledger::summarize(&conn).map(Json).map_err(api_error)
}

/// GET /api/ledger-entries - All double-entry rows
async fn ledger_entries(
    State(state): State<AppState>,
) -> Result<Json<LedgerEntriesResponse>, ApiError> {
    let conn = state.db.lock().unwrap();
    let invoices = db::get_all_invoices(&conn).map_err(api_error)?;
    let entries = db::get_all_ledger_entries(&conn).map_err(api_error)?;

    let supplier_of = |invoice_id: Uuid| {
        invoices
            .iter()
            .find(|i| i.id == invoice_id)
            .map(|i| i.supplier.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    };

    let rows = entries
        .into_iter()
        .map(|entry| LedgerEntryRow {
            supplier: supplier_of(entry.invoice_id),
            entry,
        })
        .collect();

    Ok(Json(LedgerEntriesResponse {
        ledger_entries: rows,
    }))
}

/// GET /api/verified-transactions - The hash chain, in chain order
async fn verified_transactions(
    State(state): State<AppState>,
) -> Result<Json<VerifiedTransactionsResponse>, ApiError> {
    let conn = state.db.lock().unwrap();
    let chain = db::get_chain(&conn).map_err(api_error)?;
    Ok(Json(VerifiedTransactionsResponse {
        verified_transactions: chain,
    }))
}

/// GET /api/impact-entries - ESG rows
async fn impact_entries(
    State(state): State<AppState>,
) -> Result<Json<ImpactEntriesResponse>, ApiError> {
    let conn = state.db.lock().unwrap();
    let invoices = db::get_all_invoices(&conn).map_err(api_error)?;
    let entries = db::get_all_impact_entries(&conn).map_err(api_error)?;

    let rows = entries
        .into_iter()
        .map(|entry| {
            let invoice = invoices.iter().find(|i| i.id == entry.invoice_id);
            ImpactRow {
                supplier: invoice
                    .map(|i| i.supplier.clone())
                    .unwrap_or_else(|| "Unknown".to_string()),
                amount: invoice.map(|i| i.amount).unwrap_or(Decimal::ZERO),
                entry,
            }
        })
        .collect();

    Ok(Json(ImpactEntriesResponse {
        impact_entries: rows,
    }))
}

/// GET /api/invoices - All processed invoices
async fn invoices(State(state): State<AppState>) -> Result<Json<InvoicesResponse>, ApiError> {
    let conn = state.db.lock().unwrap();
    let invoices = db::get_all_invoices(&conn).map_err(api_error)?;
    Ok(Json(InvoicesResponse { invoices }))
}

/// GET /api/invoices/:id - One invoice
async fn invoice_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let conn = state.db.lock().unwrap();
    let invoice = db::get_invoice(&conn, id)
        .map_err(api_error)?
        .ok_or_else(|| api_error(LedgerError::InvoiceNotFound(id)))?;
    Ok(Json(InvoiceResponse { invoice }))
}

/// POST /api/upload-invoice - Multipart file through the full pipeline
async fn upload_invoice(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(bad_request)?;

        let conn = state.db.lock().unwrap();
        let processed = pipeline::process_upload(
            &conn,
            &state.sequencer,
            state.extractor.as_ref(),
            &state.rules,
            &state.chart,
            &filename,
            content_type.as_deref(),
            &bytes,
        )
        .map_err(api_error)?;

        return Ok(Json(UploadResponse {
            message: "Invoice processed successfully",
            invoice: processed.invoice,
            ledger_entries: processed.entries,
            verified_transaction: processed.transaction,
        }));
    }

    Err(bad_request("no file provided"))
}

/// POST /api/impact-entry - Create or replace an invoice's impact entry
async fn create_impact_entry(
    State(state): State<AppState>,
    Json(submission): Json<ImpactSubmission>,
) -> Result<Json<ImpactSubmissionResponse>, ApiError> {
    let conn = state.db.lock().unwrap();
    let entry = impact::link_impact(&conn, submission.invoice_id, &submission.metrics)
        .map_err(api_error)?;

    Ok(Json(ImpactSubmissionResponse {
        message: "Impact entry saved",
        impact_entry: entry,
    }))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let db_path = std::env::var("QUADLEDGER_DB").unwrap_or_else(|_| "quadledger.db".to_string());
    let addr = std::env::var("QUADLEDGER_ADDR").unwrap_or_else(|_| "0.0.0.0:8001".to_string());

    let conn = db::open_database(std::path::Path::new(&db_path)).expect("failed to open database");
    let sequencer = ChainSequencer::load(&conn).expect("failed to load chain head");
    tracing::info!(db = %db_path, "database ready");

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        sequencer: Arc::new(sequencer),
        extractor: Arc::new(FallbackExtractor),
        rules: Arc::new(RuleSet::standard()),
        chart: Arc::new(ChartOfAccounts::standard()),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/dashboard-summary", get(dashboard_summary))
        .route("/ledger-entries", get(ledger_entries))
        .route("/verified-transactions", get(verified_transactions))
        .route("/impact-entries", get(impact_entries))
        .route("/invoices", get(invoices))
        .route("/invoices/:id", get(invoice_detail))
        .route("/upload-invoice", post(upload_invoice))
        .route("/impact-entry", post(create_impact_entry))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    tracing::info!(%addr, "QuadLedger API listening");

    axum::serve(listener, app)
        .await
        .expect("server terminated");
}
