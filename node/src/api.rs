//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the bridge node's HTTP interface.
//! All endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                              | Description                            |
//! |--------|-----------------------------------|----------------------------------------|
//! | GET    | `/health`                         | Liveness probe                         |
//! | GET    | `/status`                         | Node, chain, and ledger summary        |
//! | POST   | `/verifications`                  | Record a verification decision         |
//! | GET    | `/identities/:fingerprint`        | Decision history plus mint request     |
//! | GET    | `/requests`                       | Active mint requests, `?state=` filter |
//! | POST   | `/requests/:fingerprint/cancel`   | Cancel an active mint request          |
//! | POST   | `/requests/:fingerprint/resubmit` | Restart a terminally failed mint       |
//! | GET    | `/failures`                       | Terminally failed mint requests        |
//! | GET    | `/ws`                             | WebSocket for live mint events         |
//!
//! Fingerprint path parameters accept either the `pear1` address form or
//! raw hex; responses always render the address form.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use pearid_bridge::identity::{IdentityAttributes, IdentityFingerprint};
use pearid_bridge::mint::MintOrchestrator;
use pearid_bridge::storage::{
    Decision, LedgerError, LedgerStats, MintRequest, MintState, VerificationLedger,
    VerificationRecord,
};
use pearid_bridge::store::{BlobStore, ContentId, StoreError};
use pearid_registry::devnet::DevnetChain;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything is behind an `Arc` or is a handle already.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network identifier (currently always "devnet").
    pub network: String,
    /// When this node process started, for the uptime field.
    pub started_at: DateTime<Utc>,
    /// Handle to the in-process registry chain.
    pub chain: DevnetChain,
    /// Durable ledger of decisions and mint requests.
    pub ledger: Arc<VerificationLedger>,
    /// The mint pipeline; the API records decisions through it so staging
    /// and notification happen on the same path the workers use.
    pub orchestrator: Arc<MintOrchestrator>,
    /// Content-addressed evidence store.
    pub store: Arc<dyn BlobStore>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
///
/// The returned router is ready to be served on the configured API port.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/verifications", post(submit_verification_handler))
        .route("/identities/:fingerprint", get(identity_handler))
        .route("/requests", get(requests_handler))
        .route("/requests/:fingerprint/cancel", post(cancel_handler))
        .route("/requests/:fingerprint/resubmit", post(resubmit_handler))
        .route("/failures", get(failures_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Request body for `POST /verifications`.
///
/// The identity can arrive two ways: full attributes (the node derives the
/// fingerprint) or a pre-derived fingerprint string. Evidence likewise:
/// `evidence_hex` carries the raw evidence bytes for the node to pin, while
/// `evidence_content_id` references a blob that is already in the store.
/// Exactly one of each pair is required.
#[derive(Debug, Deserialize)]
pub struct VerificationSubmission {
    /// Full identity attributes; the fingerprint is derived server-side.
    pub attributes: Option<IdentityAttributes>,
    /// Pre-derived fingerprint, address or hex form.
    pub fingerprint: Option<String>,
    /// The verdict: "approved" or "rejected".
    pub decision: Decision,
    /// Hex-encoded evidence bytes to pin in the store.
    pub evidence_hex: Option<String>,
    /// Content id of evidence that was stored out of band.
    pub evidence_content_id: Option<String>,
}

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Network identifier.
    pub network: String,
    /// Current registry chain height.
    pub block_height: u64,
    /// Seconds since the node process started.
    pub uptime_secs: u64,
    /// Ledger tree sizes.
    pub ledger: LedgerStats,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /identities/:fingerprint`.
#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityResponse {
    /// Address form of the fingerprint.
    pub fingerprint: String,
    /// Every decision recorded for this identity, oldest first.
    pub history: Vec<VerificationRecord>,
    /// The active mint request, if one exists.
    pub mint_request: Option<MintRequest>,
}

/// Query parameters for `GET /requests`.
#[derive(Debug, Deserialize)]
pub struct RequestsQuery {
    /// Optional state filter, e.g. `?state=submitted`.
    pub state: Option<String>,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` - returns 200 if the node is alive.
///
/// This is the liveness probe for orchestration (k8s, systemd, etc.). It
/// intentionally does not check subsystem health; that belongs in `/status`.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` - returns a node, chain, and ledger summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    let resp = StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        block_height: state.chain.height(),
        uptime_secs: uptime,
        ledger: state.ledger.stats(),
        timestamp: Utc::now().to_rfc3339(),
    };
    Json(resp)
}

/// `POST /verifications` - records one verification decision.
///
/// On success returns 201 with the stored [`VerificationRecord`]. An
/// approval additionally stages a mint request, so a 201 here means the
/// pipeline owns the identity from now on.
async fn submit_verification_handler(
    State(state): State<AppState>,
    Json(submission): Json<VerificationSubmission>,
) -> Response {
    // Resolve the fingerprint first so every error names the identity.
    let fingerprint = match (&submission.attributes, &submission.fingerprint) {
        (Some(attributes), _) => IdentityFingerprint::derive(attributes),
        (None, Some(raw)) => match parse_fingerprint(raw) {
            Ok(fp) => fp,
            Err(resp) => return resp,
        },
        (None, None) => {
            return bad_request("submission needs either attributes or a fingerprint");
        }
    };

    let evidence_content_id = match (&submission.evidence_hex, &submission.evidence_content_id) {
        (Some(_), Some(_)) | (None, None) => {
            return bad_request("provide exactly one of evidence_hex or evidence_content_id");
        }
        (Some(evidence_hex), None) => {
            let bytes = match hex::decode(evidence_hex) {
                Ok(bytes) => bytes,
                Err(e) => return bad_request(&format!("evidence_hex is not valid hex: {e}")),
            };
            match state.store.put(bytes).await {
                Ok(id) => id,
                Err(e) => return store_error_response(&e),
            }
        }
        (None, Some(raw_id)) => {
            let id = match ContentId::from_hex(raw_id) {
                Ok(id) => id,
                Err(e) => return bad_request(&format!("malformed evidence content id: {e}")),
            };
            // The blob must already be pinned, otherwise the pipeline would
            // only discover the hole after staging the request.
            match state.store.get(&id).await {
                Ok(_) => id,
                Err(StoreError::NotFound(_)) => {
                    return bad_request(&format!("no evidence blob stored under {}", id.to_hex()));
                }
                Err(e) => return store_error_response(&e),
            }
        }
    };

    match state
        .orchestrator
        .record_decision(fingerprint, submission.decision, evidence_content_id)
        .await
    {
        Ok(record) => {
            match record.decision {
                Decision::Approved => state.metrics.approvals_recorded_total.inc(),
                Decision::Rejected => state.metrics.rejections_recorded_total.inc(),
            }
            (StatusCode::CREATED, Json(record)).into_response()
        }
        Err(e) => ledger_error_response(&e),
    }
}

/// `GET /identities/:fingerprint` - decision history plus the active mint
/// request for one identity. 404 when the ledger has never seen it.
async fn identity_handler(Path(raw): Path<String>, State(state): State<AppState>) -> Response {
    let fingerprint = match parse_fingerprint(&raw) {
        Ok(fp) => fp,
        Err(resp) => return resp,
    };

    let history = match state.ledger.verification_history(&fingerprint) {
        Ok(history) => history,
        Err(e) => return ledger_error_response(&e),
    };
    let mint_request = match state.ledger.get_mint_state(&fingerprint) {
        Ok(request) => request,
        Err(e) => return ledger_error_response(&e),
    };

    if history.is_empty() && mint_request.is_none() {
        let err = ErrorResponse {
            error: format!("no verification records for {}", fingerprint.to_address()),
        };
        return (StatusCode::NOT_FOUND, Json(err)).into_response();
    }

    let resp = IdentityResponse {
        fingerprint: fingerprint.to_address(),
        history,
        mint_request,
    };
    (StatusCode::OK, Json(resp)).into_response()
}

/// `GET /requests` - all active mint requests, optionally filtered with
/// `?state=pending|submitted|confirmed|failed_retryable|failed_terminal`.
async fn requests_handler(
    Query(query): Query<RequestsQuery>,
    State(state): State<AppState>,
) -> Response {
    let filter = match query.state.as_deref() {
        Some(raw) => match raw.parse::<MintState>() {
            Ok(state) => Some(state),
            Err(e) => return bad_request(&e),
        },
        None => None,
    };

    match state.ledger.active_requests() {
        Ok(mut requests) => {
            if let Some(wanted) = filter {
                requests.retain(|r| r.state == wanted);
            }
            (StatusCode::OK, Json(requests)).into_response()
        }
        Err(e) => ledger_error_response(&e),
    }
}

/// `POST /requests/:fingerprint/cancel` - asks the pipeline to cancel an
/// active mint request. Before broadcast this goes terminal immediately;
/// after broadcast it only forbids further retries.
async fn cancel_handler(Path(raw): Path<String>, State(state): State<AppState>) -> Response {
    let fingerprint = match parse_fingerprint(&raw) {
        Ok(fp) => fp,
        Err(resp) => return resp,
    };

    match state.orchestrator.cancel(fingerprint).await {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(e) => ledger_error_response(&e),
    }
}

/// `POST /requests/:fingerprint/resubmit` - archives a terminally failed
/// request and stages a fresh one. 409 when the mint is already confirmed.
async fn resubmit_handler(Path(raw): Path<String>, State(state): State<AppState>) -> Response {
    let fingerprint = match parse_fingerprint(&raw) {
        Ok(fp) => fp,
        Err(resp) => return resp,
    };

    match state.orchestrator.resubmit(fingerprint).await {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(e) => ledger_error_response(&e),
    }
}

/// `GET /failures` - every active request in FAILED_TERMINAL, the operator
/// worklist for `/requests/:fingerprint/resubmit`.
async fn failures_handler(State(state): State<AppState>) -> Response {
    match state.ledger.terminal_failures() {
        Ok(failures) => (StatusCode::OK, Json(failures)).into_response(),
        Err(e) => ledger_error_response(&e),
    }
}

/// `GET /ws` - WebSocket upgrade for live mint event streaming.
///
/// Clients receive one JSON-encoded mint lifecycle event per message, the
/// same stream the metrics pump consumes. The connection is push-only;
/// client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding orchestrator events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.orchestrator.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            // Client disconnected.
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {
                        // Client messages are ignored; this is a push-only channel.
                    }
                    _ => break, // Disconnected or error.
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error Mapping
// ---------------------------------------------------------------------------

/// Accepts a fingerprint in address form (`pear1...`) or raw hex.
fn parse_fingerprint(raw: &str) -> Result<IdentityFingerprint, Response> {
    IdentityFingerprint::from_address(raw)
        .or_else(|_| IdentityFingerprint::from_hex(raw))
        .map_err(|e| bad_request(&format!("malformed fingerprint {raw:?}: {e}")))
}

fn bad_request(message: &str) -> Response {
    let err = ErrorResponse {
        error: message.to_string(),
    };
    (StatusCode::BAD_REQUEST, Json(err)).into_response()
}

/// Maps ledger errors onto HTTP statuses. Conflicts with existing state are
/// 409, unknown identities are 404, storage faults are 500.
fn ledger_error_response(err: &LedgerError) -> Response {
    let status = match err {
        LedgerError::DuplicateApproval { .. }
        | LedgerError::AlreadyConfirmed { .. }
        | LedgerError::NotTerminal { .. }
        | LedgerError::InvalidTransition { .. }
        | LedgerError::VersionConflict { .. } => StatusCode::CONFLICT,
        LedgerError::ApprovalMissing { .. } | LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
        LedgerError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let err = ErrorResponse {
        error: err.to_string(),
    };
    (status, Json(err)).into_response()
}

fn store_error_response(err: &StoreError) -> Response {
    let status = match err {
        StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StoreError::NotFound(_) | StoreError::MalformedId(_) => StatusCode::BAD_REQUEST,
    };
    let err = ErrorResponse {
        error: err.to_string(),
    };
    (status, Json(err)).into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
