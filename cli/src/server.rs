use std::net::UdpSocket;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;

use crate::coach::CoachClient;
use crate::config::CoachSettings;
use waterbar_core::coach::PlanAdvisor;
use waterbar_core::models::{
    DaySummary, NewEvent, ProfileUpdate, validate_event, validate_event_date, validate_plan_status,
};
use waterbar_core::plan::{self, PlanInput, PlanLogEvent, PlanSummary};
use waterbar_core::service::{RespondRequest, TOOL_NAMES, ToolArgs, WaterBarService};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<WaterBarService>>,
    coach: Option<Arc<CoachClient>>,
    api_key: Option<String>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct PlanRequest {
    height_cm: Option<f64>,
    weight_kg: Option<f64>,
    #[serde(default)]
    age: Option<i64>,
    #[serde(default)]
    sex: Option<String>,
    #[serde(default)]
    log: Option<Vec<PlanLogEvent>>,
}

/// One conversation turn. `event` and `events` are interchangeable; a
/// `tool_call` bypasses the gate and dispatches directly.
#[derive(Deserialize)]
struct RespondBody {
    #[serde(default, alias = "user_id")]
    profile_id: Option<String>,
    event_date: Option<String>,
    #[serde(default)]
    profile_updates: Option<ProfileUpdate>,
    #[serde(default)]
    event: Option<NewEvent>,
    #[serde(default)]
    events: Option<Vec<NewEvent>>,
    #[serde(default)]
    finalize: bool,
    #[serde(default)]
    tool_call: Option<ToolCallBody>,
}

#[derive(Deserialize)]
struct ToolCallBody {
    name: String,
    #[serde(default, alias = "args")]
    arguments: ToolArgs,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                tracing::error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

#[allow(clippy::unused_async)]
async fn calculate_plan(Json(req): Json<PlanRequest>) -> Result<Json<PlanSummary>, ApiError> {
    let (height_cm, weight_kg) = match (req.height_cm, req.weight_kg) {
        (Some(h), Some(w)) => (h, w),
        _ => {
            return Err(ApiError::BadRequest(
                "height_cm and weight_kg are required".to_string(),
            ));
        }
    };
    if height_cm <= 0.0 || weight_kg <= 0.0 {
        return Err(ApiError::BadRequest(
            "height_cm and weight_kg must be greater than 0".to_string(),
        ));
    }

    let input = PlanInput {
        height_cm,
        weight_kg,
        age: req.age,
        sex: req.sex,
        log: req.log,
    };
    Ok(Json(plan::compute_plan(&input)))
}

/// Reject tool calls with caller mistakes before they reach the service, so
/// bad input maps to 400 and only genuine failures map to 500.
fn validate_tool_args(name: &str, args: &ToolArgs) -> Result<(), ApiError> {
    if !TOOL_NAMES.contains(&name) {
        return Err(ApiError::BadRequest(format!("Unknown tool '{name}'")));
    }
    if name != "update_plan_status" && args.profile_id.as_deref().is_none_or(str::is_empty) {
        return Err(ApiError::BadRequest(
            "Missing profile_id argument".to_string(),
        ));
    }
    if let Some(date) = args.event_date.as_deref() {
        validate_event_date(date).map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    }
    match name {
        "log_event_batch" => {
            let events = args.events.as_deref().unwrap_or_default();
            if events.is_empty() {
                return Err(ApiError::BadRequest("No events provided".to_string()));
            }
            for event in events {
                validate_event(event).map_err(|e| ApiError::BadRequest(format!("{e}")))?;
            }
        }
        "update_plan_status" => {
            if args.plan_id.is_none() {
                return Err(ApiError::BadRequest("Missing plan_id argument".to_string()));
            }
            match args.status.as_deref() {
                Some(status) => {
                    validate_plan_status(status)
                        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
                }
                None => {
                    return Err(ApiError::BadRequest("Missing status argument".to_string()));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

async fn respond_turn(
    State(state): State<AppState>,
    Json(body): Json<RespondBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let profile_id = match body.profile_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err(ApiError::BadRequest("profile_id is required".to_string())),
    };
    if let Some(date) = body.event_date.as_deref() {
        validate_event_date(date).map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    }

    if let Some(tool_call) = body.tool_call {
        let mut args = tool_call.arguments;
        if args.profile_id.is_none() {
            args.profile_id = Some(profile_id);
        }
        if args.event_date.is_none() {
            args.event_date = body.event_date;
        }
        validate_tool_args(&tool_call.name, &args)?;

        let service = state
            .service
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let advisor = state.coach.as_deref().map(|c| c as &dyn PlanAdvisor);
        let output = service
            .run_tool(advisor, &tool_call.name, &args)
            .context("tool dispatch failed")?;
        return Ok(Json(serde_json::json!({ "tool_call_output": output })));
    }

    let mut events = body.events;
    if let Some(single) = body.event {
        events.get_or_insert_with(Vec::new).push(single);
    }
    if let Some(batch) = &events {
        for event in batch {
            validate_event(event).map_err(|e| ApiError::BadRequest(format!("{e}")))?;
        }
    }

    let request = RespondRequest {
        profile_id,
        event_date: body.event_date,
        profile_updates: body.profile_updates,
        events,
        finalize: body.finalize,
    };

    let service = state
        .service
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let advisor = state.coach.as_deref().map(|c| c as &dyn PlanAdvisor);
    let reply = service
        .respond(advisor, &request)
        .context("conversation turn failed")?;
    Ok(Json(
        serde_json::to_value(reply).context("failed to serialize reply")?,
    ))
}

async fn invoke_tool(
    State(state): State<AppState>,
    Json(req): Json<ToolCallBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate_tool_args(&req.name, &req.arguments)?;

    let service = state
        .service
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let advisor = state.coach.as_deref().map(|c| c as &dyn PlanAdvisor);
    let output = service
        .run_tool(advisor, &req.name, &req.arguments)
        .context("tool dispatch failed")?;
    Ok(Json(serde_json::json!({ "tool_call_output": output })))
}

async fn get_day_summary(
    State(state): State<AppState>,
    Path((profile_id, date_str)): Path<(String, String)>,
) -> Result<Json<DaySummary>, ApiError> {
    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{date_str}'. Use YYYY-MM-DD")))?;

    let service = state
        .service
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let summary = service
        .day_summary(&profile_id, date)
        .context("database error")?;

    if summary.step.is_none()
        && summary.staged.is_empty()
        && summary.validated.is_empty()
        && summary.plan.is_none()
    {
        return Err(ApiError::NotFound(format!(
            "No activity for '{profile_id}' on {date_str}"
        )));
    }
    Ok(Json(summary))
}

#[allow(clippy::unused_async)]
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// --- Pairing helpers ---

/// Detect the machine's local network IP address.
///
/// Uses the UDP socket trick: "connect" a UDP socket to a public IP (no
/// traffic is sent), then read back the local address the OS chose.
fn detect_local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let addr = socket.local_addr().ok()?;
    let ip = addr.ip();
    if ip.is_loopback() {
        None
    } else {
        Some(ip.to_string())
    }
}

/// Build a `waterbar://connect` deep link for mobile app auto-configuration.
/// Phone cameras recognize this as a URL and offer to open the app.
fn build_connect_deep_link(server_url: &str, api_key: &str) -> String {
    let encoded_url = percent_encode_component(server_url);
    format!("waterbar://connect?url={encoded_url}&key={api_key}")
}

/// Minimal percent-encoding for a URL query parameter value. Everything
/// outside the RFC 3986 unreserved set is escaped.
fn percent_encode_component(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    encoded
}

/// Print a compact QR code to stderr using Unicode half-block characters.
/// Each character encodes two vertical modules, halving the output height.
fn print_qr_code(data: &str) {
    use qrcode::QrCode;

    let code = match QrCode::new(data.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to generate QR code: {e}");
            return;
        }
    };

    let width = code.width();
    let colors: Vec<bool> = code
        .into_colors()
        .into_iter()
        .map(|c| c == qrcode::Color::Dark)
        .collect();

    // 1-module quiet zone on each side
    let quiet = 1;
    let total_w = width + 2 * quiet;
    let total_h = width + 2 * quiet;

    let is_dark = |row: usize, col: usize| -> bool {
        if row < quiet || row >= quiet + width || col < quiet || col >= quiet + width {
            return false;
        }
        colors[(row - quiet) * width + (col - quiet)]
    };

    eprintln!();
    eprintln!("Scan to connect:");

    let mut row = 0;
    while row < total_h {
        let mut line = String::with_capacity(total_w);
        for col in 0..total_w {
            let top = is_dark(row, col);
            let bot = if row + 1 < total_h {
                is_dark(row + 1, col)
            } else {
                false
            };
            line.push(match (top, bot) {
                (true, true) => '\u{2588}',  // █
                (true, false) => '\u{2580}', // ▀
                (false, true) => '\u{2584}', // ▄
                (false, false) => ' ',
            });
        }
        eprintln!("{line}");
        row += 2;
    }
    eprintln!();
}

// --- Router builder ---

/// TLS configuration for the server.
pub struct TlsConfig {
    pub cert_path: std::path::PathBuf,
    pub key_path: std::path::PathBuf,
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/plan", post(calculate_plan))
        .route("/api/responses", post(respond_turn))
        .route("/api/tools", post(invoke_tool))
        .route("/api/summary/{profile_id}/{date}", get(get_day_summary))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        // liveness probe stays reachable without a key
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    service: WaterBarService,
    port: u16,
    bind: &str,
    api_key: Option<String>,
    tls: Option<TlsConfig>,
    show_qr: bool,
) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("waterbar=info")),
        )
        .init();

    let coach = match CoachSettings::from_env() {
        Some(settings) => {
            eprintln!("Coach: {} via {}", settings.model, settings.base_url);
            Some(Arc::new(CoachClient::new(&settings)))
        }
        None => {
            eprintln!(
                "Coach not configured (set WATERBAR_COACH_KEY); plans use the static fallback."
            );
            None
        }
    };

    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        coach,
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            &key[..4],
            &key[key.len() - 4..],
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    if show_qr {
        if let Some(ref key) = api_key {
            let scheme = if tls.is_some() { "https" } else { "http" };
            let host = if bind == "0.0.0.0" {
                detect_local_ip().unwrap_or_else(|| bind.to_string())
            } else {
                bind.to_string()
            };
            let server_url = format!("{scheme}://{host}:{port}");
            let deep_link = build_connect_deep_link(&server_url, key);
            print_qr_code(&deep_link);
        }
    }

    if let Some(tls_config) = tls {
        let fingerprint = crate::tls::ensure_cert(&tls_config.cert_path, &tls_config.key_path)?;

        let rustls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            &tls_config.cert_path,
            &tls_config.key_path,
        )
        .await
        .context("failed to load TLS certificate")?;

        let addr = format!("{bind}:{port}")
            .parse::<std::net::SocketAddr>()
            .context("invalid bind address")?;

        eprintln!("Listening on https://{bind}:{port}");
        eprintln!("Certificate fingerprint (SHA-256):");
        eprintln!("  {fingerprint}");

        axum_server::bind_rustls(addr, rustls_config)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
        eprintln!("Listening on http://{bind}:{port}");
        axum::serve(listener, app).await?;
    }

    Ok(())
}
