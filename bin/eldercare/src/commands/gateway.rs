use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use eldercare_agent::{AppContext, ChatReply, ChatRequest, InterviewTurn, MoodReply, RefillAction, SweepReport};
use eldercare_core::records::{Vitals, WorkflowRecord};
use eldercare_core::types::HistoryTurn;
use eldercare_core::{Error, EventType};
use eldercare_scheduler::{MedicationReminderService, RefillSweepService};
use eldercare_storage::EventQuery;
use eldercare_tools::hospitals::NearestHospitalTool;
use eldercare_tools::{GeoPoint, Tool, ToolContext};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::load_context;

const DEFAULT_EVENT_LIMIT: usize = 20;

#[derive(Clone)]
struct GatewayState {
    app: Arc<AppContext>,
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %e, "Request failed");
        }
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T = Value> = std::result::Result<Json<T>, ApiError>;

fn required(value: Option<String>, field: &str) -> std::result::Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{} is required", field)))
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct VitalsBody {
    patient_id: Option<String>,
    #[serde(flatten)]
    vitals: Vitals,
}

#[derive(Deserialize)]
struct ChatBody {
    patient_id: Option<String>,
    message: Option<String>,
    #[serde(default)]
    history: Vec<HistoryTurn>,
    #[serde(default)]
    location: Option<GeoPoint>,
}

#[derive(Deserialize)]
struct WellnessBody {
    patient_id: Option<String>,
    message: Option<String>,
    #[serde(default)]
    history: Vec<HistoryTurn>,
}

#[derive(Deserialize)]
struct InterviewBody {
    patient_id: Option<String>,
    reason: Option<String>,
    #[serde(default)]
    history: Vec<HistoryTurn>,
}

#[derive(Deserialize)]
struct ReportBody {
    appointment_id: Option<String>,
    patient_id: Option<String>,
    reason: Option<String>,
    #[serde(default)]
    history: Vec<HistoryTurn>,
    #[serde(default)]
    is_final: bool,
}

#[derive(Deserialize)]
struct HospitalsBody {
    patient_id: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Deserialize)]
struct PatientQuery {
    patient_id: Option<String>,
}

#[derive(Deserialize)]
struct EventsQuery {
    patient_id: Option<String>,
    event_type: Option<String>,
    limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn handle_health(State(state): State<GatewayState>) -> impl IntoResponse {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    let start = START.get_or_init(std::time::Instant::now);

    Json(json!({
        "status": "ok",
        "model": state.app.config.provider.model,
        "agents": state.app.bus.registered_agents(),
        "notifier": state.app.notifier.channel(),
        "uptime_secs": start.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /v1/agents/health-monitoring. Vitals arrive flat next to `patient_id`.
async fn handle_vitals(State(state): State<GatewayState>, Json(body): Json<VitalsBody>) -> ApiResult {
    let patient_id = required(body.patient_id, "patient_id")?;
    let outcome = state.app.health_monitor.analyze_vitals(&patient_id, &body.vitals).await?;
    Ok(Json(json!({ "data": outcome })))
}

async fn handle_chat(State(state): State<GatewayState>, Json(body): Json<ChatBody>) -> ApiResult<ChatReply> {
    let req = ChatRequest {
        patient_id: required(body.patient_id, "patient_id")?,
        message: required(body.message, "message")?,
        history: body.history,
        location: body.location,
    };
    let reply = state.app.orchestrator.chat(&req).await?;
    Ok(Json(reply))
}

async fn handle_wellness(State(state): State<GatewayState>, Json(body): Json<WellnessBody>) -> ApiResult<MoodReply> {
    let patient_id = required(body.patient_id, "patient_id")?;
    let message = required(body.message, "message")?;
    let reply = state.app.wellness.analyze_mood(&patient_id, &message, &body.history).await?;
    Ok(Json(reply))
}

async fn handle_interview_turn(State(state): State<GatewayState>, Json(body): Json<InterviewBody>) -> ApiResult<InterviewTurn> {
    let patient_id = required(body.patient_id, "patient_id")?;
    let reason = required(body.reason, "reason")?;
    let turn = state.app.previsit.interview_turn(&reason, &patient_id, &body.history).await?;
    Ok(Json(turn))
}

async fn handle_previsit_report(State(state): State<GatewayState>, Json(body): Json<ReportBody>) -> ApiResult {
    let appointment_id = required(body.appointment_id, "appointment_id")?;
    let patient_id = required(body.patient_id, "patient_id")?;
    let reason = body.reason.unwrap_or_default();
    let report = state
        .app
        .previsit
        .generate_report(&appointment_id, &patient_id, &reason, &body.history, body.is_final)
        .await?;
    Ok(Json(json!({ "report": report, "is_final": body.is_final })))
}

async fn handle_refills_list(State(state): State<GatewayState>, Query(q): Query<PatientQuery>) -> ApiResult {
    let refills = state.app.refill.list(q.patient_id.as_deref())?;
    Ok(Json(json!({ "count": refills.len(), "refills": refills })))
}

async fn handle_refills_sweep(State(state): State<GatewayState>) -> ApiResult<SweepReport> {
    let report = state.app.refill.sweep().await?;
    Ok(Json(report))
}

/// POST /v1/refills/:id/action. Illegal transitions answer 409.
async fn handle_refill_action(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<WorkflowRecord> {
    let action: RefillAction =
        serde_json::from_value(body).map_err(|e| ApiError::bad_request(format!("Invalid refill action: {}", e)))?;
    let record = state.app.refill.apply_action(&id, &action).map_err(|e| match e {
        Error::Validation(message) => ApiError {
            status: StatusCode::CONFLICT,
            message,
        },
        other => other.into(),
    })?;
    Ok(Json(record))
}

async fn handle_nearby_hospitals(State(state): State<GatewayState>, Json(body): Json<HospitalsBody>) -> ApiResult {
    let location = match (body.lat, body.lon) {
        (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
        _ => None,
    };
    let ctx = ToolContext {
        patient_id: body.patient_id.unwrap_or_default(),
        location,
        store: state.app.store.clone(),
        geo: state.app.geo.clone(),
        notifier: state.app.notifier.clone(),
        default_city: state.app.config.geo.default_city.clone(),
    };
    let result = NearestHospitalTool.execute(ctx, json!({ "city": body.city })).await?;
    Ok(Json(result))
}

async fn handle_events(State(state): State<GatewayState>, Query(q): Query<EventsQuery>) -> ApiResult {
    let event_type = q.event_type.map(|t| t.parse::<EventType>()).transpose()?;
    let events = state.app.store.recent_events(&EventQuery {
        patient_id: q.patient_id,
        event_type,
        limit: q.limit.unwrap_or(DEFAULT_EVENT_LIMIT),
    })?;
    Ok(Json(json!({ "count": events.len(), "events": events })))
}

fn router(app: Arc<AppContext>) -> Router {
    Router::new()
        .route("/v1/health", get(handle_health))
        .route("/v1/agents/health-monitoring", post(handle_vitals))
        .route("/v1/chat", post(handle_chat))
        .route("/v1/agents/wellness", post(handle_wellness))
        .route("/v1/previsit/interview-turn", post(handle_interview_turn))
        .route("/v1/previsit/report", post(handle_previsit_report))
        .route("/v1/refills", get(handle_refills_list))
        .route("/v1/refills/sweep", post(handle_refills_sweep))
        .route("/v1/refills/:id/action", post(handle_refill_action))
        .route("/v1/nearby-hospitals", post(handle_nearby_hospitals))
        .route("/v1/events", get(handle_events))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(GatewayState { app })
}

pub async fn run(cli_host: Option<String>, cli_port: Option<u16>) -> anyhow::Result<()> {
    let app = Arc::new(load_context()?);
    let host = cli_host.unwrap_or_else(|| app.config.gateway.host.clone());
    let port = cli_port.unwrap_or(app.config.gateway.port);

    // ── Create shutdown channel ──
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut handles: Vec<(&str, tokio::task::JoinHandle<()>)> = Vec::new();

    // ── Periodic sweeps ──
    let scheduler = &app.config.scheduler;
    if scheduler.enabled {
        let refill = Arc::new(
            RefillSweepService::new(app.refill.clone())
                .with_interval(Duration::from_secs(scheduler.refill_interval_secs)),
        );
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(("refill_sweep", tokio::spawn(refill.run_loop(shutdown_rx))));

        let reminders = Arc::new(
            MedicationReminderService::new(app.store.clone())
                .with_interval(Duration::from_secs(scheduler.reminder_interval_secs)),
        );
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(("reminders", tokio::spawn(reminders.run_loop(shutdown_rx))));
    } else {
        info!("Scheduler disabled");
    }

    // ── HTTP server ──
    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    let http_shutdown_rx = shutdown_tx.subscribe();
    let service = router(app.clone());
    handles.push((
        "http_server",
        tokio::spawn(async move {
            axum::serve(listener, service)
                .with_graceful_shutdown(async move {
                    let mut rx = http_shutdown_rx;
                    let _ = rx.recv().await;
                })
                .await
                .ok();
        }),
    ));

    info!(addr = %bind_addr, model = %app.config.provider.model, "ElderCare gateway listening");

    // ── Wait for shutdown signal ──
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining tasks...");
    let _ = shutdown_tx.send(());

    for (name, handle) in handles {
        match tokio::time::timeout(Duration::from_secs(10), handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task = name, error = %e, "Task ended abnormally"),
            Err(_) => warn!(task = name, "Task did not stop in time"),
        }
    }
    info!("Gateway stopped");
    Ok(())
}
