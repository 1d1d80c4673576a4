/**
 * API REST ASSETWATCH - Serveur HTTP du kernel
 *
 * RÔLE :
 * Déclencheurs à la demande et consultation de l'inventaire, en JSON.
 *
 * FONCTIONNEMENT :
 * - Routes : /health, /system/health, /devices, /checks, /discovery, /subnets, /lookup
 * - Erreurs du cœur traduites en codes HTTP (409 conflit ou job en cours,
 *   404 inconnu, 400 entrée invalide, 502 échec du balayage)
 * - Corps d'erreur uniforme : {"error": "..."}
 */

use crate::health::{HealthTracker, KernelHealth};
use crate::jobs::{DiscoveryOutcome, JobError, Jobs};
use assetwatch_core::error::{InputError, MonitorError, ScanError, StoreError};
use assetwatch_core::model::{
    parse_address, DeviceCurrentStatus, DeviceId, DeviceStatus, DeviceType, DeviceUpdate, NewDevice,
    NewSubnet, ReachabilityCheck, RegisteredDevice, Subnet,
};
use assetwatch_core::monitor::CheckReport;
use assetwatch_core::store::{self, InventoryStore};
use assetwatch_core::subnet::{OccupancyTracker, SubnetStats};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;

const DEFAULT_HISTORY: usize = 20;
const MAX_HISTORY: usize = 500;
const DEFAULT_FREE: usize = 16;
const MAX_FREE: usize = 1024;

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<Jobs>,
    pub store: Arc<dyn InventoryStore>,
    pub occupancy: Arc<OccupancyTracker>,
    pub health_tracker: HealthTracker,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(what: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, what)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::Conflict { .. } => StatusCode::CONFLICT,
            StoreError::DeviceNotFound(_) | StoreError::SubnetNotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Serialization(_) | StoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<InputError> for ApiError {
    fn from(e: InputError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.to_string())
    }
}

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        let message = e.to_string();
        match e {
            MonitorError::Store(e) => e.into(),
            MonitorError::UnknownDevice(_) => Self::not_found(message),
            MonitorError::NoAddress(_) => Self::new(StatusCode::UNPROCESSABLE_ENTITY, message),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        let message = e.to_string();
        match e {
            JobError::AlreadyRunning(_) => Self::new(StatusCode::CONFLICT, message),
            JobError::Scan(ScanError::Input(e)) => e.into(),
            JobError::Scan(ScanError::Sweep { .. }) => Self::new(StatusCode::BAD_GATEWAY, message),
            JobError::Store(e) => e.into(),
            JobError::Monitor(e) => e.into(),
        }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/devices", get(list_devices).post(create_device))
        .route("/devices/{id}", get(get_device).patch(update_device))
        .route("/devices/{id}/status", get(get_device_status))
        .route("/devices/{id}/checks", get(get_device_checks))
        .route("/devices/{id}/check", post(check_device))
        .route("/checks/run", post(run_checks))
        .route("/discovery/run", post(run_discovery))
        .route("/discovery/last", get(last_discovery))
        .route("/subnets", get(list_subnets).post(create_subnet))
        .route("/subnets/{id}/stats", get(subnet_stats))
        .route("/subnets/{id}/free", get(subnet_free))
        .route("/lookup/{ip}", get(lookup))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(app.store.as_ref()))
}

#[derive(Debug, Default, Deserialize)]
struct DeviceFilter {
    #[serde(rename = "type")]
    device_type: Option<DeviceType>,
    status: Option<DeviceStatus>,
}

// GET /devices?type=printer&status=active
async fn list_devices(
    State(app): State<AppState>,
    Query(filter): Query<DeviceFilter>,
) -> ApiResult<Vec<RegisteredDevice>> {
    let devices = app
        .store
        .devices()?
        .into_iter()
        .filter(|d| filter.device_type.map_or(true, |t| d.device_type == t))
        .filter(|d| filter.status.map_or(true, |s| d.status == s))
        .collect();
    Ok(Json(devices))
}

// POST /devices (enregistrement manuel)
async fn create_device(
    State(app): State<AppState>,
    Json(new): Json<NewDevice>,
) -> Result<(StatusCode, Json<RegisteredDevice>), ApiError> {
    let device = store::blocking(&app.store, move |s| s.insert_device(new)).await?;
    tracing::info!(device_id = %device.id, "appareil enregistré: {}", device.name);
    Ok((StatusCode::CREATED, Json(device)))
}

fn find_device(app: &AppState, id: u64) -> Result<RegisteredDevice, ApiError> {
    app.store
        .device(DeviceId(id))?
        .ok_or_else(|| ApiError::not_found(format!("device {id} not found")))
}

// GET /devices/{id}
async fn get_device(State(app): State<AppState>, Path(id): Path<u64>) -> ApiResult<RegisteredDevice> {
    Ok(Json(find_device(&app, id)?))
}

// PATCH /devices/{id} (édition, transition de statut)
async fn update_device(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Json(update): Json<DeviceUpdate>,
) -> ApiResult<RegisteredDevice> {
    let device = store::blocking(&app.store, move |s| s.update_device(DeviceId(id), update)).await?;
    Ok(Json(device))
}

// GET /devices/{id}/status (null si jamais vérifié)
async fn get_device_status(
    State(app): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Option<DeviceCurrentStatus>> {
    let device = find_device(&app, id)?;
    Ok(Json(app.store.current_status(device.id)?))
}

#[derive(Debug, Default, Deserialize)]
struct LimitParams {
    limit: Option<usize>,
}

// GET /devices/{id}/checks?limit=N (plus récent d'abord)
async fn get_device_checks(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Vec<ReachabilityCheck>> {
    let device = find_device(&app, id)?;
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY).min(MAX_HISTORY);
    Ok(Json(app.store.latest_checks(device.id, limit)?))
}

// POST /devices/{id}/check
async fn check_device(State(app): State<AppState>, Path(id): Path<u64>) -> ApiResult<CheckReport> {
    Ok(Json(app.jobs.check_device(DeviceId(id)).await?))
}

// POST /checks/run
async fn run_checks(State(app): State<AppState>) -> ApiResult<Vec<CheckReport>> {
    Ok(Json(app.jobs.run_checks().await?))
}

#[derive(Debug, Default, Deserialize)]
struct DiscoveryParams {
    cidr: Option<String>,
}

// POST /discovery/run[?cidr=10.0.0.0/24]
async fn run_discovery(
    State(app): State<AppState>,
    Query(params): Query<DiscoveryParams>,
) -> ApiResult<DiscoveryOutcome> {
    Ok(Json(app.jobs.run_discovery(params.cidr.as_deref()).await?))
}

// GET /discovery/last
async fn last_discovery(State(app): State<AppState>) -> ApiResult<DiscoveryOutcome> {
    app.jobs
        .last_discovery()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("no discovery has completed yet"))
}

#[derive(Debug, Serialize)]
struct SubnetView {
    #[serde(flatten)]
    subnet: Subnet,
    stats: SubnetStats,
}

// GET /subnets (avec occupation)
async fn list_subnets(State(app): State<AppState>) -> ApiResult<Vec<SubnetView>> {
    let mut views = Vec::new();
    for subnet in app.store.subnets()? {
        let stats = app.occupancy.stats(&subnet)?;
        views.push(SubnetView { subnet, stats });
    }
    Ok(Json(views))
}

// POST /subnets
async fn create_subnet(
    State(app): State<AppState>,
    Json(new): Json<NewSubnet>,
) -> Result<(StatusCode, Json<Subnet>), ApiError> {
    let subnet = store::blocking(&app.store, move |s| s.insert_subnet(new)).await?;
    Ok((StatusCode::CREATED, Json(subnet)))
}

// GET /subnets/{id}/stats
async fn subnet_stats(State(app): State<AppState>, Path(id): Path<u64>) -> ApiResult<SubnetStats> {
    Ok(Json(app.occupancy.stats_by_id(id)?))
}

// GET /subnets/{id}/free?limit=N
async fn subnet_free(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Query(params): Query<LimitParams>,
) -> ApiResult<Vec<Ipv4Addr>> {
    let subnet = app.store.subnet(id)?.ok_or(StoreError::SubnetNotFound(id))?;
    let limit = params.limit.unwrap_or(DEFAULT_FREE).min(MAX_FREE);
    Ok(Json(app.occupancy.free_addresses(&subnet, limit)?))
}

#[derive(Debug, Serialize)]
struct LookupView {
    address: Ipv4Addr,
    device: Option<RegisteredDevice>,
    subnet: Option<Subnet>,
}

// GET /lookup/{ip}
async fn lookup(State(app): State<AppState>, Path(ip): Path<String>) -> ApiResult<LookupView> {
    let address = parse_address(&ip)?;
    Ok(Json(LookupView {
        address,
        device: app.occupancy.lookup(address)?,
        subnet: app.occupancy.subnet_for(address)?,
    }))
}
