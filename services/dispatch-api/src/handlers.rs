use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use lifelink_dispatch::{parse_status, ListingFilter, TransportSubmission, UnlinkedSubmission};
use lifelink_domain::{
    AvailabilityStatus, DispatchError, DriverContact, DriverId, ListingSubmission, NewDriver,
    NewHospital, RequestId, RequestStatus,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use crate::state::AppState;

/// Dispatch error rendered as `{"error": kind, "message": text}`
#[derive(Debug)]
pub enum ApiError {
    Dispatch(DispatchError),
    Internal(String),
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError::Dispatch(err)
    }
}

pub fn status_for(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
        DispatchError::InvalidListing { .. }
        | DispatchError::InvalidPriority(_)
        | DispatchError::InvalidStatus(_)
        | DispatchError::InvalidAvailability(_)
        | DispatchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        DispatchError::InvalidTransition { .. } | DispatchError::DriverUnavailable { .. } => {
            StatusCode::CONFLICT
        }
        DispatchError::Storage(_) | DispatchError::LockPoisoned(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Dispatch(err) => (status_for(&err), err.kind(), err.to_string()),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", message),
        };
        if status.is_server_error() {
            error!(kind, message = %message, "Request failed");
        }
        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Run synchronous store work off the async executor
async fn blocking<T, F>(state: &Arc<AppState>, work: F) -> ApiResult<T>
where
    F: FnOnce(&AppState) -> lifelink_domain::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

fn created(value: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, Json(value))
}

pub async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "lifelink-dispatch-api",
        "timestamp": Utc::now().to_rfc3339()
    })))
}

/// All listings, newest first
pub async fn list_organs(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let mut listings = blocking(&state, |s| {
        s.coordinator.listings().list(&ListingFilter::default())
    })
    .await?;
    listings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(Json(json!(listings)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub organ_type: Option<String>,
    pub availability: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub async fn search_listings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListingQuery>,
) -> ApiResult<Json<Value>> {
    let availability = non_empty(query.availability)
        .map(|a| a.parse::<AvailabilityStatus>())
        .transpose()?;
    let filter = ListingFilter {
        organ_type: non_empty(query.organ_type),
        availability,
        hospital_name: None,
        query: non_empty(query.q),
    };
    let listings = blocking(&state, move |s| s.coordinator.listings().list(&filter)).await?;
    Ok(Json(json!(listings)))
}

pub async fn publish_listing(
    State(state): State<Arc<AppState>>,
    Json(listing): Json<ListingSubmission>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let listing = blocking(&state, move |s| {
        let id = s.coordinator.publish_listing(listing)?;
        s.coordinator.listings().get(id)
    })
    .await?;
    Ok(created(json!(listing)))
}

pub async fn list_hospitals(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let hospitals = blocking(&state, |s| s.coordinator.hospitals().list()).await?;
    Ok(Json(json!(hospitals)))
}

pub async fn register_hospital(
    State(state): State<Arc<AppState>>,
    Json(hospital): Json<NewHospital>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let hospital = blocking(&state, move |s| {
        let id = s.coordinator.hospitals().register(hospital)?;
        s.coordinator.hospitals().get(id)
    })
    .await?;
    Ok(created(json!(hospital)))
}

pub async fn list_drivers(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let drivers = blocking(&state, |s| s.coordinator.drivers().list()).await?;
    Ok(Json(json!(drivers)))
}

pub async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(driver): Json<NewDriver>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let driver = blocking(&state, move |s| {
        let id = s.coordinator.drivers().register(driver)?;
        s.coordinator.drivers().get(id)
    })
    .await?;
    Ok(created(json!(driver)))
}

pub async fn update_driver_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(contact): Json<DriverContact>,
) -> ApiResult<Json<Value>> {
    let driver_id = DriverId(id);
    let driver = blocking(&state, move |s| {
        s.coordinator.drivers().update_contact(driver_id, contact)?;
        s.coordinator.drivers().get(driver_id)
    })
    .await?;
    Ok(Json(json!(driver)))
}

pub async fn driver_board(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let board = blocking(&state, move |s| s.views.driver_board(DriverId(id))).await?;
    Ok(Json(json!(board)))
}

pub async fn submit_request(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<TransportSubmission>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let request = blocking(&state, move |s| {
        let id = s.coordinator.submit_request(submission)?;
        s.coordinator.requests().get(id)
    })
    .await?;
    Ok(created(json!(request)))
}

pub async fn submit_emergency(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<UnlinkedSubmission>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let request = blocking(&state, move |s| {
        let id = s.coordinator.submit_unlinked_request(submission)?;
        s.coordinator.requests().get(id)
    })
    .await?;
    Ok(created(json!(request)))
}

pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let request = blocking(&state, move |s| s.coordinator.requests().get(RequestId(id))).await?;
    Ok(Json(json!(request)))
}

/// Open requests in dispatch order
pub async fn dispatch_queue(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let queue = blocking(&state, |s| {
        let open = s
            .coordinator
            .requests()
            .list_by_status(RequestStatus::Requested)?;
        let ranking = lifelink_dispatch::rank(&open);
        Ok(ranking
            .iter()
            .filter_map(|id| open.iter().find(|r| r.id == id).cloned())
            .collect::<Vec<_>>())
    })
    .await?;
    Ok(Json(json!(queue)))
}

#[derive(Debug, Deserialize)]
pub struct DriverBody {
    pub driver_id: DriverId,
}

pub async fn assign_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<DriverBody>,
) -> ApiResult<Json<Value>> {
    let request_id = RequestId(id);
    let request = blocking(&state, move |s| {
        s.coordinator.assign_driver(request_id, body.driver_id)?;
        s.coordinator.requests().get(request_id)
    })
    .await?;
    Ok(Json(json!(request)))
}

pub async fn reassign_driver(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<DriverBody>,
) -> ApiResult<Json<Value>> {
    let request_id = RequestId(id);
    let request = blocking(&state, move |s| {
        s.coordinator.reassign_driver(request_id, body.driver_id)?;
        s.coordinator.requests().get(request_id)
    })
    .await?;
    Ok(Json(json!(request)))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

pub async fn advance_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> ApiResult<Json<Value>> {
    let request_id = RequestId(id);
    let target = parse_status(&body.status)?;
    let request = blocking(&state, move |s| {
        s.coordinator.advance_status(request_id, target)?;
        s.coordinator.requests().get(request_id)
    })
    .await?;
    Ok(Json(json!(request)))
}

pub async fn hospital_outbound(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let requests = blocking(&state, move |s| s.views.outbound(&name)).await?;
    Ok(Json(json!(requests)))
}

pub async fn hospital_inbound(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let requests = blocking(&state, move |s| s.views.inbound(&name)).await?;
    Ok(Json(json!(requests)))
}

pub async fn hospital_listings(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let listings = blocking(&state, move |s| s.views.hospital_listings(&name)).await?;
    Ok(Json(json!(listings)))
}
