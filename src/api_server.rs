use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::bridge::{Bridge, DeviceStatus};
use crate::hub::{Accessory, CharacteristicStore};
use crate::mapper::{self, Characteristic, CharacteristicValue, ServiceKind};

#[derive(Clone)]
pub struct ApiState {
    pub bridge: Arc<Bridge>,
    pub store: Arc<CharacteristicStore>,
}

#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub value: CharacteristicValue,
}

#[derive(Debug, Serialize)]
pub struct AccessoryListResponse {
    pub accessories: Vec<Accessory>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub devices: Vec<DeviceStatus>,
}

#[derive(Debug, Serialize)]
pub struct CharacteristicResponse {
    pub accessory: Uuid,
    pub service: String,
    pub characteristic: Characteristic,
    pub value: CharacteristicValue,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/accessories", get(list_accessories))
        .route("/accessories/:id", get(get_accessory))
        .route(
            "/accessories/:id/:service/:characteristic",
            get(get_characteristic).put(set_characteristic),
        )
        .route("/events", get(events))
        .layer(cors)
        .with_state(state)
}

pub async fn start_api_server(bridge: Arc<Bridge>, store: Arc<CharacteristicStore>, port: u16) -> Result<()> {
    let app = router(ApiState { bridge, store });

    let addr = format!("0.0.0.0:{port}");
    info!("🌐 HTTP API server listening on http://{}", addr);
    info!("   API endpoints:");
    info!("   - GET  /accessories                          List accessories");
    info!("   - GET  /accessories/:id                      Get accessory");
    info!("   - GET  /accessories/:id/:service/:char       Read characteristic");
    info!("   - PUT  /accessories/:id/:service/:char       Write characteristic");
    info!("   - GET  /events                               Characteristic updates (SSE)");
    info!("   - GET  /health                               Health check");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Beoplay HomeKit Bridge API v1.0"
}

async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            devices: state.bridge.statuses(),
        }),
    )
}

async fn list_accessories(State(state): State<ApiState>) -> impl IntoResponse {
    let accessories = state.store.all();
    let total = accessories.len();
    (StatusCode::OK, Json(AccessoryListResponse { accessories, total }))
}

fn parse_id(id: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(id)
        .map_err(|_| error_response(StatusCode::NOT_FOUND, format!("Accessory not found: {id}")))
}

async fn get_accessory(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let uuid = match parse_id(&id) {
        Ok(uuid) => uuid,
        Err(response) => return response,
    };

    match state.store.get(&uuid) {
        Some(accessory) => (StatusCode::OK, Json(accessory)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Accessory not found: {id}")),
    }
}

async fn get_characteristic(
    State(state): State<ApiState>,
    Path((id, service, characteristic)): Path<(String, String, String)>,
) -> Response {
    let uuid = match parse_id(&id) {
        Ok(uuid) => uuid,
        Err(response) => return response,
    };
    let Ok(parsed) = characteristic.parse::<Characteristic>() else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Unknown characteristic: {characteristic}"),
        );
    };

    match state.store.value(&uuid, &service, parsed) {
        Some(value) => (
            StatusCode::OK,
            Json(CharacteristicResponse {
                accessory: uuid,
                service,
                characteristic: parsed,
                value,
            }),
        )
            .into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("Characteristic not found: {service}.{characteristic}"),
        ),
    }
}

async fn set_characteristic(
    State(state): State<ApiState>,
    Path((id, service, characteristic)): Path<(String, String, String)>,
    Json(payload): Json<WriteRequest>,
) -> Response {
    info!("API: Set {}/{}/{} to {}", id, service, characteristic, payload.value);

    let uuid = match parse_id(&id) {
        Ok(uuid) => uuid,
        Err(response) => return response,
    };
    let Some(session) = state.bridge.session(&uuid) else {
        return error_response(StatusCode::NOT_FOUND, format!("Accessory not found: {id}"));
    };

    let binding = match (service.parse::<ServiceKind>(), characteristic.parse::<Characteristic>()) {
        (Ok(service_kind), Ok(parsed)) => session
            .bindings()
            .iter()
            .find(|b| b.service == service_kind && b.characteristic == parsed)
            .copied(),
        _ => None,
    };
    let Some(binding) = binding else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("No writable characteristic {service}.{characteristic} on {id}"),
        );
    };

    match mapper::write(&session, &binding, &payload.value).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ok", "accessory": id, "value": payload.value})),
        )
            .into_response(),
        Err(e) => {
            warn!("API: Rejected write to {}/{}/{}: {}", id, service, characteristic, e);
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

async fn events(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let updates = state.store.subscribe();

    let stream = stream::unfold(updates, |mut updates| async move {
        loop {
            match updates.recv().await {
                Ok(update) => {
                    let event = Event::default().event("characteristic").json_data(&update);
                    return Some((event, updates));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("API: Event subscriber lagged, skipped {} updates", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
