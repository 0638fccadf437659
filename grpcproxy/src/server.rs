//! # HTTP surface
//!
//! | Route | Purpose |
//! |---|---|
//! | `POST /rpc` | Invoke a method. The body is a [`TargetRequest`]. |
//! | `GET /list` | List services and their methods. |
//! | `GET /describe` | Describe one service, method, message or enum. |
//!
//! Every failure is answered with `400 Bad Request` and a `{"error": {...}}` body, except for
//! failures reported after the first response message of a call, which are appended to the
//! already streaming body as its last line.
mod rpc;


use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use grpcproxy_core::{
    error::{ErrorPayload, GatewayError},
    gateway::{Gateway, SchemaQuery, TargetRequest},
    json::encoder::ResponseEncoder,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct AppState {
    gateway: Gateway,
    encoder: ResponseEncoder,
}

pub fn router(gateway: Gateway) -> Router {
    let state = AppState {
        gateway,
        encoder: ResponseEncoder::new(),
    };

    Router::new()
        .route("/rpc", post(invoke))
        .route("/list", get(list))
        .route("/describe", get(describe))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DescribeParams {
    #[serde(flatten)]
    schema: SchemaQuery,
    symbol: Option<String>,
}

async fn invoke(State(state): State<AppState>, body: Bytes) -> Response {
    let request: TargetRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => return failure(GatewayError::InvalidRequest(err.to_string())),
    };

    tracing::info!(address = %request.address, method = %request.method, "rpc");

    match state.gateway.call(request).await {
        Ok(invocation) => rpc::respond(invocation, state.encoder).await,
        Err(err) => failure(err),
    }
}

async fn list(
    State(state): State<AppState>,
    query: Result<Query<SchemaQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return failure(GatewayError::InvalidRequest(rejection.body_text())),
    };

    match state.gateway.list(&query).await {
        Ok(services) => Json(serde_json::json!({ "services": services })).into_response(),
        Err(err) => failure(err),
    }
}

async fn describe(
    State(state): State<AppState>,
    params: Result<Query<DescribeParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => return failure(GatewayError::InvalidRequest(rejection.body_text())),
    };

    let Some(symbol) = params.symbol.filter(|s| !s.trim().is_empty()) else {
        return failure(GatewayError::InvalidRequest(
            "missing `symbol` query parameter".to_string(),
        ));
    };

    match state.gateway.describe(&params.schema, symbol.trim()).await {
        Ok(description) => Json(description).into_response(),
        Err(err) => failure(err),
    }
}

fn failure(err: GatewayError) -> Response {
    tracing::warn!(stage = ?err.stage(), kind = %err.kind(), error = %err, "request failed");
    bad_request(err.payload())
}

fn bad_request(payload: ErrorPayload) -> Response {
    (StatusCode::BAD_REQUEST, Json(payload.to_json())).into_response()
}
