//! HTTP control plane for the worker
//!
//! All control endpoints are POST with JSON bodies; acks are plain text
//! and payload endpoints answer JSON. Every credentialed endpoint returns
//! 403 on a mismatched `{prefix, shard_id}` pair, except `shard/stop`,
//! which always answers `Goodbye` and silently ignores a bad caller.

use crate::metrics::METRICS;
use crate::service::{ReifyTask, WorkerError, WorkerService};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use transport::message::{
    BareRequest, ConfigRequest, EnumRequest, NextRequest, ReifyRequest, RingInitRequest, ACK_OK,
    ACK_STOP,
};

/// Build the control-plane router around one worker.
pub fn router(service: WorkerService) -> Router {
    Router::new()
        .route("/", get(status_dump))
        .route("/metrics", get(metrics_dump))
        .route("/shard/config", post(shard_config))
        .route("/shard/wait", post(shard_wait))
        .route("/shard/join", post(shard_join))
        .route("/shard/stop", post(shard_stop))
        .route("/shard/persist", post(reserved_ack))
        .route("/shard/recover", post(reserved_ack))
        .route("/ring/init", post(ring_init))
        .route("/ring/add", post(reserved_ack))
        .route("/ring/del", post(reserved_ack))
        .route("/uow/populate", post(uow_populate))
        .route("/uow/hist", post(uow_hist))
        .route("/uow/next", post(uow_next))
        .route("/uow/enum", post(uow_enum))
        .route("/uow/reify", post(uow_reify))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

fn ack() -> Response {
    (StatusCode::OK, ACK_OK).into_response()
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "Forbidden").into_response()
}

fn error_response(err: WorkerError) -> Response {
    match err {
        WorkerError::Forbidden => forbidden(),
        WorkerError::AlreadyConfigured => (
            StatusCode::FORBIDDEN,
            "Forbidden, worker already configured",
        )
            .into_response(),
        WorkerError::UnknownUow(name) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unknown unit of work: {name}"),
        )
            .into_response(),
        err @ (WorkerError::NotConfigured | WorkerError::NotPopulated) => {
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
    }
}

async fn shard_config(
    State(service): State<WorkerService>,
    Json(req): Json<ConfigRequest>,
) -> Response {
    match service.configure(req.creds, &req.uow_name).await {
        Ok(()) => ack(),
        Err(err) => error_response(err),
    }
}

async fn shard_wait(
    State(service): State<WorkerService>,
    Json(req): Json<BareRequest>,
) -> Response {
    if service.check_creds(&req.creds).is_err() {
        return forbidden();
    }

    service.wait_phase().await;
    ack()
}

async fn shard_join(
    State(service): State<WorkerService>,
    Json(req): Json<BareRequest>,
) -> Response {
    if service.check_creds(&req.creds).is_err() {
        return forbidden();
    }

    service.join_queue().await;
    ack()
}

async fn shard_stop(
    State(service): State<WorkerService>,
    Json(req): Json<BareRequest>,
) -> Response {
    // a wrong-prefix stop is accepted syntactically but suppressed
    if service.check_creds(&req.creds).is_ok() {
        service.request_stop();
    }

    (StatusCode::OK, ACK_STOP).into_response()
}

/// `shard/persist`, `shard/recover`, `ring/add`, `ring/del`: reserved
/// extension points, acked but not acted on.
async fn reserved_ack(
    State(service): State<WorkerService>,
    Json(req): Json<BareRequest>,
) -> Response {
    if service.check_creds(&req.creds).is_err() {
        return forbidden();
    }

    ack()
}

async fn ring_init(
    State(service): State<WorkerService>,
    Json(req): Json<RingInitRequest>,
) -> Response {
    if service.check_creds(&req.creds).is_err() {
        return forbidden();
    }

    match service.ring_init(req.ring).await {
        Ok(()) => ack(),
        Err(err) => error_response(err),
    }
}

async fn uow_populate(
    State(service): State<WorkerService>,
    Json(req): Json<BareRequest>,
) -> Response {
    if service.check_creds(&req.creds).is_err() {
        return forbidden();
    }

    match service.populate().await {
        Ok(()) => ack(),
        Err(err) => error_response(err),
    }
}

async fn uow_hist(
    State(service): State<WorkerService>,
    Json(req): Json<BareRequest>,
) -> Response {
    if service.check_creds(&req.creds).is_err() {
        return forbidden();
    }

    Json(service.hist().await).into_response()
}

async fn uow_next(
    State(service): State<WorkerService>,
    Json(req): Json<NextRequest>,
) -> Response {
    if service.check_creds(&req.creds).is_err() {
        return forbidden();
    }

    match service.next(req.current_gen, req.fitness_cutoff).await {
        Ok(()) => ack(),
        Err(err) => error_response(err),
    }
}

async fn uow_enum(
    State(service): State<WorkerService>,
    Json(req): Json<EnumRequest>,
) -> Response {
    if service.check_creds(&req.creds).is_err() {
        return forbidden();
    }

    Json(service.enumerate(req.fitness_cutoff).await).into_response()
}

async fn uow_reify(
    State(service): State<WorkerService>,
    Json(req): Json<ReifyRequest>,
) -> Response {
    if service.check_creds(&req.creds).is_err() {
        return forbidden();
    }

    let task = ReifyTask {
        gen: req.gen,
        features: req.features,
    };

    match service.enqueue_reify(task).await {
        Ok(()) => ack(),
        Err(err) => error_response(err),
    }
}

/// Diagnostic dump, served as text.
async fn status_dump(State(service): State<WorkerService>) -> Response {
    let status = service.status();
    let body = serde_json::to_string_pretty(&status).unwrap_or_else(|_| status.to_string());
    (StatusCode::OK, body).into_response()
}

async fn metrics_dump() -> Response {
    match METRICS.export() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
