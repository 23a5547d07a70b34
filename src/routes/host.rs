use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dto::{
        host::{
            KioskSnapshot, LocalInputRequest, PaymentRequest, ReportResultRequest,
            SelectModeRequest, StartHostRequest,
        },
        ids::MachineId,
    },
    error::AppError,
    services::kiosk_service,
    state::SharedState,
};

/// Kiosk-local control of the host running on a machine.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/machines/{id}/host",
            post(start_host).get(get_host).delete(stop_host),
        )
        .route("/machines/{id}/host/mode", post(select_mode))
        .route("/machines/{id}/host/start", post(start_round))
        .route("/machines/{id}/host/input", post(local_input))
        .route("/machines/{id}/host/result", post(report_result))
        .route("/machines/{id}/host/payment", post(request_payment))
        .route("/machines/{id}/host/payment/approved", post(approve_payment))
}

/// Start hosting a machine.
#[utoipa::path(
    post,
    path = "/machines/{id}/host",
    tag = "host",
    params(("id" = String, Path, description = "Machine to host")),
    request_body = StartHostRequest,
    responses(
        (status = 201, description = "Host started in setup", body = KioskSnapshot),
        (status = 400, description = "Game not enabled on the machine"),
        (status = 409, description = "Machine already hosted")
    )
)]
pub async fn start_host(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Option<Json<StartHostRequest>>,
) -> Result<(StatusCode, Json<KioskSnapshot>), AppError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let snapshot = kiosk_service::start_host(&state, MachineId::new(id), request).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// Current round state.
#[utoipa::path(
    get,
    path = "/machines/{id}/host",
    tag = "host",
    params(("id" = String, Path, description = "Hosted machine")),
    responses(
        (status = 200, description = "Round snapshot", body = KioskSnapshot),
        (status = 404, description = "No host running")
    )
)]
pub async fn get_host(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<KioskSnapshot>, AppError> {
    Ok(Json(
        kiosk_service::snapshot(&state, &MachineId::new(id)).await?,
    ))
}

/// Tear the host down: heartbeat stopped, topic released.
#[utoipa::path(
    delete,
    path = "/machines/{id}/host",
    tag = "host",
    params(("id" = String, Path, description = "Hosted machine")),
    responses(
        (status = 204, description = "Host stopped"),
        (status = 404, description = "No host running")
    )
)]
pub async fn stop_host(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    kiosk_service::stop_host(&state, &MachineId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Operator picks single or two player mode.
#[utoipa::path(
    post,
    path = "/machines/{id}/host/mode",
    tag = "host",
    params(("id" = String, Path, description = "Hosted machine")),
    request_body = SelectModeRequest,
    responses(
        (status = 200, description = "Lobby opened", body = KioskSnapshot),
        (status = 409, description = "Not in setup")
    )
)]
pub async fn select_mode(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<SelectModeRequest>,
) -> Result<Json<KioskSnapshot>, AppError> {
    Ok(Json(
        kiosk_service::select_mode(&state, &MachineId::new(id), request).await?,
    ))
}

/// Local START button.
#[utoipa::path(
    post,
    path = "/machines/{id}/host/start",
    tag = "host",
    params(("id" = String, Path, description = "Hosted machine")),
    responses(
        (status = 200, description = "Round started", body = KioskSnapshot),
        (status = 409, description = "Not in the lobby")
    )
)]
pub async fn start_round(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<KioskSnapshot>, AppError> {
    Ok(Json(
        kiosk_service::start_round(&state, &MachineId::new(id)).await?,
    ))
}

/// Trusted keyboard or button input from the kiosk itself.
#[utoipa::path(
    post,
    path = "/machines/{id}/host/input",
    tag = "host",
    params(("id" = String, Path, description = "Hosted machine")),
    request_body = LocalInputRequest,
    responses(
        (status = 200, description = "Input applied", body = KioskSnapshot),
        (status = 400, description = "Unknown key or seat")
    )
)]
pub async fn local_input(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<LocalInputRequest>,
) -> Result<Json<KioskSnapshot>, AppError> {
    Ok(Json(
        kiosk_service::local_input(&state, &MachineId::new(id), request).await?,
    ))
}

/// Outcome reported by a key-driven minigame.
#[utoipa::path(
    post,
    path = "/machines/{id}/host/result",
    tag = "host",
    params(("id" = String, Path, description = "Hosted machine")),
    request_body = ReportResultRequest,
    responses(
        (status = 200, description = "Round finished", body = KioskSnapshot),
        (status = 409, description = "No round in progress")
    )
)]
pub async fn report_result(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(request): Json<ReportResultRequest>,
) -> Result<Json<KioskSnapshot>, AppError> {
    Ok(Json(
        kiosk_service::report_result(&state, &MachineId::new(id), request.winner).await?,
    ))
}

/// Hand the phones off to a checkout page.
#[utoipa::path(
    post,
    path = "/machines/{id}/host/payment",
    tag = "host",
    params(("id" = String, Path, description = "Hosted machine")),
    request_body = PaymentRequest,
    responses(
        (status = 200, description = "Payment announced", body = KioskSnapshot),
        (status = 400, description = "Invalid payment URL"),
        (status = 409, description = "Not in setup")
    )
)]
pub async fn request_payment(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(request)): Valid<Json<PaymentRequest>>,
) -> Result<Json<KioskSnapshot>, AppError> {
    Ok(Json(
        kiosk_service::request_payment(&state, &MachineId::new(id), request).await?,
    ))
}

/// Tell the phones the payment went through.
#[utoipa::path(
    post,
    path = "/machines/{id}/host/payment/approved",
    tag = "host",
    params(("id" = String, Path, description = "Hosted machine")),
    responses(
        (status = 200, description = "Approval announced", body = KioskSnapshot),
        (status = 409, description = "Not in setup")
    )
)]
pub async fn approve_payment(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<KioskSnapshot>, AppError> {
    Ok(Json(
        kiosk_service::approve_payment(&state, &MachineId::new(id)).await?,
    ))
}
