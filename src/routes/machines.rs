use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::machine::{MachineProfile, UpsertMachineRequest},
    error::AppError,
    services::machine_service,
    state::SharedState,
};

/// Record-store CRUD for machine profiles.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/machines", get(list_machines))
        .route(
            "/machines/{id}",
            get(get_machine).put(upsert_machine).delete(delete_machine),
        )
}

/// List every machine profile.
#[utoipa::path(
    get,
    path = "/machines",
    tag = "machines",
    responses(
        (status = 200, description = "Machine profiles", body = [MachineProfile]),
        (status = 503, description = "Record store unavailable")
    )
)]
pub async fn list_machines(
    State(state): State<SharedState>,
) -> Result<Json<Vec<MachineProfile>>, AppError> {
    Ok(Json(machine_service::list_machines(&state).await?))
}

#[utoipa::path(
    get,
    path = "/machines/{id}",
    tag = "machines",
    params(("id" = String, Path, description = "Machine identifier")),
    responses(
        (status = 200, description = "Machine profile", body = MachineProfile),
        (status = 404, description = "Unknown machine")
    )
)]
pub async fn get_machine(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<MachineProfile>, AppError> {
    Ok(Json(machine_service::get_machine(&state, &id).await?))
}

/// Create or replace a machine profile.
#[utoipa::path(
    put,
    path = "/machines/{id}",
    tag = "machines",
    params(("id" = String, Path, description = "Machine identifier")),
    request_body = UpsertMachineRequest,
    responses(
        (status = 200, description = "Profile saved", body = MachineProfile),
        (status = 400, description = "Invalid identifier or tuning")
    )
)]
pub async fn upsert_machine(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(request)): Valid<Json<UpsertMachineRequest>>,
) -> Result<Json<MachineProfile>, AppError> {
    Ok(Json(
        machine_service::upsert_machine(&state, id, request).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/machines/{id}",
    tag = "machines",
    params(("id" = String, Path, description = "Machine identifier")),
    responses(
        (status = 204, description = "Profile deleted"),
        (status = 404, description = "Unknown machine")
    )
)]
pub async fn delete_machine(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    machine_service::delete_machine(&state, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
