use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    dto::ids::MachineId, error::AppError, services::sse_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/machines/{id}",
    tag = "sse",
    params(("id" = String, Path, description = "Hosted machine")),
    responses(
        (
            status = 200,
            description = "Render stream of the kiosk tab",
            content_type = "text/event-stream",
            body = String
        ),
        (status = 404, description = "No host running on the machine")
    )
)]
/// Stream round events (`handshake`, `phase_changed`, `slot.updated`, `input`, `navigate`).
pub async fn render_stream(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let machine = MachineId::new(id);
    let (receiver, handshake) = sse_service::subscribe_render(&state, &machine).await?;
    info!(machine = %machine, "render stream connected");
    Ok(sse_service::to_sse_stream(machine, handshake, receiver))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/machines/{id}", get(render_stream))
}
