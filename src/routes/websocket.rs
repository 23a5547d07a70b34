use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{dto::ids::MachineId, services::websocket_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/ws/{machine_id}",
    tag = "channel",
    params(("machine_id" = String, Path, description = "Machine whose topic the socket joins")),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a socket bridged to the machine topic.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(machine_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let machine = MachineId::new(machine_id);
    ws.on_upgrade(move |socket| websocket_service::handle_socket(state, machine, socket))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws/{machine_id}", get(ws_handler))
}
