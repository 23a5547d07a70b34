use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod host;
pub mod machines;
pub mod sse;
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(websocket::router())
        .merge(sse::router())
        .merge(host::router())
        .merge(machines::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
