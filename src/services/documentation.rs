use utoipa::OpenApi;

#[derive(OpenApi)]
/// OpenAPI document of the kiosk joystick service.
#[openapi(
    info(
        title = "kiosk-joystick",
        description = "Kiosk host control, machine profiles and the phone joystick channel."
    ),
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
        crate::routes::sse::render_stream,
        crate::routes::host::start_host,
        crate::routes::host::get_host,
        crate::routes::host::stop_host,
        crate::routes::host::select_mode,
        crate::routes::host::start_round,
        crate::routes::host::local_input,
        crate::routes::host::report_result,
        crate::routes::host::request_payment,
        crate::routes::host::approve_payment,
        crate::routes::machines::list_machines,
        crate::routes::machines::get_machine,
        crate::routes::machines::upsert_machine,
        crate::routes::machines::delete_machine,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::message::GameMessage,
            crate::dto::message::RemoteState,
            crate::dto::message::ControlLayout,
            crate::dto::host::KioskSnapshot,
            crate::dto::host::SlotSnapshot,
            crate::dto::host::VisiblePhase,
            crate::dto::host::InputEvent,
            crate::dto::host::NavigateEvent,
            crate::dto::host::NavigationTarget,
            crate::dto::sse::Handshake,
            crate::dto::sse::PhaseChangedEvent,
            crate::dto::machine::MachineProfile,
            crate::dto::machine::UpsertMachineRequest,
            crate::state::game::GameKind,
            crate::state::game::GameTuning,
            crate::state::game::PlayMode,
            crate::state::state_machine::RoundOutcome,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "channel", description = "WebSocket bridge to a machine topic"),
        (name = "sse", description = "Kiosk render stream"),
        (name = "host", description = "Kiosk-local control of the round"),
        (name = "machines", description = "Machine profiles in the record store"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_the_host_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<_> = doc.paths.paths.keys().cloned().collect();
        for expected in [
            "/healthcheck",
            "/ws/{machine_id}",
            "/sse/machines/{id}",
            "/machines/{id}/host",
            "/machines/{id}/host/payment/approved",
            "/machines",
        ] {
            assert!(paths.iter().any(|path| path == expected), "missing {expected}");
        }
    }
}
