use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the record store and report the service status.
///
/// Hosts keep running without a store, so a failed probe only flips the status to degraded.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_machine_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "record store health check failed");
            }
        }
        Err(_) => warn!("record store unavailable (degraded mode)"),
    }

    HealthResponse::new(state.is_degraded().await, state.hosts().len())
}
