use serde::Serialize;
use utoipa::ToSchema;

/// Payload of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct HealthResponse {
    /// "ok", or "degraded" while no record store is reachable.
    pub status: String,
    /// Number of machines currently hosted by this process.
    pub hosts: usize,
}

impl HealthResponse {
    pub fn new(degraded: bool, hosts: usize) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            hosts,
        }
    }
}
