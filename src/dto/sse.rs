use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::host::KioskSnapshot;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// First event sent to a kiosk tab when it opens the render stream.
pub struct Handshake {
    /// Machine whose host the stream follows.
    pub machine_id: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
    /// Round state at subscription time.
    pub snapshot: KioskSnapshot,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast whenever the round phase changes.
pub struct PhaseChangedEvent(pub KioskSnapshot);
