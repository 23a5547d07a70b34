use serde::Serialize;
use tracing::{trace, warn};

use crate::{
    dto::{
        host::NavigateEvent,
        sse::{PhaseChangedEvent, ServerEvent},
    },
    state::{SseHub, kiosk::HostEvent},
};

pub const EVENT_HANDSHAKE: &str = "handshake";
pub const EVENT_PHASE_CHANGED: &str = "phase_changed";
pub const EVENT_SLOT_UPDATED: &str = "slot.updated";
pub const EVENT_INPUT: &str = "input";
pub const EVENT_NAVIGATE: &str = "navigate";

/// Forward a reducer notification to the kiosk render stream.
pub fn broadcast_host_event(hub: &SseHub, event: HostEvent) {
    match event {
        HostEvent::PhaseChanged(snapshot) => {
            send_event(hub, EVENT_PHASE_CHANGED, &PhaseChangedEvent(snapshot))
        }
        HostEvent::SlotUpdated(slot) => send_event(hub, EVENT_SLOT_UPDATED, &slot),
        HostEvent::Input(input) => send_event(hub, EVENT_INPUT, &input),
    }
}

/// Tell the kiosk tab to leave the finished round.
pub fn broadcast_navigate(hub: &SseHub, navigate: &NavigateEvent) {
    send_event(hub, EVENT_NAVIGATE, navigate);
}

pub(crate) fn send_event(hub: &SseHub, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(payload) => {
            if hub.broadcast(payload) == 0 {
                trace!(event, "no kiosk tab attached; render event dropped");
            }
        }
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}
