use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Fan-out of render events to every kiosk tab watching one host.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// `capacity` bounds how far a slow tab may lag before it skips events.
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::Sender::new(capacity),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Number of tabs currently attached.
    pub fn viewers(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Send `event` to the attached tabs and return how many received it.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}
