//! Named broadcast topics scoped to one physical machine.
//!
//! Both the kiosk host and the joystick client only see the [`Transport`] trait; the
//! in-process [`ChannelHub`] is the implementation served to browsers over WebSocket.

mod hub;

use futures::future::BoxFuture;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    watch,
};
use tracing::warn;

use crate::dto::{ids::MachineId, message::ChannelFrame};

pub use self::hub::ChannelHub;

/// Lifecycle of a subscription as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Subscription requested, not yet confirmed.
    Connecting,
    /// The listener is live; publications from now on will be delivered.
    Subscribed,
    /// The topic handle was released or the transport went away.
    Closed,
}

/// Best-effort publish/subscribe over per-machine topics.
pub trait Transport: Send + Sync + 'static {
    /// Open (or reuse) the topic of `machine` and listen to every frame published on it,
    /// including the subscriber's own publications.
    fn subscribe(&self, machine: &MachineId) -> Subscription;

    /// Fan `frame` out to the current subscribers of the topic. No acknowledgement, no retry:
    /// a frame published while nobody listens is lost.
    fn publish(&self, machine: &MachineId, frame: ChannelFrame) -> BoxFuture<'static, ()>;
}

type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// Handle on a live topic listener. Dropping it releases the topic handle.
pub struct Subscription {
    frames: Option<broadcast::Receiver<ChannelFrame>>,
    status: watch::Receiver<ChannelStatus>,
    release: Option<ReleaseHook>,
}

impl Subscription {
    /// Assemble a subscription from its frame receiver and status watch.
    pub fn new(
        frames: broadcast::Receiver<ChannelFrame>,
        status: watch::Receiver<ChannelStatus>,
    ) -> Self {
        Self {
            frames: Some(frames),
            status,
            release: None,
        }
    }

    /// Run `hook` once the subscription has been released.
    pub fn on_release(mut self, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    /// Current status of the subscription.
    pub fn status(&self) -> ChannelStatus {
        *self.status.borrow()
    }

    /// Watch on the subscription status, usable while frames are being received.
    pub fn status_watch(&self) -> watch::Receiver<ChannelStatus> {
        self.status.clone()
    }

    /// Wait until the transport confirms the listener is live.
    ///
    /// Returns `false` when the subscription closed before being confirmed. Callers must bound
    /// this wait themselves since a partitioned transport never confirms.
    pub async fn wait_subscribed(&mut self) -> bool {
        match self
            .status
            .wait_for(|status| *status != ChannelStatus::Connecting)
            .await
        {
            Ok(status) => *status == ChannelStatus::Subscribed,
            Err(_) => false,
        }
    }

    /// Next frame published on the topic, or `None` once the topic is gone.
    ///
    /// Frames missed by a lagging listener are skipped.
    pub async fn recv(&mut self) -> Option<ChannelFrame> {
        let frames = self.frames.as_mut()?;
        loop {
            match frames.recv().await {
                Ok(frame) => return Some(frame),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged behind; frames dropped");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Release the topic handle; no further frames are delivered.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The receiver must be gone before the hook inspects the topic.
        drop(self.frames.take());
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
