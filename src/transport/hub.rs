use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{self, BoxFuture};
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

use crate::{
    dto::{ids::MachineId, message::ChannelFrame},
    transport::{ChannelStatus, Subscription, Transport},
};

/// Frames buffered per topic before a slow listener starts lagging.
pub const DEFAULT_TOPIC_CAPACITY: usize = 64;

type Topics = DashMap<String, broadcast::Sender<ChannelFrame>>;

/// In-process fan-out hub: one broadcast channel per machine topic.
pub struct ChannelHub {
    topics: Arc<Topics>,
    capacity: usize,
}

impl Default for ChannelHub {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }
}

impl ChannelHub {
    /// Build a hub whose topics buffer `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of live listeners on the topic of `machine`.
    pub fn subscriber_count(&self, machine: &MachineId) -> usize {
        self.topics
            .get(&machine.topic())
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Number of topics currently open.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

impl Transport for ChannelHub {
    fn subscribe(&self, machine: &MachineId) -> Subscription {
        let topic = machine.topic();
        let frames = {
            // Subscribing under the entry guard keeps pruning from racing a new listener.
            let sender = self
                .topics
                .entry(topic.clone())
                .or_insert_with(|| broadcast::channel(self.capacity).0);
            sender.subscribe()
        };
        debug!(topic, "topic subscribed");

        // The in-process listener is live as soon as the receiver exists.
        let (_status_tx, status) = watch::channel(ChannelStatus::Subscribed);
        let topics = Arc::clone(&self.topics);
        Subscription::new(frames, status).on_release(move || {
            if topics
                .remove_if(&topic, |_, sender| sender.receiver_count() == 0)
                .is_some()
            {
                debug!(topic, "topic pruned");
            }
        })
    }

    fn publish(&self, machine: &MachineId, frame: ChannelFrame) -> BoxFuture<'static, ()> {
        let topic = machine.topic();
        match self.topics.get(&topic) {
            Some(sender) => {
                let delivered = sender.send(frame).unwrap_or(0);
                trace!(topic, delivered, "frame published");
            }
            None => trace!(topic, "frame dropped: no subscriber"),
        }
        Box::pin(future::ready(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::message::GameMessage;

    fn machine() -> MachineId {
        MachineId::new("kiosk-1")
    }

    #[tokio::test]
    async fn subscriber_receives_its_own_publications() {
        let hub = ChannelHub::default();
        let mut subscription = hub.subscribe(&machine());
        assert!(subscription.wait_subscribed().await);

        hub.publish(&machine(), GameMessage::GameOver.into()).await;
        assert_eq!(
            subscription.recv().await,
            Some(ChannelFrame::Game(GameMessage::GameOver))
        );
    }

    #[tokio::test]
    async fn topics_are_isolated_per_machine() {
        let hub = ChannelHub::default();
        let mut other = hub.subscribe(&MachineId::new("kiosk-2"));
        let _mine = hub.subscribe(&machine());

        hub.publish(&machine(), GameMessage::Timeout.into()).await;
        hub.publish(&MachineId::new("kiosk-2"), GameMessage::GameOver.into())
            .await;
        assert_eq!(
            other.recv().await,
            Some(ChannelFrame::Game(GameMessage::GameOver))
        );
    }

    #[tokio::test]
    async fn frames_without_listeners_are_lost() {
        let hub = ChannelHub::default();
        hub.publish(&machine(), GameMessage::GameOver.into()).await;
        assert_eq!(hub.topic_count(), 0);

        let mut late = hub.subscribe(&machine());
        hub.publish(&machine(), GameMessage::Timeout.into()).await;
        assert_eq!(
            late.recv().await,
            Some(ChannelFrame::Game(GameMessage::Timeout))
        );
    }

    #[tokio::test]
    async fn unsubscribing_the_last_listener_prunes_the_topic() {
        let hub = ChannelHub::default();
        let first = hub.subscribe(&machine());
        let second = hub.subscribe(&machine());
        assert_eq!(hub.subscriber_count(&machine()), 2);

        first.unsubscribe();
        assert_eq!(hub.topic_count(), 1);
        second.unsubscribe();
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn lagging_listener_skips_missed_frames() {
        let hub = ChannelHub::new(2);
        let mut slow = hub.subscribe(&machine());
        for _ in 0..4 {
            hub.publish(&machine(), GameMessage::GameOver.into()).await;
        }
        hub.publish(&machine(), GameMessage::Timeout.into()).await;

        let mut last = None;
        while let Ok(Some(frame)) =
            tokio::time::timeout(std::time::Duration::from_millis(10), slow.recv()).await
        {
            last = Some(frame);
        }
        assert_eq!(last, Some(ChannelFrame::Game(GameMessage::Timeout)));
    }
}
