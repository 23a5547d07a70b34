use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::{ids::MachineId, message::ChannelFrame},
    state::SharedState,
    transport::{Subscription, Transport},
};

/// Bridge one browser socket to the topic of `machine`.
///
/// Every frame published on the topic is written to the socket as JSON text, and every JSON
/// text frame read from the socket is published on the topic.
pub async fn handle_socket(state: SharedState, machine: MachineId, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let transport = state.transport();
    let subscription = transport.subscribe(&machine);
    let forward_task = tokio::spawn(forward_topic(subscription, outbound_tx.clone()));
    info!(machine = %machine, "socket attached to topic");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                relay_text(transport.as_ref(), &machine, &text).await;
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(machine = %machine, error = %err, "websocket error");
                break;
            }
        }
    }

    // Aborting the forwarder drops its subscription, which releases the topic.
    forward_task.abort();
    let _ = forward_task.await;
    info!(machine = %machine, "socket detached from topic");

    finalize(writer_task, outbound_tx).await;
}

/// Publish a JSON text frame read from a socket; returns `false` when it was dropped.
async fn relay_text(transport: &dyn Transport, machine: &MachineId, text: &str) -> bool {
    match ChannelFrame::from_json_str(text) {
        Ok(frame) => {
            if let Some(message) = frame.as_game() {
                debug!(machine = %machine, kind = message.kind(), "frame from socket");
            }
            transport.publish(machine, frame).await;
            true
        }
        Err(err) => {
            warn!(machine = %machine, error = %err, "dropping malformed socket frame");
            false
        }
    }
}

/// Copy topic frames onto the socket writer until either side goes away.
async fn forward_topic(
    mut subscription: Subscription,
    outbound_tx: mpsc::UnboundedSender<Message>,
) {
    while let Some(frame) = subscription.recv().await {
        let payload = match serde_json::to_string(&frame) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "failed to serialize channel frame");
                continue;
            }
        };
        if outbound_tx.send(Message::Text(payload.into())).is_err() {
            break;
        }
    }
    subscription.unsubscribe();
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
