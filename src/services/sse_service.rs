use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dto::{ids::MachineId, sse::{Handshake, ServerEvent}},
    error::ServiceError,
    services::sse_events::EVENT_HANDSHAKE,
    state::SharedState,
};

/// Subscribe to the render stream of the host running on `machine`.
///
/// The receiver is registered before the snapshot is taken, so no event that follows the
/// handshake can be missed.
pub async fn subscribe_render(
    state: &SharedState,
    machine: &MachineId,
) -> Result<(broadcast::Receiver<ServerEvent>, ServerEvent), ServiceError> {
    let host = state.host(machine)?;
    let receiver = host.render().subscribe();
    let snapshot = host.snapshot().await?;

    let handshake = Handshake {
        machine_id: machine.to_string(),
        degraded: state.is_degraded().await,
        snapshot,
    };
    let event = ServerEvent::json(Some(EVENT_HANDSHAKE.to_string()), &handshake)
        .map_err(|err| ServiceError::InvalidState(format!("handshake encoding failed: {err}")))?;
    Ok((receiver, event))
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a broadcast receiver into an SSE response, starting with `first`
/// and forwarding events until the client disconnects.
pub fn to_sse_stream(
    machine: MachineId,
    first: ServerEvent,
    mut receiver: broadcast::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from broadcast and pushes into mpsc
    tokio::spawn(async move {
        if tx.send(Ok(to_event(first))).await.is_err() {
            return;
        }
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => {
                            info!(machine = %machine, "host stopped; closing render stream");
                            break;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(machine = %machine, skipped, "render stream lagged");
                            continue;
                        }
                    }
                }
            }
        }
        info!(machine = %machine, "render stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dto::host::VisiblePhase,
        services::host_service::{HostSettings, spawn_host},
        state::{
            AppState,
            game::{GameKind, GameTuning, RaceRules},
        },
    };

    #[tokio::test]
    async fn handshake_carries_the_current_snapshot() {
        let state = AppState::new(AppConfig::default());
        let machine = MachineId::new("kiosk-1");
        let host = spawn_host(
            machine.clone(),
            HostSettings {
                game: GameKind::Trivia,
                tuning: GameTuning::default(),
                rules: RaceRules::default(),
                timings: state.config().timings(),
            },
            state.transport(),
        );
        state.hosts().insert(machine.clone(), host.clone());

        let (_receiver, handshake) = subscribe_render(&state, &machine).await.unwrap();
        assert_eq!(handshake.event.as_deref(), Some(EVENT_HANDSHAKE));
        let payload: serde_json::Value = serde_json::from_str(&handshake.data).unwrap();
        assert_eq!(payload["machine_id"], "kiosk-1");
        assert_eq!(payload["degraded"], true);
        assert_eq!(payload["snapshot"]["game"], "trivia");
        assert_eq!(
            host.snapshot().await.unwrap().phase,
            VisiblePhase::Setup
        );
        host.shutdown().await;
    }

    #[tokio::test]
    async fn render_stream_requires_a_running_host() {
        let state = AppState::new(AppConfig::default());
        let err = subscribe_render(&state, &MachineId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
