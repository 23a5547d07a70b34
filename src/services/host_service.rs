//! Kiosk host: one task per hosted machine, sole owner of the round and its seats.
//!
//! Remote frames, local commands, phase deadlines and the bot tick are multiplexed in a single
//! `select!` loop, so reducer calls never interleave. The heartbeat runs beside the loop and
//! reads the latest announcement through a `watch` channel.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior, interval, interval_at, sleep_until},
};
use tracing::{debug, info, trace, warn};

use crate::{
    config::Timings,
    dto::{
        host::{KioskSnapshot, NavigateEvent, NavigationTarget},
        ids::{MachineId, SlotId},
        message::{ChannelFrame, GameMessage},
    },
    services::sse_events,
    state::{
        SseHub,
        game::{GameKind, GameTuning, PlayMode, RaceRules},
        kiosk::{HostEvent, KioskError, KioskSession, LocalInput, Outbound},
        state_machine::{KioskPhase, RoundOutcome},
    },
    transport::{Subscription, Transport},
};

const COMMAND_CAPACITY: usize = 32;
const RENDER_CAPACITY: usize = 64;

/// Errors returned to callers of a [`HostHandle`].
#[derive(Debug, Error)]
pub enum HostError {
    /// The round refused the command.
    #[error(transparent)]
    Rejected(#[from] KioskError),
    /// The host task is gone.
    #[error("host for machine `{0}` is not running")]
    Stopped(MachineId),
}

/// Operator and local-input commands applied to the round.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    SelectMode(PlayMode),
    Local(LocalInput),
    ReportResult(Option<SlotId>),
    RequestPayment(String),
    ApprovePayment,
}

enum HostCommand {
    Apply {
        op: HostOp,
        reply: oneshot::Sender<Result<KioskSnapshot, KioskError>>,
    },
    Snapshot(oneshot::Sender<KioskSnapshot>),
    Shutdown,
}

/// Settings fixed for the lifetime of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSettings {
    pub game: GameKind,
    pub tuning: GameTuning,
    pub rules: RaceRules,
    pub timings: Timings,
}

/// Cloneable handle used by the REST layer to drive a host task.
#[derive(Clone)]
pub struct HostHandle {
    machine: MachineId,
    game: GameKind,
    commands: mpsc::Sender<HostCommand>,
    render: Arc<SseHub>,
}

impl HostHandle {
    pub fn machine(&self) -> &MachineId {
        &self.machine
    }

    pub fn game(&self) -> GameKind {
        self.game
    }

    /// Render stream of the kiosk tab.
    pub fn render(&self) -> &Arc<SseHub> {
        &self.render
    }

    /// Whether the host task is still alive.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Apply `op` to the round and return the resulting snapshot.
    pub async fn apply(&self, op: HostOp) -> Result<KioskSnapshot, HostError> {
        let (reply, response) = oneshot::channel();
        self.send(HostCommand::Apply { op, reply }).await?;
        let result = response.await.map_err(|_| self.stopped())?;
        Ok(result?)
    }

    /// Current round state.
    pub async fn snapshot(&self) -> Result<KioskSnapshot, HostError> {
        let (reply, response) = oneshot::channel();
        self.send(HostCommand::Snapshot(reply)).await?;
        response.await.map_err(|_| self.stopped())
    }

    /// Stop the host and wait until its task has released the topic.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(HostCommand::Shutdown).await;
        self.commands.closed().await;
    }

    async fn send(&self, command: HostCommand) -> Result<(), HostError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| self.stopped())
    }

    fn stopped(&self) -> HostError {
        HostError::Stopped(self.machine.clone())
    }
}

/// Start hosting `machine`: subscribe to its topic and spawn the host task.
///
/// The subscription is opened before returning, so frames published after this call are seen.
pub fn spawn_host(
    machine: MachineId,
    settings: HostSettings,
    transport: Arc<dyn Transport>,
) -> HostHandle {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    let render = Arc::new(SseHub::new(RENDER_CAPACITY));
    let subscription = transport.subscribe(&machine);

    let host = KioskHost::new(machine.clone(), settings, transport, render.clone());
    tokio::spawn(host.run(subscription, commands_rx));

    HostHandle {
        machine,
        game: settings.game,
        commands: commands_tx,
        render,
    }
}

/// Repeating rebroadcast of the host state, cancelled when dropped.
pub struct HeartbeatTask {
    handle: JoinHandle<()>,
}

impl HeartbeatTask {
    /// Republish the latest value of `announcement` every `period`, starting one period from now.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        machine: MachineId,
        announcement: watch::Receiver<Option<GameMessage>>,
        period: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let current = announcement.borrow().clone();
                if let Some(message) = current {
                    trace!(machine = %machine, kind = message.kind(), "heartbeat");
                    transport.publish(&machine, message.into()).await;
                }
            }
        });
        Self { handle }
    }
}

impl Drop for HeartbeatTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct KioskHost {
    machine: MachineId,
    settings: HostSettings,
    transport: Arc<dyn Transport>,
    render: Arc<SseHub>,
    session: KioskSession,
    announcement: watch::Sender<Option<GameMessage>>,
    heartbeat: Option<HeartbeatTask>,
    phase_deadline: Option<Instant>,
    armed_version: usize,
    bot: Interval,
}

impl KioskHost {
    fn new(
        machine: MachineId,
        settings: HostSettings,
        transport: Arc<dyn Transport>,
        render: Arc<SseHub>,
    ) -> Self {
        let mut bot = interval(settings.timings.bot_tick);
        bot.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let (announcement, _) = watch::channel(None);

        Self {
            session: fresh_session(&machine, &settings),
            machine,
            settings,
            transport,
            render,
            announcement,
            heartbeat: None,
            phase_deadline: None,
            armed_version: 0,
            bot,
        }
    }

    async fn run(
        mut self,
        mut subscription: Subscription,
        mut commands: mpsc::Receiver<HostCommand>,
    ) {
        info!(machine = %self.machine, game = ?self.settings.game, "kiosk host started");
        self.enter_round().await;

        loop {
            let deadline = self.phase_deadline;
            let bot_running = self.bot_running();

            tokio::select! {
                frame = subscription.recv() => match frame {
                    Some(ChannelFrame::Game(message)) => {
                        let effects = self.session.handle_remote(&message);
                        self.dispatch(effects).await;
                    }
                    Some(ChannelFrame::Foreign(_)) => {
                        trace!(machine = %self.machine, "foreign frame ignored");
                    }
                    None => {
                        warn!(machine = %self.machine, "machine topic closed; stopping host");
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(HostCommand::Apply { op, reply }) => {
                        let result = self.apply(op).await;
                        let _ = reply.send(result);
                    }
                    Some(HostCommand::Snapshot(reply)) => {
                        let _ = reply.send(self.session.snapshot());
                    }
                    Some(HostCommand::Shutdown) | None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_phase_deadline().await;
                }
                _ = self.bot.tick(), if bot_running => {
                    let effects = self.session.bot_tick();
                    self.dispatch(effects).await;
                }
            }
        }

        self.heartbeat.take();
        subscription.unsubscribe();
        info!(machine = %self.machine, "kiosk host stopped");
    }

    async fn apply(&mut self, op: HostOp) -> Result<KioskSnapshot, KioskError> {
        debug!(machine = %self.machine, ?op, "local command");
        let effects = match op {
            HostOp::SelectMode(mode) => self.session.select_mode(mode)?,
            HostOp::Local(input) => self.session.handle_local(input)?,
            HostOp::ReportResult(winner) => self.session.report_result(winner)?,
            HostOp::RequestPayment(url) => self.session.request_payment(url)?,
            HostOp::ApprovePayment => self.session.approve_payment()?,
        };
        self.dispatch(effects).await;
        Ok(self.session.snapshot())
    }

    async fn dispatch(&mut self, effects: Vec<Outbound>) {
        for effect in effects {
            match effect {
                Outbound::Publish(message) => self.publish(message).await,
                Outbound::Notify(event) => sse_events::broadcast_host_event(&self.render, event),
            }
        }

        self.announcement.send_replace(self.session.heartbeat());
        if self.session.version() != self.armed_version {
            self.armed_version = self.session.version();
            self.arm_phase();
        }
    }

    async fn publish(&self, message: GameMessage) {
        trace!(machine = %self.machine, kind = message.kind(), "publishing");
        self.transport
            .publish(&self.machine, ChannelFrame::from(message))
            .await;
    }

    /// Recompute the deadline of the current phase and start the heartbeat once past setup.
    fn arm_phase(&mut self) {
        let timings = self.settings.timings;
        let phase = self.session.phase();
        let after = match phase {
            KioskPhase::Setup => timings.setup,
            KioskPhase::Lobby => timings.lobby,
            KioskPhase::Playing => Duration::from_secs(self.settings.tuning.duration_secs),
            KioskPhase::Result(_) => timings.result_delay,
        };
        self.phase_deadline = Instant::now().checked_add(after);
        if self.phase_deadline.is_none() {
            warn!(machine = %self.machine, ?phase, ?after, "phase timer out of range; not armed");
        }

        if phase == KioskPhase::Playing {
            self.bot.reset();
        }
        if phase != KioskPhase::Setup && self.heartbeat.is_none() {
            debug!(machine = %self.machine, "heartbeat started");
            self.heartbeat = Some(HeartbeatTask::spawn(
                self.transport.clone(),
                self.machine.clone(),
                self.announcement.subscribe(),
                timings.heartbeat,
            ));
        }
    }

    async fn on_phase_deadline(&mut self) {
        self.phase_deadline = None;
        let effects = match self.session.phase() {
            KioskPhase::Setup => {
                info!(machine = %self.machine, "setup timer expired; defaulting mode");
                self.session.setup_timer_expired()
            }
            KioskPhase::Lobby => {
                info!(machine = %self.machine, "lobby timer expired; starting round");
                self.session.lobby_timer_expired()
            }
            KioskPhase::Playing => {
                info!(machine = %self.machine, "round timer expired");
                self.session.round_timer_expired()
            }
            KioskPhase::Result(outcome) => {
                self.finish_round(outcome).await;
                return;
            }
        };
        self.dispatch(effects).await;
    }

    async fn finish_round(&mut self, outcome: RoundOutcome) {
        let navigate = NavigateEvent {
            target: if outcome.is_win() {
                NavigationTarget::Payout
            } else {
                NavigationTarget::Idle
            },
            winner: outcome.winner(),
        };
        info!(machine = %self.machine, target = ?navigate.target, "round finished");
        sse_events::broadcast_navigate(&self.render, &navigate);
        self.enter_round().await;
    }

    /// Replace the round with a fresh one in setup; the previous heartbeat is cancelled.
    async fn enter_round(&mut self) {
        self.heartbeat = None;
        self.session = fresh_session(&self.machine, &self.settings);
        self.armed_version = self.session.version();
        self.announcement.send_replace(None);
        self.arm_phase();

        sse_events::broadcast_host_event(
            &self.render,
            HostEvent::PhaseChanged(self.session.snapshot()),
        );
        self.publish(self.session.announcement()).await;
    }

    fn bot_running(&self) -> bool {
        self.settings.game.is_race() && self.session.phase() == KioskPhase::Playing
    }
}

fn fresh_session(machine: &MachineId, settings: &HostSettings) -> KioskSession {
    KioskSession::new(
        machine.clone(),
        settings.game,
        settings.tuning,
        settings.rules,
    )
}

#[cfg(test)]
mod tests {
    use tokio::{
        sync::broadcast,
        time::{sleep, timeout},
    };

    use super::*;
    use crate::{
        dto::{
            host::VisiblePhase,
            ids::{SessionId, SessionToken},
            message::{ControlLayout, RemoteState},
            sse::ServerEvent,
        },
        transport::ChannelHub,
    };

    const WAIT: Duration = Duration::from_secs(10);

    fn settings() -> HostSettings {
        HostSettings {
            game: GameKind::TapRace,
            tuning: GameTuning::default(),
            rules: RaceRules::default(),
            timings: Timings::default(),
        }
    }

    fn machine() -> MachineId {
        MachineId::new("kiosk-1")
    }

    fn session(raw: &str) -> SessionToken {
        SessionId::new(raw).into()
    }

    async fn next_message(
        subscription: &mut Subscription,
        wanted: impl Fn(&GameMessage) -> bool,
    ) -> GameMessage {
        timeout(WAIT, async {
            loop {
                if let Some(ChannelFrame::Game(message)) = subscription.recv().await {
                    if wanted(&message) {
                        return message;
                    }
                }
            }
        })
        .await
        .expect("expected message was never published")
    }

    async fn next_event(
        events: &mut broadcast::Receiver<ServerEvent>,
        name: &str,
        wanted: impl Fn(&serde_json::Value) -> bool,
    ) -> serde_json::Value {
        timeout(WAIT, async {
            loop {
                match events.recv().await {
                    Ok(event) if event.event.as_deref() == Some(name) => {
                        let payload: serde_json::Value = serde_json::from_str(&event.data).unwrap();
                        if wanted(&payload) {
                            return payload;
                        }
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => panic!("render stream closed"),
                }
            }
        })
        .await
        .expect("expected render event was never emitted")
    }

    fn is_state(state: RemoteState) -> impl Fn(&GameMessage) -> bool {
        move |message| matches!(message, GameMessage::StateChange { state: s, .. } if *s == state)
    }

    #[tokio::test(start_paused = true)]
    async fn late_listener_converges_within_one_heartbeat() {
        let hub = Arc::new(ChannelHub::default());
        let host = spawn_host(machine(), settings(), hub.clone());
        host.apply(HostOp::SelectMode(PlayMode::SinglePlayer))
            .await
            .unwrap();

        // Subscribes after READY went out, as if the broadcast was dropped.
        let mut phone = hub.subscribe(&machine());
        let started = Instant::now();
        let message = next_message(&mut phone, is_state(RemoteState::Ready)).await;

        assert!(started.elapsed() <= Timings::default().heartbeat);
        assert_eq!(
            message,
            GameMessage::broadcast_state(RemoteState::Ready, Some(ControlLayout::Taprace))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_heartbeat_during_setup() {
        let hub = Arc::new(ChannelHub::default());
        let host = spawn_host(machine(), settings(), hub.clone());
        // The snapshot round trip guarantees the setup announcement is already out.
        host.snapshot().await.unwrap();
        let mut phone = hub.subscribe(&machine());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let snapshot = host.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, VisiblePhase::Setup);

        let mut heard = 0;
        while let Ok(Some(_)) = timeout(Duration::from_millis(1), phone.recv()).await {
            heard += 1;
        }
        assert_eq!(heard, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lobby_timer_starts_the_race_without_second_player() {
        let hub = Arc::new(ChannelHub::default());
        let host = spawn_host(machine(), settings(), hub.clone());
        host.apply(HostOp::SelectMode(PlayMode::TwoPlayers))
            .await
            .unwrap();

        tokio::time::sleep(Timings::default().lobby + Duration::from_secs(1)).await;
        let snapshot = host.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, VisiblePhase::Playing);
        let second = snapshot.slots.iter().find(|slot| slot.id == 2).unwrap();
        assert!(!second.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn setup_timer_defaults_to_single_player() {
        let hub = Arc::new(ChannelHub::default());
        let host = spawn_host(machine(), settings(), hub.clone());

        tokio::time::sleep(Timings::default().setup + Duration::from_secs(1)).await;
        let snapshot = host.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, VisiblePhase::Lobby);
        assert_eq!(snapshot.mode, Some(PlayMode::SinglePlayer));
    }

    #[tokio::test(start_paused = true)]
    async fn single_player_round_through_the_hub() {
        let hub = Arc::new(ChannelHub::default());
        let host = spawn_host(machine(), settings(), hub.clone());
        let mut render = host.render().subscribe();
        let mut phone = hub.subscribe(&machine());

        host.apply(HostOp::SelectMode(PlayMode::SinglePlayer))
            .await
            .unwrap();

        hub.publish(
            &machine(),
            GameMessage::Join {
                player_id: 1,
                session_id: session("x"),
            }
            .into(),
        )
        .await;
        let reply = next_message(&mut phone, is_state(RemoteState::ConnectionSuccess)).await;
        assert_eq!(
            reply,
            GameMessage::reply(RemoteState::ConnectionSuccess, session("x"))
        );

        hub.publish(
            &machine(),
            GameMessage::Start {
                session_id: session("x"),
            }
            .into(),
        )
        .await;
        next_message(&mut phone, is_state(RemoteState::Playing)).await;

        for _ in 0..50 {
            hub.publish(
                &machine(),
                GameMessage::Tap {
                    player_id: 1,
                    session_id: session("x"),
                }
                .into(),
            )
            .await;
        }
        next_message(&mut phone, |message| *message == GameMessage::GameOver).await;

        let snapshot = host.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, VisiblePhase::Result);
        assert_eq!(snapshot.outcome, Some(RoundOutcome::Won { winner: 1 }));

        let navigate = next_event(&mut render, sse_events::EVENT_NAVIGATE, |_| true).await;
        assert_eq!(navigate["target"], "payout");
        assert_eq!(navigate["winner"], 1);

        let snapshot = host.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, VisiblePhase::Setup);
        assert!(snapshot.slots.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hijacking_taps_do_not_move_the_slot() {
        let hub = Arc::new(ChannelHub::default());
        let host = spawn_host(machine(), settings(), hub.clone());
        let mut render = host.render().subscribe();
        let mut phone = hub.subscribe(&machine());

        host.apply(HostOp::SelectMode(PlayMode::SinglePlayer))
            .await
            .unwrap();
        hub.publish(
            &machine(),
            GameMessage::Join {
                player_id: 1,
                session_id: session("x"),
            }
            .into(),
        )
        .await;
        next_message(&mut phone, is_state(RemoteState::ConnectionSuccess)).await;
        host.apply(HostOp::Local(LocalInput::Start)).await.unwrap();

        let tap = |sender: &str| -> ChannelFrame {
            GameMessage::Tap {
                player_id: 1,
                session_id: session(sender),
            }
            .into()
        };
        let progress_of_first = |snapshot: &KioskSnapshot| {
            snapshot
                .slots
                .iter()
                .find(|slot| slot.id == 1)
                .map(|slot| slot.progress)
        };

        hub.publish(&machine(), tap("y")).await;
        sleep(Duration::from_millis(10)).await;
        let snapshot = host.snapshot().await.unwrap();
        assert_eq!(progress_of_first(&snapshot), Some(0));

        hub.publish(&machine(), tap("x")).await;
        let slot = next_event(&mut render, sse_events::EVENT_SLOT_UPDATED, |slot| {
            slot["id"] == 1 && slot["progress"].as_u64().is_some_and(|progress| progress > 0)
        })
        .await;
        assert_eq!(slot["progress"], RaceRules::default().tap_step);

        sleep(Duration::from_millis(10)).await;
        let snapshot = host.snapshot().await.unwrap();
        assert_eq!(progress_of_first(&snapshot), Some(RaceRules::default().tap_step));
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_round_duration_leaves_the_host_running() {
        let hub = Arc::new(ChannelHub::default());
        let mut overflowing = settings();
        overflowing.tuning.duration_secs = u64::MAX;
        let host = spawn_host(machine(), overflowing, hub.clone());

        host.apply(HostOp::SelectMode(PlayMode::SinglePlayer))
            .await
            .unwrap();
        host.apply(HostOp::Local(LocalInput::Start)).await.unwrap();

        let snapshot = host.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, VisiblePhase::Playing);
        assert!(host.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn busy_reply_carries_the_rejected_session() {
        let hub = Arc::new(ChannelHub::default());
        let host = spawn_host(machine(), settings(), hub.clone());
        let mut phone = hub.subscribe(&machine());
        host.apply(HostOp::SelectMode(PlayMode::SinglePlayer))
            .await
            .unwrap();

        for sender in ["x", "y"] {
            hub.publish(
                &machine(),
                GameMessage::Join {
                    player_id: 1,
                    session_id: session(sender),
                }
                .into(),
            )
            .await;
        }

        let busy = next_message(&mut phone, is_state(RemoteState::Busy)).await;
        assert_eq!(busy, GameMessage::reply(RemoteState::Busy, session("y")));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_the_topic_and_stops_the_heartbeat() {
        let hub = Arc::new(ChannelHub::default());
        let host = spawn_host(machine(), settings(), hub.clone());
        let mut phone = hub.subscribe(&machine());
        host.apply(HostOp::SelectMode(PlayMode::SinglePlayer))
            .await
            .unwrap();
        assert_eq!(hub.subscriber_count(&machine()), 2);

        host.shutdown().await;
        assert_eq!(hub.subscriber_count(&machine()), 1);
        assert!(!host.is_running());
        assert!(matches!(
            host.snapshot().await,
            Err(HostError::Stopped(_))
        ));

        // Drain what was published before the shutdown, then expect silence.
        while let Ok(Some(_)) = timeout(Duration::from_millis(1), phone.recv()).await {}
        let heard = timeout(Duration::from_secs(10), phone.recv()).await;
        assert!(heard.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn local_commands_are_rejected_in_the_wrong_phase() {
        let hub = Arc::new(ChannelHub::default());
        let host = spawn_host(machine(), settings(), hub);
        let err = host
            .apply(HostOp::Local(LocalInput::Start))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HostError::Rejected(KioskError::InvalidTransition(_))
        ));
    }
}
