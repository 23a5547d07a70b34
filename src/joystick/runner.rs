//! Drives a [`JoystickClient`] over a [`Transport`]: owns the subscription and the timers, and
//! tears both down when the phone unmounts.

use std::{future, sync::Arc};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, info, trace, warn};

use crate::{
    config::Timings,
    dto::{
        ids::{MachineId, SessionId},
        message::{ChannelFrame, ControlLayout, LogicalKey},
    },
    joystick::client::{ClientEffect, ClientScreen, JoystickClient},
    transport::{ChannelStatus, Subscription, Transport},
};

const ACTION_CAPACITY: usize = 16;

/// Button actions coming from the phone UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoystickAction {
    Press(LogicalKey),
    Start,
}

/// What the phone renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoystickView {
    pub screen: ClientScreen,
    pub layout: Option<ControlLayout>,
    pub seated: bool,
    /// Set once the kiosk handed the phone off to a payment page.
    pub navigated_to: Option<String>,
}

impl JoystickView {
    fn of(client: &JoystickClient, navigated_to: Option<String>) -> Self {
        Self {
            screen: client.screen(),
            layout: client.layout(),
            seated: client.is_seated(),
            navigated_to,
        }
    }
}

/// Handle on a mounted joystick. Unmounting unsubscribes and clears every timer.
pub struct JoystickHandle {
    actions: mpsc::Sender<JoystickAction>,
    view: watch::Receiver<JoystickView>,
    task: JoinHandle<()>,
}

impl JoystickHandle {
    /// Forward a button press; `false` once the joystick is gone.
    pub async fn press(&self, key: LogicalKey) -> bool {
        self.actions.send(JoystickAction::Press(key)).await.is_ok()
    }

    pub async fn start(&self) -> bool {
        self.actions.send(JoystickAction::Start).await.is_ok()
    }

    /// Latest rendered view.
    pub fn view(&self) -> JoystickView {
        self.view.borrow().clone()
    }

    /// Watch the rendered view.
    pub fn watch(&self) -> watch::Receiver<JoystickView> {
        self.view.clone()
    }

    /// Unmount the joystick and wait for its teardown.
    pub async fn unmount(self) {
        drop(self.actions);
        let _ = self.task.await;
    }
}

/// Mount a joystick for the link `raw_path` and run it until unmounted.
pub fn spawn_joystick(
    transport: Arc<dyn Transport>,
    raw_path: &str,
    session: SessionId,
    timings: Timings,
) -> JoystickHandle {
    let client = JoystickClient::new(raw_path, session);
    let (actions_tx, actions_rx) = mpsc::channel(ACTION_CAPACITY);
    let (view_tx, view_rx) = watch::channel(JoystickView::of(&client, None));

    let runner = JoystickRunner {
        transport,
        timings,
        client,
        subscription: None,
        status: None,
        fallback_at: None,
        stale_at: None,
        navigated_to: None,
        view: view_tx,
    };
    let task = tokio::spawn(runner.run(actions_rx));

    JoystickHandle {
        actions: actions_tx,
        view: view_rx,
        task,
    }
}

struct JoystickRunner {
    transport: Arc<dyn Transport>,
    timings: Timings,
    client: JoystickClient,
    subscription: Option<Subscription>,
    status: Option<watch::Receiver<ChannelStatus>>,
    fallback_at: Option<Instant>,
    stale_at: Option<Instant>,
    navigated_to: Option<String>,
    view: watch::Sender<JoystickView>,
}

impl JoystickRunner {
    async fn run(mut self, mut actions: mpsc::Receiver<JoystickAction>) {
        match self.client.target() {
            Ok(path) => info!(machine = %path.machine, player = path.player, "joystick mounted"),
            Err(err) => warn!(error = %err, "joystick link rejected"),
        }
        let effects = self.client.mount();
        self.apply(effects).await;

        loop {
            let confirm_pending = self.status.is_some() && !self.client.is_subscribed();
            let fallback_at = self.fallback_at;
            let stale_at = self.stale_at;

            let effects = tokio::select! {
                confirmed = wait_confirmed(&mut self.status), if confirm_pending => {
                    if confirmed {
                        debug!("subscription confirmed");
                        self.client.on_subscribed()
                    } else {
                        warn!("subscription closed before confirmation");
                        self.status = None;
                        Vec::new()
                    }
                }
                frame = next_frame(&mut self.subscription) => match frame {
                    Some(ChannelFrame::Game(message)) => self.client.on_message(&message),
                    Some(ChannelFrame::Foreign(_)) => Vec::new(),
                    None => {
                        warn!("machine topic closed");
                        self.subscription = None;
                        Vec::new()
                    }
                },
                _ = sleep_until(fallback_at.unwrap_or_else(Instant::now)),
                    if fallback_at.is_some() =>
                {
                    self.fallback_at = None;
                    self.client.on_fallback();
                    Vec::new()
                }
                _ = sleep_until(stale_at.unwrap_or_else(Instant::now)), if stale_at.is_some() => {
                    self.stale_at = None;
                    self.client.on_stale();
                    Vec::new()
                }
                action = actions.recv() => match action {
                    Some(JoystickAction::Press(key)) => self.client.press(key),
                    Some(JoystickAction::Start) => self.client.request_start(),
                    None => break,
                },
            };
            self.apply(effects).await;
        }

        self.fallback_at = None;
        self.stale_at = None;
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        info!("joystick unmounted");
    }

    async fn apply(&mut self, effects: Vec<ClientEffect>) {
        for effect in effects {
            match effect {
                ClientEffect::Subscribe(machine) => {
                    let subscription = self.transport.subscribe(&machine);
                    self.status = Some(subscription.status_watch());
                    self.subscription = Some(subscription);
                }
                ClientEffect::Publish(message) => {
                    if let Some(machine) = self.client.machine().cloned() {
                        self.publish(&machine, message.into()).await;
                    }
                }
                ClientEffect::ArmFallback => {
                    self.fallback_at = Some(Instant::now() + self.timings.client_fallback);
                }
                ClientEffect::ScheduleStale => {
                    self.stale_at = Some(Instant::now() + self.timings.client_stale);
                }
                ClientEffect::Haptic => trace!("haptic pulse"),
                ClientEffect::Navigate(url) => {
                    info!(url, "handing off to payment page");
                    self.navigated_to = Some(url);
                }
            }
        }
        self.view
            .send_replace(JoystickView::of(&self.client, self.navigated_to.clone()));
    }

    async fn publish(&self, machine: &MachineId, frame: ChannelFrame) {
        self.transport.publish(machine, frame).await;
    }
}

async fn wait_confirmed(status: &mut Option<watch::Receiver<ChannelStatus>>) -> bool {
    let Some(status) = status.as_mut() else {
        return future::pending().await;
    };
    match status
        .wait_for(|status| *status != ChannelStatus::Connecting)
        .await
    {
        Ok(status) => *status == ChannelStatus::Subscribed,
        Err(_) => false,
    }
}

async fn next_frame(subscription: &mut Option<Subscription>) -> Option<ChannelFrame> {
    match subscription.as_mut() {
        Some(subscription) => subscription.recv().await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Mutex,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use futures::future::BoxFuture;
    use tokio::{sync::broadcast, time::timeout};

    use super::*;
    use crate::{
        dto::{host::VisiblePhase, message::GameMessage},
        services::host_service::{HostOp, HostSettings, spawn_host},
        state::game::{GameKind, GameTuning, PlayMode, RaceRules},
        transport::ChannelHub,
    };

    /// Transport whose subscriptions are never confirmed.
    #[derive(Default)]
    struct StalledTransport {
        subscribes: AtomicUsize,
        published: Mutex<Vec<ChannelFrame>>,
        held: Mutex<Vec<(broadcast::Sender<ChannelFrame>, watch::Sender<ChannelStatus>)>>,
    }

    impl Transport for StalledTransport {
        fn subscribe(&self, _machine: &MachineId) -> Subscription {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            let (frames_tx, frames_rx) = broadcast::channel(8);
            let (status_tx, status_rx) = watch::channel(ChannelStatus::Connecting);
            self.held.lock().unwrap().push((frames_tx, status_tx));
            Subscription::new(frames_rx, status_rx)
        }

        fn publish(&self, _machine: &MachineId, frame: ChannelFrame) -> BoxFuture<'static, ()> {
            self.published.lock().unwrap().push(frame);
            Box::pin(future::ready(()))
        }
    }

    async fn wait_view(
        handle: &JoystickHandle,
        wanted: impl Fn(&JoystickView) -> bool,
    ) -> JoystickView {
        let mut view = handle.watch();
        timeout(Duration::from_secs(10), view.wait_for(|view| wanted(view)))
            .await
            .expect("view never reached the expected state")
            .expect("joystick stopped")
            .clone()
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_link_never_subscribes() {
        let transport = Arc::new(StalledTransport::default());
        let handle = spawn_joystick(
            transport.clone(),
            "",
            SessionId::new("phone-x"),
            Timings::default(),
        );

        assert!(handle.press(LogicalKey::Shoot).await);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(handle.view().screen, ClientScreen::NoMachineId);
        assert_eq!(transport.subscribes.load(Ordering::SeqCst), 0);
        assert!(transport.published.lock().unwrap().is_empty());
        handle.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_transport_falls_back_without_joining() {
        let transport = Arc::new(StalledTransport::default());
        let handle = spawn_joystick(
            transport.clone(),
            "kiosk-1",
            SessionId::new("phone-x"),
            Timings::default(),
        );

        let started = Instant::now();
        let view = wait_view(&handle, |view| view.screen == ClientScreen::Ready).await;
        assert!(started.elapsed() >= Timings::default().client_fallback);
        assert!(!view.seated);
        assert_eq!(transport.subscribes.load(Ordering::SeqCst), 1);
        assert!(transport.published.lock().unwrap().is_empty());
        handle.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn phone_joins_and_drives_a_race() {
        let hub = Arc::new(ChannelHub::default());
        let machine = MachineId::new("kiosk-1");
        let host = spawn_host(
            machine.clone(),
            HostSettings {
                game: GameKind::TapRace,
                tuning: GameTuning::default(),
                rules: RaceRules::default(),
                timings: Timings::default(),
            },
            hub.clone(),
        );
        host.apply(HostOp::SelectMode(PlayMode::SinglePlayer))
            .await
            .unwrap();

        let phone = spawn_joystick(
            hub.clone(),
            "/kiosk-1",
            SessionId::new("phone-x"),
            Timings::default(),
        );
        let view = wait_view(&phone, |view| view.seated && view.layout.is_some()).await;
        assert_eq!(view.screen, ClientScreen::Ready);
        assert_eq!(view.layout, Some(ControlLayout::Taprace));

        // A tap from the seated phone starts the round.
        assert!(phone.press(LogicalKey::Letter('A')).await);
        wait_view(&phone, |view| view.screen == ClientScreen::Playing).await;
        assert_eq!(host.snapshot().await.unwrap().phase, VisiblePhase::Playing);

        host.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn late_phone_converges_on_the_host_state() {
        let hub = Arc::new(ChannelHub::default());
        let machine = MachineId::new("kiosk-1");
        let host = spawn_host(
            machine.clone(),
            HostSettings {
                game: GameKind::Simon,
                tuning: GameTuning::default(),
                rules: RaceRules::default(),
                timings: Timings::default(),
            },
            hub.clone(),
        );
        host.apply(HostOp::SelectMode(PlayMode::SinglePlayer))
            .await
            .unwrap();

        // The phone is already subscribed but its JOIN and the reply are lost.
        let dropping = Arc::new(StalledTransport::default());
        let phone = spawn_joystick(
            dropping.clone(),
            "kiosk-1",
            SessionId::new("phone-x"),
            Timings::default(),
        );
        wait_view(&phone, |view| view.screen == ClientScreen::Ready).await;

        // Only the heartbeat reaches it.
        let mut relay = hub.subscribe(&machine);
        let heartbeat = timeout(Duration::from_secs(5), async {
            loop {
                if let Some(ChannelFrame::Game(message @ GameMessage::StateChange { .. })) =
                    relay.recv().await
                {
                    return message;
                }
            }
        })
        .await
        .unwrap();
        let frames = dropping.held.lock().unwrap()[0].0.clone();
        frames.send(heartbeat.into()).unwrap();

        let view = wait_view(&phone, |view| view.layout.is_some()).await;
        assert_eq!(view.screen, ClientScreen::Ready);
        assert_eq!(view.layout, Some(ControlLayout::Simon));
        assert_eq!(host.snapshot().await.unwrap().phase, VisiblePhase::Lobby);
        host.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_releases_the_topic() {
        let hub = Arc::new(ChannelHub::default());
        let machine = MachineId::new("kiosk-1");
        let phone = spawn_joystick(
            hub.clone(),
            "kiosk-1-P2",
            SessionId::new("phone-x"),
            Timings::default(),
        );
        wait_view(&phone, |view| view.screen == ClientScreen::Ready).await;
        assert_eq!(hub.subscriber_count(&machine), 1);

        phone.unmount().await;
        assert_eq!(hub.subscriber_count(&machine), 0);
        assert_eq!(hub.topic_count(), 0);
    }
}
