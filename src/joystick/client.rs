//! Phone-side state machine. It owns no I/O: every call returns the effects the runner must
//! perform (subscribe, publish, arm a timer, navigate).

use tracing::{debug, trace};

use crate::{
    dto::{
        ids::{MachineId, SessionId, SessionToken},
        message::{ControlLayout, GameMessage, LogicalKey, RemoteState},
    },
    joystick::path::{PathError, PlayerPath},
};

/// What the phone currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientScreen {
    /// Created, not mounted yet.
    Initializing,
    /// Mounted, waiting for the subscription and the first state from the kiosk.
    WaitingForSubscribe,
    Ready,
    Waiting,
    Playing,
    /// Payment hand-off in progress.
    Paying,
    /// The requested seat belongs to another phone.
    Busy,
    /// The link carries no usable machine id. Terminal.
    NoMachineId,
}

/// Side effect requested by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEffect {
    Subscribe(MachineId),
    Publish(GameMessage),
    /// (Re)start the fallback timer that leaves the spinner if no state arrives.
    ArmFallback,
    /// Start the timer after which the seat is considered stale.
    ScheduleStale,
    /// Short vibration acknowledging a press.
    Haptic,
    /// Full navigation away from the joystick page.
    Navigate(String),
}

/// Joystick client for one phone tab.
#[derive(Debug, Clone)]
pub struct JoystickClient {
    target: Result<PlayerPath, PathError>,
    session: SessionId,
    screen: ClientScreen,
    layout: Option<ControlLayout>,
    subscribed: bool,
    heard_state: bool,
    seated: bool,
    stale: bool,
}

impl JoystickClient {
    /// Build a client for the raw link segment `raw_path`, using `session` as seat capability.
    pub fn new(raw_path: &str, session: SessionId) -> Self {
        let target = raw_path.parse::<PlayerPath>();
        let screen = match target {
            Ok(_) => ClientScreen::Initializing,
            Err(_) => ClientScreen::NoMachineId,
        };
        Self {
            target,
            session,
            screen,
            layout: None,
            subscribed: false,
            heard_state: false,
            seated: false,
            stale: false,
        }
    }

    pub fn screen(&self) -> ClientScreen {
        self.screen
    }

    /// Control layout to render, once the kiosk announced one.
    pub fn layout(&self) -> Option<ControlLayout> {
        self.layout
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Machine and seat the link points at.
    pub fn target(&self) -> Result<&PlayerPath, &PathError> {
        self.target.as_ref()
    }

    pub fn machine(&self) -> Option<&MachineId> {
        self.target.as_ref().ok().map(|path| &path.machine)
    }

    /// Whether the transport confirmed the subscription.
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Whether the kiosk confirmed this phone owns its seat.
    pub fn is_seated(&self) -> bool {
        self.seated
    }

    /// Whether the seat went stale after a round ended.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Open the machine topic. A malformed link never subscribes.
    pub fn mount(&mut self) -> Vec<ClientEffect> {
        let Ok(path) = &self.target else {
            return Vec::new();
        };
        if self.screen != ClientScreen::Initializing {
            return Vec::new();
        }
        self.screen = ClientScreen::WaitingForSubscribe;
        vec![
            ClientEffect::Subscribe(path.machine.clone()),
            ClientEffect::ArmFallback,
        ]
    }

    /// The transport confirmed the listener: only now is JOIN safe to publish.
    pub fn on_subscribed(&mut self) -> Vec<ClientEffect> {
        if self.subscribed || self.target.is_err() {
            return Vec::new();
        }
        self.subscribed = true;
        match self.join() {
            Some(join) => vec![ClientEffect::Publish(join), ClientEffect::ArmFallback],
            None => Vec::new(),
        }
    }

    /// No state arrived in time; show the controls anyway.
    pub fn on_fallback(&mut self) {
        if !self.heard_state && self.screen == ClientScreen::WaitingForSubscribe {
            debug!(session = %self.session, "no state from kiosk; showing controls");
            self.screen = ClientScreen::Ready;
        }
    }

    /// The post-round delay elapsed: the next round needs a fresh JOIN.
    pub fn on_stale(&mut self) {
        self.stale = true;
        self.seated = false;
    }

    /// Apply a message received on the machine topic.
    pub fn on_message(&mut self, message: &GameMessage) -> Vec<ClientEffect> {
        match message {
            GameMessage::StateChange {
                state,
                game,
                payment_url,
                session_id,
            } => self.on_state(*state, *game, payment_url.as_deref(), session_id),
            GameMessage::GameOver | GameMessage::Timeout => {
                if self.target.is_err() {
                    return Vec::new();
                }
                self.heard_state = true;
                self.screen = ClientScreen::Waiting;
                vec![ClientEffect::ScheduleStale]
            }
            // Phone traffic, including this client's own echo.
            GameMessage::Join { .. }
            | GameMessage::Keydown { .. }
            | GameMessage::Tap { .. }
            | GameMessage::Start { .. } => Vec::new(),
        }
    }

    fn on_state(
        &mut self,
        state: RemoteState,
        game: Option<ControlLayout>,
        payment_url: Option<&str>,
        session: &SessionToken,
    ) -> Vec<ClientEffect> {
        if self.target.is_err() {
            return Vec::new();
        }
        let addressed = session.is(&self.session);
        let reply = matches!(state, RemoteState::ConnectionSuccess | RemoteState::Busy);
        if (!session.is_anonymous() || reply) && !addressed {
            trace!(session = %self.session, ?state, "state addressed to another phone");
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.heard_state = true;
        if let Some(layout) = game {
            self.layout = Some(layout);
        }

        match state {
            RemoteState::ConnectionSuccess => {
                self.seated = true;
                if matches!(
                    self.screen,
                    ClientScreen::WaitingForSubscribe | ClientScreen::Busy
                ) {
                    self.screen = ClientScreen::Ready;
                }
            }
            RemoteState::Busy => {
                self.seated = false;
                self.screen = ClientScreen::Busy;
            }
            RemoteState::Ready if self.stale => {
                self.stale = false;
                self.screen = ClientScreen::Ready;
                if let Some(join) = self.join() {
                    effects.push(ClientEffect::Publish(join));
                }
            }
            // The seat is taken until the round ends.
            _ if self.screen == ClientScreen::Busy => {}
            RemoteState::Ready => self.screen = ClientScreen::Ready,
            RemoteState::Playing => self.screen = ClientScreen::Playing,
            RemoteState::Waiting
            | RemoteState::WaitingSelection
            | RemoteState::PaymentApproved => self.screen = ClientScreen::Waiting,
            RemoteState::Paying => {
                self.screen = ClientScreen::Paying;
                if let Some(url) = payment_url {
                    effects.push(ClientEffect::Navigate(url.to_string()));
                }
            }
        }
        effects
    }

    /// Forward a button press: `TAP` on tap-race layouts, `KEYDOWN` everywhere else.
    ///
    /// Legality is left to the kiosk.
    pub fn press(&mut self, key: LogicalKey) -> Vec<ClientEffect> {
        let Some(path) = self.mounted_path() else {
            return Vec::new();
        };
        let session = self.token();
        let message = match self.layout {
            Some(ControlLayout::Taprace | ControlLayout::TapraceSetup) => GameMessage::Tap {
                player_id: path.player,
                session_id: session,
            },
            _ => GameMessage::Keydown {
                key: key.to_string(),
                session_id: session,
            },
        };
        vec![ClientEffect::Haptic, ClientEffect::Publish(message)]
    }

    /// Ask the kiosk to leave the lobby.
    pub fn request_start(&mut self) -> Vec<ClientEffect> {
        if self.mounted_path().is_none() {
            return Vec::new();
        }
        vec![
            ClientEffect::Haptic,
            ClientEffect::Publish(GameMessage::Start {
                session_id: self.token(),
            }),
        ]
    }

    fn mounted_path(&self) -> Option<&PlayerPath> {
        match self.screen {
            ClientScreen::Initializing | ClientScreen::NoMachineId => None,
            _ => self.target.as_ref().ok(),
        }
    }

    fn join(&self) -> Option<GameMessage> {
        let path = self.target.as_ref().ok()?;
        Some(GameMessage::Join {
            player_id: path.player,
            session_id: self.token(),
        })
    }

    fn token(&self) -> SessionToken {
        self.session.clone().into()
    }
}
