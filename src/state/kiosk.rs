//! Authoritative round state of a kiosk: seats, phase and the rules applied to every message.
//!
//! A [`KioskSession`] is created when a round enters setup and dropped when the next round
//! starts. Every mutation goes through it and returns the [`Outbound`] effects the host must
//! carry out, so the reducer itself never touches the network or the clock.

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::{
    dto::{
        host::{InputEvent, KioskSnapshot, SlotSnapshot, VisiblePhase},
        ids::{MachineId, SessionToken, SlotId},
        message::{GameMessage, LogicalKey, RemoteState},
    },
    state::{
        game::{GameKind, GameTuning, PlayMode, RaceRules},
        slots::{BOT_SLOT, InputVerdict, JoinOutcome, SlotRoster},
        state_machine::{
            InvalidTransition, KioskPhase, PhaseEvent, RoundOutcome, RoundStateMachine,
        },
    },
};

/// Effect produced by the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Publish on the machine topic.
    Publish(GameMessage),
    /// Notify the local render stream.
    Notify(HostEvent),
}

/// Event destined to the kiosk tab rendering the game.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    PhaseChanged(KioskSnapshot),
    SlotUpdated(SlotSnapshot),
    Input(InputEvent),
}

/// Trusted input coming from the kiosk itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalInput {
    Start,
    Tap(SlotId),
    Key(LogicalKey),
}

/// Input attributed to a seat once its sender has been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeatInput {
    Tap,
    Key(LogicalKey),
}

/// Errors raised by operator commands. Remote messages never fail; they are applied or dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KioskError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("operation requires the {expected} phase, current phase {actual:?}")]
    WrongPhase {
        expected: &'static str,
        actual: KioskPhase,
    },
    #[error("slot {0} does not accept input")]
    UnknownSlot(SlotId),
}

/// Context object of one round, exclusively owned by the machine's host task.
#[derive(Debug, Clone)]
pub struct KioskSession {
    machine: MachineId,
    game: GameKind,
    tuning: GameTuning,
    rules: RaceRules,
    sm: RoundStateMachine,
    mode: Option<PlayMode>,
    roster: SlotRoster,
}

impl KioskSession {
    /// Open a new round in setup with no seats.
    pub fn new(machine: MachineId, game: GameKind, tuning: GameTuning, rules: RaceRules) -> Self {
        Self {
            machine,
            game,
            tuning,
            rules,
            sm: RoundStateMachine::new(),
            mode: None,
            roster: SlotRoster::default(),
        }
    }

    pub fn machine(&self) -> &MachineId {
        &self.machine
    }

    pub fn game(&self) -> GameKind {
        self.game
    }

    pub fn tuning(&self) -> GameTuning {
        self.tuning
    }

    pub fn phase(&self) -> KioskPhase {
        self.sm.phase()
    }

    /// Number of phase transitions applied in this round.
    pub fn version(&self) -> usize {
        self.sm.version()
    }

    pub fn mode(&self) -> Option<PlayMode> {
        self.mode
    }

    pub fn roster(&self) -> &SlotRoster {
        &self.roster
    }

    /// Render-ready view of the round.
    pub fn snapshot(&self) -> KioskSnapshot {
        let phase = self.sm.phase();
        KioskSnapshot {
            machine_id: self.machine.to_string(),
            game: self.game,
            phase: VisiblePhase::from(&phase),
            mode: self.mode,
            outcome: match phase {
                KioskPhase::Result(outcome) => Some(outcome),
                _ => None,
            },
            slots: self.roster.iter().map(SlotSnapshot::from).collect(),
            difficulty: self.tuning.difficulty,
            version: self.sm.version(),
        }
    }

    /// Message describing the current phase to every phone.
    pub fn announcement(&self) -> GameMessage {
        match self.sm.phase() {
            KioskPhase::Setup => GameMessage::broadcast_state(
                RemoteState::WaitingSelection,
                Some(self.game.setup_layout()),
            ),
            KioskPhase::Lobby => {
                GameMessage::broadcast_state(RemoteState::Ready, Some(self.game.layout()))
            }
            KioskPhase::Playing => {
                GameMessage::broadcast_state(RemoteState::Playing, Some(self.game.layout()))
            }
            KioskPhase::Result(RoundOutcome::TimedOut) => GameMessage::Timeout,
            KioskPhase::Result(_) => GameMessage::GameOver,
        }
    }

    /// Message republished by the heartbeat; nothing is repeated during setup.
    pub fn heartbeat(&self) -> Option<GameMessage> {
        match self.sm.phase() {
            KioskPhase::Setup => None,
            _ => Some(self.announcement()),
        }
    }

    /// Choose the play mode and seed the seats (setup to lobby).
    pub fn select_mode(&mut self, mode: PlayMode) -> Result<Vec<Outbound>, KioskError> {
        if !self.sm.can_apply(PhaseEvent::ModeSelected(mode)) {
            return Err(KioskError::WrongPhase {
                expected: "setup",
                actual: self.sm.phase(),
            });
        }
        self.mode = Some(mode);
        self.roster = SlotRoster::seed(mode);
        info!(machine = %self.machine, ?mode, "play mode selected");
        Ok(self.transition(PhaseEvent::ModeSelected(mode))?)
    }

    /// The operator did not choose in time: default to a single player.
    pub fn setup_timer_expired(&mut self) -> Vec<Outbound> {
        match self.select_mode(PlayMode::default()) {
            Ok(effects) => effects,
            Err(err) => {
                debug!(machine = %self.machine, error = %err, "stale setup timer ignored");
                Vec::new()
            }
        }
    }

    /// The lobby waited long enough; start regardless of who joined.
    pub fn lobby_timer_expired(&mut self) -> Vec<Outbound> {
        self.transition_or_ignore(PhaseEvent::LobbyTimerExpired)
    }

    /// The round ran out of time: every human loses.
    pub fn round_timer_expired(&mut self) -> Vec<Outbound> {
        self.transition_or_ignore(PhaseEvent::RoundTimerExpired)
    }

    /// Advance the CPU opponent of a race.
    pub fn bot_tick(&mut self) -> Vec<Outbound> {
        if self.sm.phase() != KioskPhase::Playing || !self.game.is_race() {
            return Vec::new();
        }
        self.advance_seat(BOT_SLOT, self.tuning.bot_speed)
    }

    /// A key-driven minigame reports how the round ended.
    pub fn report_result(&mut self, winner: Option<SlotId>) -> Result<Vec<Outbound>, KioskError> {
        let outcome = match winner {
            Some(id) => self.outcome_for(id).ok_or(KioskError::UnknownSlot(id))?,
            None => RoundOutcome::Lost,
        };
        Ok(self.transition(PhaseEvent::RoundDecided(outcome))?)
    }

    /// Hand the phones over to the checkout page.
    pub fn request_payment(&self, payment_url: String) -> Result<Vec<Outbound>, KioskError> {
        self.ensure_setup()?;
        Ok(vec![Outbound::Publish(GameMessage::StateChange {
            state: RemoteState::Paying,
            game: None,
            payment_url: Some(payment_url),
            session_id: SessionToken::Anonymous,
        })])
    }

    /// Tell the phones the checkout was approved.
    pub fn approve_payment(&self) -> Result<Vec<Outbound>, KioskError> {
        self.ensure_setup()?;
        Ok(vec![Outbound::Publish(GameMessage::broadcast_state(
            RemoteState::PaymentApproved,
            None,
        ))])
    }

    /// Apply a message received on the machine topic.
    pub fn handle_remote(&mut self, message: &GameMessage) -> Vec<Outbound> {
        match message {
            GameMessage::Join {
                player_id,
                session_id,
            } => self.on_join(*player_id, session_id),
            GameMessage::Tap {
                player_id,
                session_id,
            } => self.on_remote_input(*player_id, session_id, SeatInput::Tap),
            GameMessage::Keydown { key, session_id } => match key.parse::<LogicalKey>() {
                Ok(key) => self.on_remote_input(key.slot(), session_id, SeatInput::Key(key)),
                Err(err) => {
                    debug!(machine = %self.machine, error = %err, "keydown ignored");
                    Vec::new()
                }
            },
            GameMessage::Start { session_id } => self.on_remote_start(session_id),
            // Our own broadcasts echo back on the topic.
            GameMessage::StateChange { .. } | GameMessage::GameOver | GameMessage::Timeout => {
                trace!(machine = %self.machine, kind = message.kind(), "host echo ignored");
                Vec::new()
            }
        }
    }

    /// Apply input from the kiosk keyboard or buttons. Local input skips the session check.
    pub fn handle_local(&mut self, input: LocalInput) -> Result<Vec<Outbound>, KioskError> {
        match input {
            LocalInput::Start => Ok(self.transition(PhaseEvent::StartRequested)?),
            LocalInput::Tap(id) => {
                self.ensure_human(id)?;
                Ok(self.apply_seat_input(id, SeatInput::Tap))
            }
            LocalInput::Key(key) => {
                let id = key.slot();
                self.ensure_human(id)?;
                Ok(self.apply_seat_input(id, SeatInput::Key(key)))
            }
        }
    }

    fn on_join(&mut self, id: SlotId, session: &SessionToken) -> Vec<Outbound> {
        let mut effects = Vec::new();

        match self.roster.join(id, session) {
            JoinOutcome::Claimed => {
                info!(machine = %self.machine, slot = id, %session, "slot claimed");
                effects.push(Outbound::Publish(GameMessage::reply(
                    RemoteState::ConnectionSuccess,
                    session.clone(),
                )));
                effects.extend(self.slot_updated(id));
            }
            JoinOutcome::Rejoined => {
                debug!(machine = %self.machine, slot = id, %session, "slot owner rejoined");
                effects.push(Outbound::Publish(GameMessage::reply(
                    RemoteState::ConnectionSuccess,
                    session.clone(),
                )));
            }
            JoinOutcome::Busy => {
                info!(machine = %self.machine, slot = id, %session, "join rejected: slot busy");
                effects.push(Outbound::Publish(GameMessage::reply(
                    RemoteState::Busy,
                    session.clone(),
                )));
            }
            JoinOutcome::NoSuchSlot => {
                debug!(machine = %self.machine, slot = id, "join for unknown slot ignored");
            }
        }

        // Whatever the outcome, resynchronise the asking phone with the current phase.
        if !matches!(self.sm.phase(), KioskPhase::Result(_)) {
            effects.push(Outbound::Publish(self.announcement()));
        }
        effects
    }

    fn on_remote_input(
        &mut self,
        id: SlotId,
        session: &SessionToken,
        input: SeatInput,
    ) -> Vec<Outbound> {
        if !matches!(self.sm.phase(), KioskPhase::Lobby | KioskPhase::Playing) {
            trace!(machine = %self.machine, slot = id, "input outside of a round ignored");
            return Vec::new();
        }

        match self.roster.authorize(id, session) {
            InputVerdict::Accepted => self.apply_seat_input(id, input),
            InputVerdict::Unauthorized => {
                debug!(
                    machine = %self.machine,
                    slot = id,
                    %session,
                    "unauthorized input discarded"
                );
                Vec::new()
            }
            InputVerdict::NoSuchSlot => {
                debug!(machine = %self.machine, slot = id, "input for unknown slot ignored");
                Vec::new()
            }
        }
    }

    fn on_remote_start(&mut self, session: &SessionToken) -> Vec<Outbound> {
        if self.sm.phase() != KioskPhase::Lobby {
            trace!(machine = %self.machine, "start outside of the lobby ignored");
            return Vec::new();
        }
        if !self.roster.owns_connected_seat(session) {
            debug!(
                machine = %self.machine,
                %session,
                "start from a session without a seat ignored"
            );
            return Vec::new();
        }
        self.transition_or_ignore(PhaseEvent::StartRequested)
    }

    /// Shared by the remote and local paths once the sender is trusted.
    fn apply_seat_input(&mut self, id: SlotId, input: SeatInput) -> Vec<Outbound> {
        match self.sm.phase() {
            KioskPhase::Lobby => {
                let connected = self.roster.get(id).is_some_and(|slot| slot.connected);
                if connected {
                    info!(machine = %self.machine, slot = id, "round started from seat input");
                    let mut effects = self.slot_updated(id);
                    effects.extend(self.transition_or_ignore(PhaseEvent::StartRequested));
                    effects
                } else {
                    Vec::new()
                }
            }
            KioskPhase::Playing if self.game.is_race() => {
                self.advance_seat(id, self.rules.tap_step)
            }
            KioskPhase::Playing => {
                if let (SeatInput::Key(key), Some(slot)) = (input, self.roster.get_mut(id)) {
                    slot.last_key = Some(key);
                }
                vec![Outbound::Notify(HostEvent::Input(InputEvent {
                    slot: id,
                    key: match input {
                        SeatInput::Key(key) => Some(key.to_string()),
                        SeatInput::Tap => None,
                    },
                }))]
            }
            KioskPhase::Setup | KioskPhase::Result(_) => Vec::new(),
        }
    }

    fn advance_seat(&mut self, id: SlotId, amount: u32) -> Vec<Outbound> {
        let Some(progress) = self.roster.advance(id, amount) else {
            return Vec::new();
        };
        let mut effects = self.slot_updated(id);
        if progress >= self.rules.win_threshold {
            if let Some(outcome) = self.outcome_for(id) {
                info!(machine = %self.machine, slot = id, progress, "finish line reached");
                effects.extend(self.transition_or_ignore(PhaseEvent::RoundDecided(outcome)));
            }
        }
        effects
    }

    fn outcome_for(&self, id: SlotId) -> Option<RoundOutcome> {
        let slot = self.roster.get(id)?;
        Some(if slot.is_human() {
            RoundOutcome::Won { winner: id }
        } else {
            RoundOutcome::Beaten { winner: id }
        })
    }

    fn slot_updated(&self, id: SlotId) -> Vec<Outbound> {
        self.roster
            .get(id)
            .map(|slot| Outbound::Notify(HostEvent::SlotUpdated(SlotSnapshot::from(slot))))
            .into_iter()
            .collect()
    }

    fn transition(&mut self, event: PhaseEvent) -> Result<Vec<Outbound>, InvalidTransition> {
        let next = self.sm.apply(event)?;
        info!(machine = %self.machine, phase = ?next, "round phase changed");
        Ok(vec![
            Outbound::Notify(HostEvent::PhaseChanged(self.snapshot())),
            Outbound::Publish(self.announcement()),
        ])
    }

    fn transition_or_ignore(&mut self, event: PhaseEvent) -> Vec<Outbound> {
        self.transition(event).unwrap_or_else(|err| {
            debug!(machine = %self.machine, error = %err, "transition ignored");
            Vec::new()
        })
    }

    fn ensure_setup(&self) -> Result<(), KioskError> {
        match self.sm.phase() {
            KioskPhase::Setup => Ok(()),
            actual => Err(KioskError::WrongPhase {
                expected: "setup",
                actual,
            }),
        }
    }

    fn ensure_human(&self, id: SlotId) -> Result<(), KioskError> {
        match self.roster.get(id) {
            Some(slot) if slot.is_human() => Ok(()),
            _ => Err(KioskError::UnknownSlot(id)),
        }
    }
}
