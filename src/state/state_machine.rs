use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::{dto::ids::SlotId, state::game::PlayMode};

/// Phases of one kiosk round. A new round always starts from a fresh machine in
/// [`KioskPhase::Setup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KioskPhase {
    /// The operator (or the setup timer) is choosing the play mode.
    Setup,
    /// Seats are seeded; waiting for players before the start.
    Lobby,
    /// The race or minigame is in progress.
    Playing,
    /// The round is over and the outcome is displayed.
    Result(RoundOutcome),
}

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundOutcome {
    /// A human seat reached the goal first.
    Won { winner: SlotId },
    /// The CPU opponent reached the goal first.
    Beaten { winner: SlotId },
    /// The minigame ended without a human win.
    Lost,
    /// The round timer expired without a winner.
    TimedOut,
}

impl RoundOutcome {
    /// Whether the round ends with a payout.
    pub fn is_win(&self) -> bool {
        matches!(self, Self::Won { .. })
    }

    /// Seat that crossed the line, if any.
    pub fn winner(&self) -> Option<SlotId> {
        match self {
            Self::Won { winner } | Self::Beaten { winner } => Some(*winner),
            Self::Lost | Self::TimedOut => None,
        }
    }
}

/// Events that can be applied to the round state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Mode chosen by the operator or defaulted by the setup timer.
    ModeSelected(PlayMode),
    /// A local or authorized remote start.
    StartRequested,
    /// The lobby waited long enough; start with whoever joined.
    LobbyTimerExpired,
    /// A seat reached the goal or the minigame reported an outcome.
    RoundDecided(RoundOutcome),
    /// The round ran out of time.
    RoundTimerExpired,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: KioskPhase,
    /// The event that cannot be applied from this phase.
    pub event: PhaseEvent,
}

/// Guarded phase transitions of a round.
#[derive(Debug, Clone)]
pub struct RoundStateMachine {
    phase: KioskPhase,
    version: usize,
}

impl Default for RoundStateMachine {
    fn default() -> Self {
        Self {
            phase: KioskPhase::Setup,
            version: 0,
        }
    }
}

impl RoundStateMachine {
    /// Create a state machine initialised in setup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> KioskPhase {
        self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Apply `event`, returning the new phase.
    pub fn apply(&mut self, event: PhaseEvent) -> Result<KioskPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(next)
    }

    /// Whether `event` would be accepted from the current phase.
    pub fn can_apply(&self, event: PhaseEvent) -> bool {
        self.compute_transition(event).is_ok()
    }

    fn compute_transition(&self, event: PhaseEvent) -> Result<KioskPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (KioskPhase::Setup, PhaseEvent::ModeSelected(_)) => KioskPhase::Lobby,
            (KioskPhase::Lobby, PhaseEvent::StartRequested)
            | (KioskPhase::Lobby, PhaseEvent::LobbyTimerExpired) => KioskPhase::Playing,
            (KioskPhase::Playing, PhaseEvent::RoundDecided(outcome)) => KioskPhase::Result(outcome),
            (KioskPhase::Playing, PhaseEvent::RoundTimerExpired) => {
                KioskPhase::Result(RoundOutcome::TimedOut)
            }
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
