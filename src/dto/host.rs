//! DTOs of the kiosk-local REST surface and render stream.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::ids::SlotId,
    state::{
        game::{GameKind, PlayMode},
        slots::{PlayerSlot, SlotKind},
        state_machine::{KioskPhase, RoundOutcome},
    },
};

/// Round phase exposed to the kiosk render stream.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisiblePhase {
    Setup,
    Lobby,
    Playing,
    Result,
}

impl From<&KioskPhase> for VisiblePhase {
    fn from(value: &KioskPhase) -> Self {
        match value {
            KioskPhase::Setup => VisiblePhase::Setup,
            KioskPhase::Lobby => VisiblePhase::Lobby,
            KioskPhase::Playing => VisiblePhase::Playing,
            KioskPhase::Result(_) => VisiblePhase::Result,
        }
    }
}

/// Public view of a seat. The owning session is never exposed.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub id: SlotId,
    pub label: String,
    pub kind: SlotKind,
    pub connected: bool,
    /// Whether a phone session holds the seat.
    pub claimed: bool,
    pub progress: u32,
}

impl From<&PlayerSlot> for SlotSnapshot {
    fn from(slot: &PlayerSlot) -> Self {
        Self {
            id: slot.id,
            label: slot.label.clone(),
            kind: slot.kind,
            connected: slot.connected,
            claimed: slot.owner.is_some(),
            progress: slot.progress,
        }
    }
}

/// Complete picture of the round hosted on a machine.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct KioskSnapshot {
    pub machine_id: String,
    pub game: GameKind,
    pub phase: VisiblePhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<PlayMode>,
    /// Present once the round reached its result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RoundOutcome>,
    pub slots: Vec<SlotSnapshot>,
    pub difficulty: u8,
    /// Number of phase transitions applied in this round.
    pub version: usize,
}

/// Accepted input forwarded to the local minigame.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub slot: SlotId,
    /// Logical key, absent for taps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Where the kiosk tab should go once a round is over.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NavigationTarget {
    /// Ticket / prize screen after a human win.
    Payout,
    /// Back to the advertising loop.
    Idle,
}

/// Event emitted when the host leaves a finished round.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct NavigateEvent {
    pub target: NavigationTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<SlotId>,
}

/// Request starting a host on a machine.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct StartHostRequest {
    /// Game to host; defaults to the first game enabled on the machine.
    #[serde(default)]
    pub game: Option<GameKind>,
}

/// Operator mode selection.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectModeRequest {
    pub mode: PlayMode,
}

/// Trusted input from the kiosk keyboard or hardware buttons.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LocalInputRequest {
    /// Tap on behalf of a seat.
    Tap(SlotId),
    /// Logical key, mapped to a seat through the fixed key table.
    Key(String),
}

/// Outcome reported by a key-driven minigame.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReportResultRequest {
    /// Winning seat, or `null` when the players lost.
    pub winner: Option<SlotId>,
}

/// Payment hand-off pushed to the phones.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PaymentRequest {
    #[validate(url)]
    pub payment_url: String,
}
