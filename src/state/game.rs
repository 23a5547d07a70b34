use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::message::ControlLayout;

/// Minigames a kiosk can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    /// Multiple-choice questions answered with letters.
    Trivia,
    /// Prize wheel spun from the phone.
    Roulette,
    /// Balloon pump.
    Balloon,
    /// Color sequence memory game.
    Simon,
    /// Penalty shoot-out.
    Penalties,
    /// Tap race against a CPU opponent.
    TapRace,
}

impl GameKind {
    /// Layout phones render while the game is in progress.
    pub fn layout(self) -> ControlLayout {
        match self {
            Self::Trivia => ControlLayout::Trivia,
            Self::Roulette => ControlLayout::Roulette,
            Self::Balloon => ControlLayout::Balloon,
            Self::Simon => ControlLayout::Simon,
            Self::Penalties => ControlLayout::Penalties,
            Self::TapRace => ControlLayout::Taprace,
        }
    }

    /// Layout phones render while the kiosk is choosing a mode.
    pub fn setup_layout(self) -> ControlLayout {
        match self {
            Self::TapRace => ControlLayout::TapraceSetup,
            _ => ControlLayout::Menu,
        }
    }

    /// Whether progress is driven by taps rather than by a local minigame.
    pub fn is_race(self) -> bool {
        matches!(self, Self::TapRace)
    }
}

/// Number of human players chosen at setup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PlayMode {
    #[default]
    #[serde(rename = "1P")]
    SinglePlayer,
    #[serde(rename = "2P")]
    TwoPlayers,
}

/// Per-game tuning read from the machine profile when a round is set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GameTuning {
    /// Difficulty level forwarded to the local minigame.
    pub difficulty: u8,
    /// Round length in seconds before a timeout loss.
    pub duration_secs: u64,
    /// Progress added by the CPU opponent on each bot tick.
    pub bot_speed: u32,
}

impl Default for GameTuning {
    fn default() -> Self {
        Self {
            difficulty: 1,
            duration_secs: 30,
            bot_speed: 2,
        }
    }
}

/// Progress rules shared by every race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceRules {
    /// Progress a slot must reach to win.
    pub win_threshold: u32,
    /// Progress added by one accepted tap.
    pub tap_step: u32,
}

impl Default for RaceRules {
    fn default() -> Self {
        Self {
            win_threshold: 100,
            tap_step: 2,
        }
    }
}
