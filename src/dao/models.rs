use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::state::game::{GameKind, GameTuning};

/// Game hosted when a machine profile enables none.
pub const FALLBACK_GAME: GameKind = GameKind::TapRace;

/// Machine profile persisted by the record store.
///
/// The joystick protocol only reads `enabled_games` and the per-game tuning, once, when a host is
/// started on the machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineEntity {
    /// Stable machine identifier, also used to scope the broadcast topic.
    pub id: String,
    /// Human readable location or label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Games the kiosk may launch, in menu order.
    #[serde(default)]
    pub enabled_games: Vec<GameKind>,
    /// Tuning overrides per game; missing entries use [`GameTuning::default`].
    #[serde(default)]
    pub tuning: IndexMap<GameKind, GameTuning>,
    /// Last time this profile was written.
    #[serde(default = "now")]
    pub updated_at: SystemTime,
}

impl MachineEntity {
    /// Bare profile with no game enabled.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            enabled_games: Vec::new(),
            tuning: IndexMap::new(),
            updated_at: SystemTime::now(),
        }
    }

    /// Tuning applied when `game` is set up on this machine.
    pub fn tuning_for(&self, game: GameKind) -> GameTuning {
        self.tuning.get(&game).copied().unwrap_or_default()
    }

    /// Whether the machine allows `game`. A profile with no list allows every game.
    pub fn allows(&self, game: GameKind) -> bool {
        self.enabled_games.is_empty() || self.enabled_games.contains(&game)
    }

    /// Game launched when the operator did not ask for one.
    pub fn default_game(&self) -> GameKind {
        self.enabled_games.first().copied().unwrap_or(FALLBACK_GAME)
    }
}

fn now() -> SystemTime {
    SystemTime::now()
}
