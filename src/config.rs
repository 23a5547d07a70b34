//! Application-level configuration loading: protocol timings, race rules and seed machines.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{dao::models::MachineEntity, dto::validation::validate_tuning, state::game::RaceRules};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "KIOSK_JOYSTICK_CONFIG_PATH";
/// Upper bound of every configured timer, in seconds.
const MAX_TIMER_SECS: u64 = 3_600;

/// Timers driving the host and the joystick client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Time the operator has to pick a mode before single player is chosen.
    pub setup: Duration,
    /// Time the lobby waits for players before starting anyway.
    pub lobby: Duration,
    /// Interval between two rebroadcasts of the host state.
    pub heartbeat: Duration,
    /// Time the result stays on screen before the host navigates away.
    pub result_delay: Duration,
    /// Interval between two moves of the CPU opponent.
    pub bot_tick: Duration,
    /// Time a phone waits for a state before showing its controls anyway.
    pub client_fallback: Duration,
    /// Time after a round end before a phone considers its seat stale.
    pub client_stale: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        RawTimings::default().into()
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    timings: Timings,
    rules: RaceRules,
    machines: Vec<MachineEntity>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        machines = app_config.machines.len(),
                        heartbeat_secs = app_config.timings.heartbeat.as_secs(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document; absent sections take their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    pub fn timings(&self) -> Timings {
        self.timings
    }

    pub fn rules(&self) -> RaceRules {
        self.rules
    }

    /// Machine profiles used to seed the in-memory record store.
    pub fn machines(&self) -> &[MachineEntity] {
        &self.machines
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    timings: RawTimings,
    rules: RawRules,
    machines: Vec<MachineEntity>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            timings: value.timings.into(),
            rules: value.rules.into(),
            machines: value.machines.into_iter().map(sanitize_machine).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawTimings {
    setup_secs: u64,
    lobby_secs: u64,
    heartbeat_secs: u64,
    result_delay_secs: u64,
    bot_tick_ms: u64,
    client_fallback_secs: u64,
    client_stale_secs: u64,
}

impl Default for RawTimings {
    fn default() -> Self {
        Self {
            setup_secs: 15,
            lobby_secs: 45,
            heartbeat_secs: 3,
            result_delay_secs: 5,
            bot_tick_ms: 500,
            client_fallback_secs: 3,
            client_stale_secs: 3,
        }
    }
}

impl From<RawTimings> for Timings {
    fn from(value: RawTimings) -> Self {
        let secs = |value: u64| Duration::from_secs(value.min(MAX_TIMER_SECS));
        Self {
            setup: secs(value.setup_secs),
            lobby: secs(value.lobby_secs),
            // A zero interval would make the heartbeat spin.
            heartbeat: secs(value.heartbeat_secs.max(1)),
            result_delay: secs(value.result_delay_secs),
            bot_tick: Duration::from_millis(value.bot_tick_ms.clamp(1, MAX_TIMER_SECS * 1_000)),
            client_fallback: secs(value.client_fallback_secs),
            client_stale: secs(value.client_stale_secs),
        }
    }
}

/// Seeded profiles skip the request validation, so out-of-range tuning is dropped here.
fn sanitize_machine(mut machine: MachineEntity) -> MachineEntity {
    if let Err(err) = validate_tuning(&machine.tuning) {
        warn!(machine = %machine.id, error = %err, "ignoring invalid seeded tuning");
        machine.tuning.clear();
    }
    machine
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawRules {
    win_threshold: u32,
    tap_step: u32,
}

impl Default for RawRules {
    fn default() -> Self {
        let rules = RaceRules::default();
        Self {
            win_threshold: rules.win_threshold,
            tap_step: rules.tap_step,
        }
    }
}

impl From<RawRules> for RaceRules {
    fn from(value: RawRules) -> Self {
        Self {
            win_threshold: value.win_threshold.max(1),
            tap_step: value.tap_step,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
