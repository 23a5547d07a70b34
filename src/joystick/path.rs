//! Player link parsing: `<machineId>` or `<machineId>-P<n>`.

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::{
    dto::ids::{MachineId, SlotId},
    state::slots::FIRST_SLOT,
};

const PLAYER_SUFFIX: &str = "-P";

/// Machine and seat a phone link points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerPath {
    pub machine: MachineId,
    pub player: SlotId,
}

/// Malformed player link. Terminal for the client: the link itself is wrong.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("no machine id in player link")]
    MissingMachineId,
    #[error("invalid player number `{0}`")]
    InvalidPlayer(String),
}

impl FromStr for PlayerPath {
    type Err = PathError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let segment = raw.trim();
        let segment = segment.strip_prefix('/').unwrap_or(segment).trim();

        let (machine, player) = match segment.rsplit_once(PLAYER_SUFFIX) {
            Some((machine, suffix))
                if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) =>
            {
                let player = suffix
                    .parse::<SlotId>()
                    .ok()
                    .filter(|player| *player >= FIRST_SLOT)
                    .ok_or_else(|| PathError::InvalidPlayer(suffix.to_string()))?;
                (machine, player)
            }
            _ => (segment, FIRST_SLOT),
        };

        if machine.is_empty() {
            return Err(PathError::MissingMachineId);
        }
        Ok(Self {
            machine: MachineId::new(machine),
            player,
        })
    }
}

impl fmt::Display for PlayerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.player == FIRST_SLOT {
            write!(f, "{}", self.machine)
        } else {
            write!(f, "{}{PLAYER_SUFFIX}{}", self.machine, self.player)
        }
    }
}
