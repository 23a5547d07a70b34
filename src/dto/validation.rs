//! Validation helpers for DTOs.

use indexmap::IndexMap;
use validator::ValidationError;

use crate::state::game::{GameKind, GameTuning};

const MAX_MACHINE_ID_LEN: usize = 64;
const MAX_ROUND_SECS: u64 = 600;
const MAX_DIFFICULTY: u8 = 10;

/// Validates a machine identifier usable in a phone link.
///
/// Identifiers ending with a player suffix (`-P2`) are rejected: the phone path would read the
/// suffix as a slot number.
///
/// ```ignore
/// validate_machine_id("kiosk-07")   // Ok
/// validate_machine_id("kiosk 07")   // Err - space
/// validate_machine_id("kiosk-P2")   // Err - looks like a player path
/// ```
pub fn validate_machine_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_MACHINE_ID_LEN {
        let mut err = ValidationError::new("machine_id_length");
        err.message = Some(
            format!(
                "Machine ID must be 1 to {MAX_MACHINE_ID_LEN} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("machine_id_format");
        err.message = Some("Machine ID may only contain letters, digits, '-' and '_'".into());
        return Err(err);
    }

    if let Some((_, suffix)) = id.rsplit_once("-P") {
        if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
            let mut err = ValidationError::new("machine_id_player_suffix");
            err.message = Some("Machine ID must not end with a player suffix".into());
            return Err(err);
        }
    }

    Ok(())
}

/// Validates per-game tuning overrides.
pub fn validate_tuning(tuning: &IndexMap<GameKind, GameTuning>) -> Result<(), ValidationError> {
    for (game, values) in tuning {
        if values.difficulty == 0 || values.difficulty > MAX_DIFFICULTY {
            let mut err = ValidationError::new("tuning_difficulty");
            err.message = Some(
                format!("{game:?}: difficulty must be between 1 and {MAX_DIFFICULTY}").into(),
            );
            return Err(err);
        }
        if values.duration_secs == 0 || values.duration_secs > MAX_ROUND_SECS {
            let mut err = ValidationError::new("tuning_duration");
            err.message = Some(
                format!("{game:?}: round duration must be between 1 and {MAX_ROUND_SECS} seconds")
                    .into(),
            );
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_ids_accept_link_safe_names() {
        assert!(validate_machine_id("kiosk-07").is_ok());
        assert!(validate_machine_id("MALL_2").is_ok());
        assert!(validate_machine_id("kiosk-Pizza").is_ok());
    }

    #[test]
    fn machine_ids_reject_bad_shapes() {
        assert!(validate_machine_id("").is_err());
        assert!(validate_machine_id(&"a".repeat(65)).is_err());
        assert!(validate_machine_id("kiosk 07").is_err());
        assert!(validate_machine_id("kiosk/07").is_err());
        assert!(validate_machine_id("kiosk-P2").is_err());
    }

    #[test]
    fn tuning_bounds() {
        let mut tuning = IndexMap::new();
        tuning.insert(GameKind::TapRace, GameTuning::default());
        assert!(validate_tuning(&tuning).is_ok());

        tuning.insert(
            GameKind::Simon,
            GameTuning {
                duration_secs: 0,
                ..GameTuning::default()
            },
        );
        assert!(validate_tuning(&tuning).is_err());

        tuning.insert(
            GameKind::Simon,
            GameTuning {
                difficulty: 11,
                ..GameTuning::default()
            },
        );
        assert!(validate_tuning(&tuning).is_err());
    }
}
