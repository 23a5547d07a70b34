//! DTOs of the machine profile CRUD routes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::MachineEntity,
    dto::{format_system_time, validation::validate_tuning},
    state::game::{GameKind, GameTuning},
};

/// Body of `PUT /machines/{id}`.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpsertMachineRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 80))]
    pub name: Option<String>,
    /// Games the kiosk may launch; empty enables every game.
    #[serde(default)]
    pub enabled_games: Vec<GameKind>,
    #[serde(default)]
    #[validate(custom(function = "validate_tuning"))]
    #[schema(value_type = Object)]
    pub tuning: IndexMap<GameKind, GameTuning>,
}

impl UpsertMachineRequest {
    /// Build the entity stored under `id`.
    pub fn into_entity(self, id: String) -> MachineEntity {
        let mut entity = MachineEntity::new(id);
        entity.name = self.name;
        entity.enabled_games = self.enabled_games;
        entity.tuning = self.tuning;
        entity
    }
}

/// Machine profile as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct MachineProfile {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub enabled_games: Vec<GameKind>,
    #[schema(value_type = Object)]
    pub tuning: IndexMap<GameKind, GameTuning>,
    /// RFC 3339 timestamp of the last write.
    pub updated_at: String,
    /// Whether a host is currently running for this machine.
    pub hosted: bool,
}

impl MachineProfile {
    pub fn new(entity: MachineEntity, hosted: bool) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            enabled_games: entity.enabled_games,
            tuning: entity.tuning,
            updated_at: format_system_time(entity.updated_at),
            hosted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_request_validates_name_and_tuning() {
        let request: UpsertMachineRequest = serde_json::from_str(
            r#"{"name": "Mall entrance", "enabled_games": ["tap_race"],
                "tuning": {"tap_race": {"duration_secs": 20}}}"#,
        )
        .unwrap();
        assert!(request.validate().is_ok());

        let entity = request.into_entity("kiosk-07".into());
        assert_eq!(entity.tuning_for(GameKind::TapRace).duration_secs, 20);
        assert_eq!(entity.tuning_for(GameKind::TapRace).bot_speed, 2);

        let empty_name: UpsertMachineRequest = serde_json::from_str(r#"{"name": ""}"#).unwrap();
        assert!(empty_name.validate().is_err());

        let bad_tuning: UpsertMachineRequest =
            serde_json::from_str(r#"{"tuning": {"simon": {"difficulty": 0}}}"#).unwrap();
        assert!(bad_tuning.validate().is_err());
    }

    #[test]
    fn profile_formats_the_timestamp() {
        let profile = MachineProfile::new(MachineEntity::new("kiosk-1"), true);
        assert!(profile.updated_at.contains('T'));
        assert!(profile.hosted);
    }
}
