use indexmap::IndexMap;
use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::{
    dao::models::MachineEntity,
    state::game::{GameKind, GameTuning},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMachineDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    enabled_games: Vec<GameKind>,
    #[serde(default)]
    tuning: IndexMap<GameKind, GameTuning>,
    updated_at: DateTime,
}

impl From<MachineEntity> for MongoMachineDocument {
    fn from(value: MachineEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            enabled_games: value.enabled_games,
            tuning: value.tuning,
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoMachineDocument> for MachineEntity {
    fn from(value: MongoMachineDocument) -> Self {
        Self {
            id: value.id,
            name: value.name,
            enabled_games: value.enabled_games,
            tuning: value.tuning,
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

pub fn doc_id(id: &str) -> Document {
    doc! {"_id": id}
}
