//! Machine profile CRUD on top of the record store.

use tracing::{info, warn};

use crate::{
    dao::models::MachineEntity,
    dto::{
        ids::MachineId,
        machine::{MachineProfile, UpsertMachineRequest},
        validation::validate_machine_id,
    },
    error::ServiceError,
    state::SharedState,
};

fn is_hosted(state: &SharedState, id: &str) -> bool {
    state
        .hosts()
        .get(&MachineId::new(id))
        .is_some_and(|host| host.is_running())
}

/// Reject identifiers that cannot appear in a phone link.
pub fn ensure_machine_id(id: &str) -> Result<(), ServiceError> {
    validate_machine_id(id).map_err(|err| {
        ServiceError::InvalidInput(
            err.message
                .map(|message| message.into_owned())
                .unwrap_or_else(|| format!("invalid machine id `{id}`")),
        )
    })
}

pub async fn list_machines(state: &SharedState) -> Result<Vec<MachineProfile>, ServiceError> {
    let store = state.require_machine_store().await?;
    let machines = store.list_machines().await?;
    Ok(machines
        .into_iter()
        .map(|entity| {
            let hosted = is_hosted(state, &entity.id);
            MachineProfile::new(entity, hosted)
        })
        .collect())
}

pub async fn get_machine(state: &SharedState, id: &str) -> Result<MachineProfile, ServiceError> {
    let store = state.require_machine_store().await?;
    let Some(entity) = store.find_machine(id.to_string()).await? else {
        return Err(ServiceError::NotFound(format!("machine `{id}` not found")));
    };
    Ok(MachineProfile::new(entity, is_hosted(state, id)))
}

/// Create or replace the profile stored under `id`.
///
/// Running hosts keep the tuning they were started with.
pub async fn upsert_machine(
    state: &SharedState,
    id: String,
    request: UpsertMachineRequest,
) -> Result<MachineProfile, ServiceError> {
    ensure_machine_id(&id)?;
    let store = state.require_machine_store().await?;
    let entity = request.into_entity(id);
    store.save_machine(entity.clone()).await?;
    info!(machine = %entity.id, games = ?entity.enabled_games, "machine profile saved");

    let hosted = is_hosted(state, &entity.id);
    Ok(MachineProfile::new(entity, hosted))
}

pub async fn delete_machine(state: &SharedState, id: &str) -> Result<(), ServiceError> {
    let store = state.require_machine_store().await?;
    if !store.delete_machine(id.to_string()).await? {
        return Err(ServiceError::NotFound(format!("machine `{id}` not found")));
    }
    info!(machine = %id, "machine profile deleted");
    Ok(())
}

/// Profile a host is started with.
///
/// Unknown machines and degraded mode both fall back to a bare profile, so a kiosk can always
/// host a round.
pub async fn load_profile(
    state: &SharedState,
    machine: &MachineId,
) -> Result<MachineEntity, ServiceError> {
    let Some(store) = state.machine_store().await else {
        warn!(machine = %machine, "no record store; hosting with default profile");
        return Ok(MachineEntity::new(machine.as_str()));
    };
    Ok(store
        .find_machine(machine.as_str().to_string())
        .await?
        .unwrap_or_else(|| MachineEntity::new(machine.as_str())))
}
