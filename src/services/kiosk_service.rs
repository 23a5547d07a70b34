//! Kiosk-local commands: starting and stopping hosts, and the trusted input path.

use dashmap::mapref::entry::Entry;
use tracing::info;

use crate::{
    dto::{
        host::{
            KioskSnapshot, LocalInputRequest, PaymentRequest, SelectModeRequest, StartHostRequest,
        },
        ids::MachineId,
        message::LogicalKey,
    },
    error::ServiceError,
    services::{
        host_service::{HostOp, HostSettings, spawn_host},
        machine_service,
    },
    state::{SharedState, kiosk::LocalInput},
};

/// Start hosting `machine` with the game requested or the profile's default.
pub async fn start_host(
    state: &SharedState,
    machine: MachineId,
    request: StartHostRequest,
) -> Result<KioskSnapshot, ServiceError> {
    machine_service::ensure_machine_id(machine.as_str())?;
    let profile = machine_service::load_profile(state, &machine).await?;
    let game = request.game.unwrap_or_else(|| profile.default_game());
    if !profile.allows(game) {
        return Err(ServiceError::InvalidInput(format!(
            "game {game:?} is not enabled on machine `{machine}`"
        )));
    }

    let config = state.config();
    let settings = HostSettings {
        game,
        tuning: profile.tuning_for(game),
        rules: config.rules(),
        timings: config.timings(),
    };

    let host = match state.hosts().entry(machine.clone()) {
        Entry::Occupied(entry) if entry.get().is_running() => {
            return Err(ServiceError::InvalidState(format!(
                "machine `{machine}` is already hosted"
            )));
        }
        Entry::Occupied(mut entry) => {
            let host = spawn_host(machine.clone(), settings, state.transport());
            entry.insert(host.clone());
            host
        }
        Entry::Vacant(entry) => {
            let host = spawn_host(machine.clone(), settings, state.transport());
            entry.insert(host.clone());
            host
        }
    };
    info!(machine = %machine, game = ?game, "host registered");

    Ok(host.snapshot().await?)
}

/// Tear the host of `machine` down: heartbeat stopped, topic released.
pub async fn stop_host(state: &SharedState, machine: &MachineId) -> Result<(), ServiceError> {
    let Some((_, host)) = state.hosts().remove(machine) else {
        return Err(ServiceError::NotFound(format!(
            "no host running on machine `{machine}`"
        )));
    };
    host.shutdown().await;
    info!(machine = %machine, "host removed");
    Ok(())
}

pub async fn snapshot(
    state: &SharedState,
    machine: &MachineId,
) -> Result<KioskSnapshot, ServiceError> {
    Ok(state.host(machine)?.snapshot().await?)
}

async fn apply(
    state: &SharedState,
    machine: &MachineId,
    op: HostOp,
) -> Result<KioskSnapshot, ServiceError> {
    Ok(state.host(machine)?.apply(op).await?)
}

pub async fn select_mode(
    state: &SharedState,
    machine: &MachineId,
    request: SelectModeRequest,
) -> Result<KioskSnapshot, ServiceError> {
    apply(state, machine, HostOp::SelectMode(request.mode)).await
}

pub async fn start_round(
    state: &SharedState,
    machine: &MachineId,
) -> Result<KioskSnapshot, ServiceError> {
    apply(state, machine, HostOp::Local(LocalInput::Start)).await
}

/// Trusted keyboard or hardware input; never filtered by session.
pub async fn local_input(
    state: &SharedState,
    machine: &MachineId,
    request: LocalInputRequest,
) -> Result<KioskSnapshot, ServiceError> {
    let input = match request {
        LocalInputRequest::Tap(slot) => LocalInput::Tap(slot),
        LocalInputRequest::Key(raw) => LocalInput::Key(
            raw.parse::<LogicalKey>()
                .map_err(|err| ServiceError::InvalidInput(err.to_string()))?,
        ),
    };
    apply(state, machine, HostOp::Local(input)).await
}

pub async fn report_result(
    state: &SharedState,
    machine: &MachineId,
    winner: Option<u8>,
) -> Result<KioskSnapshot, ServiceError> {
    apply(state, machine, HostOp::ReportResult(winner)).await
}

pub async fn request_payment(
    state: &SharedState,
    machine: &MachineId,
    request: PaymentRequest,
) -> Result<KioskSnapshot, ServiceError> {
    apply(state, machine, HostOp::RequestPayment(request.payment_url)).await
}

pub async fn approve_payment(
    state: &SharedState,
    machine: &MachineId,
) -> Result<KioskSnapshot, ServiceError> {
    apply(state, machine, HostOp::ApprovePayment).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{machine_store::MemoryMachineStore, models::MachineEntity},
        dto::{
            host::VisiblePhase,
            message::{GameMessage, RemoteState},
        },
        state::{
            AppState,
            game::{GameKind, PlayMode},
        },
        transport::Transport,
    };

    fn machine() -> MachineId {
        MachineId::new("kiosk-1")
    }

    #[tokio::test]
    async fn second_start_conflicts_until_stopped() {
        let state = AppState::new(AppConfig::default());
        let snapshot = start_host(&state, machine(), StartHostRequest::default())
            .await
            .unwrap();
        assert_eq!(snapshot.game, GameKind::TapRace);
        assert_eq!(snapshot.phase, VisiblePhase::Setup);

        let err = start_host(&state, machine(), StartHostRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        stop_host(&state, &machine()).await.unwrap();
        assert_eq!(state.hub().subscriber_count(&machine()), 0);
        assert!(matches!(
            stop_host(&state, &machine()).await,
            Err(ServiceError::NotFound(_))
        ));
        start_host(&state, machine(), StartHostRequest::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn profile_restricts_the_hosted_game() {
        let state = AppState::new(AppConfig::default());
        let mut profile = MachineEntity::new("kiosk-1");
        profile.enabled_games = vec![GameKind::Simon, GameKind::Trivia];
        state
            .set_machine_store(Arc::new(MemoryMachineStore::seeded([profile])))
            .await;

        let err = start_host(
            &state,
            machine(),
            StartHostRequest {
                game: Some(GameKind::TapRace),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let snapshot = start_host(&state, machine(), StartHostRequest::default())
            .await
            .unwrap();
        assert_eq!(snapshot.game, GameKind::Simon);
    }

    #[tokio::test]
    async fn payment_url_reaches_the_phones() {
        let state = AppState::new(AppConfig::default());
        start_host(&state, machine(), StartHostRequest::default())
            .await
            .unwrap();
        let mut phone = state.hub().subscribe(&machine());

        request_payment(
            &state,
            &machine(),
            PaymentRequest {
                payment_url: "https://pay.example.com/checkout/42".into(),
            },
        )
        .await
        .unwrap();

        let frame = phone.recv().await.unwrap();
        let Some(GameMessage::StateChange {
            state: remote,
            payment_url,
            ..
        }) = frame.as_game().cloned()
        else {
            panic!("unexpected frame {frame:?}");
        };
        assert_eq!(remote, RemoteState::Paying);
        assert_eq!(payment_url.as_deref(), Some("https://pay.example.com/checkout/42"));
    }

    #[tokio::test]
    async fn local_input_parses_keys_and_needs_a_running_round() {
        let state = AppState::new(AppConfig::default());
        start_host(&state, machine(), StartHostRequest::default())
            .await
            .unwrap();
        select_mode(
            &state,
            &machine(),
            SelectModeRequest {
                mode: PlayMode::SinglePlayer,
            },
        )
        .await
        .unwrap();

        let err = local_input(&state, &machine(), LocalInputRequest::Key("??".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let snapshot = local_input(&state, &machine(), LocalInputRequest::Tap(1))
            .await
            .unwrap();
        assert_eq!(snapshot.phase, VisiblePhase::Playing);
    }
}
