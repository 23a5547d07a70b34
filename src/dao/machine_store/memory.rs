use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{self, BoxFuture};

use crate::dao::{machine_store::MachineStore, models::MachineEntity, storage::StorageResult};

/// Process-local store used when no database is configured.
#[derive(Clone, Default)]
pub struct MemoryMachineStore {
    machines: Arc<DashMap<String, MachineEntity>>,
}

impl MemoryMachineStore {
    /// Build a store pre-filled with `machines`.
    pub fn seeded(machines: impl IntoIterator<Item = MachineEntity>) -> Self {
        let store = Self::default();
        for machine in machines {
            store.machines.insert(machine.id.clone(), machine);
        }
        store
    }
}

impl MachineStore for MemoryMachineStore {
    fn find_machine(&self, id: String) -> BoxFuture<'static, StorageResult<Option<MachineEntity>>> {
        let found = self.machines.get(&id).map(|entry| entry.value().clone());
        Box::pin(future::ready(Ok(found)))
    }

    fn list_machines(&self) -> BoxFuture<'static, StorageResult<Vec<MachineEntity>>> {
        let mut machines: Vec<_> = self
            .machines
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        machines.sort_by(|a, b| a.id.cmp(&b.id));
        Box::pin(future::ready(Ok(machines)))
    }

    fn save_machine(&self, machine: MachineEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.machines.insert(machine.id.clone(), machine);
        Box::pin(future::ready(Ok(())))
    }

    fn delete_machine(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let removed = self.machines.remove(&id).is_some();
        Box::pin(future::ready(Ok(removed)))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_profiles_are_listed_in_id_order() {
        let store = MemoryMachineStore::seeded([
            MachineEntity::new("kiosk-b"),
            MachineEntity::new("kiosk-a"),
        ]);
        let ids: Vec<_> = store
            .list_machines()
            .await
            .unwrap()
            .into_iter()
            .map(|machine| machine.id)
            .collect();
        assert_eq!(ids, vec!["kiosk-a", "kiosk-b"]);
    }

    #[tokio::test]
    async fn save_replaces_and_delete_reports_existence() {
        let store = MemoryMachineStore::default();
        let mut machine = MachineEntity::new("kiosk-1");
        store.save_machine(machine.clone()).await.unwrap();
        machine.name = Some("Lobby".into());
        store.save_machine(machine.clone()).await.unwrap();

        let found = store.find_machine("kiosk-1".into()).await.unwrap();
        assert_eq!(found, Some(machine));
        assert!(store.delete_machine("kiosk-1".into()).await.unwrap());
        assert!(!store.delete_machine("kiosk-1".into()).await.unwrap());
    }
}
