mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

pub use memory::MemoryMachineStore;

use futures::future::BoxFuture;

use crate::dao::{models::MachineEntity, storage::StorageResult};

/// Record-store collaborator holding machine profiles.
pub trait MachineStore: Send + Sync {
    fn find_machine(&self, id: String) -> BoxFuture<'static, StorageResult<Option<MachineEntity>>>;
    fn list_machines(&self) -> BoxFuture<'static, StorageResult<Vec<MachineEntity>>>;
    fn save_machine(&self, machine: MachineEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a profile, returning whether one existed.
    fn delete_machine(&self, id: String) -> BoxFuture<'static, StorageResult<bool>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
