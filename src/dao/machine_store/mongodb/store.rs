use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Client, Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoMachineDocument, doc_id},
};
use crate::dao::{machine_store::MachineStore, models::MachineEntity, storage::StorageResult};

const MACHINE_COLLECTION_NAME: &str = "machines";

/// MongoDB backend of the machine record store.
#[derive(Clone)]
pub struct MongoMachineStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoMachineStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"updated_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("machine_updated_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MACHINE_COLLECTION_NAME,
                index: "updated_at",
                source,
            })?;
        Ok(())
    }

    async fn collection(&self) -> Collection<MongoMachineDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoMachineDocument>(MACHINE_COLLECTION_NAME)
    }

    async fn find_machine(&self, id: String) -> MongoResult<Option<MachineEntity>> {
        let collection = self.collection().await;
        let document = collection
            .find_one(doc_id(&id))
            .await
            .map_err(|source| MongoDaoError::LoadMachine { id, source })?;
        Ok(document.map(Into::into))
    }

    async fn list_machines(&self) -> MongoResult<Vec<MachineEntity>> {
        let collection = self.collection().await;
        let documents: Vec<MongoMachineDocument> = collection
            .find(doc! {})
            .sort(doc! {"_id": 1})
            .await
            .map_err(|source| MongoDaoError::ListMachines { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListMachines { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn save_machine(&self, machine: MachineEntity) -> MongoResult<()> {
        let id = machine.id.clone();
        let document: MongoMachineDocument = machine.into();
        let collection = self.collection().await;
        collection
            .replace_one(doc_id(&id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveMachine { id, source })?;
        Ok(())
    }

    async fn delete_machine(&self, id: String) -> MongoResult<bool> {
        let collection = self.collection().await;
        let result = collection
            .delete_one(doc_id(&id))
            .await
            .map_err(|source| MongoDaoError::DeleteMachine { id, source })?;
        Ok(result.deleted_count > 0)
    }
}

impl MachineStore for MongoMachineStore {
    fn find_machine(&self, id: String) -> BoxFuture<'static, StorageResult<Option<MachineEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_machine(id).await.map_err(Into::into) })
    }

    fn list_machines(&self) -> BoxFuture<'static, StorageResult<Vec<MachineEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_machines().await.map_err(Into::into) })
    }

    fn save_machine(&self, machine: MachineEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_machine(machine).await.map_err(Into::into) })
    }

    fn delete_machine(&self, id: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_machine(id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
