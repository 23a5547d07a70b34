/// Machine profile persistence.
pub mod machine_store;
/// Record definitions shared by the stores.
pub mod models;
/// Storage error types shared by the stores.
pub mod storage;
