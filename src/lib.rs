// Library surface shared by the murmur binary and the integration tests
pub mod backend;
pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod sync;

// Re-export main types for convenience
pub use backend::{ChatBackend, HttpBackend, OfflineBackend};
pub use error::{ChatError, ChatResult};
pub use models::*;
pub use sync::{EngineConfig, Intent, SyncEngine};
