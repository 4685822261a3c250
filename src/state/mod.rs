//! Persistence for verification records and OAuth tokens
//!
//! The rest of the bot only sees [`VerificationStore`]; whether records live in a
//! JSON file or in process memory is decided once at startup.

pub mod json_store;
pub mod memory_store;
pub mod records;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::StoreBackend;
use crate::error::Result;

pub use json_store::JsonFileStore;
pub use memory_store::MemoryStore;
pub use records::{TokenRecord, VerificationRecord};

/// Point reads and upserts over verified users and their tokens.
///
/// Implementations must tolerate the web callback and a batch run writing at
/// the same time; each call is atomic on its own record.
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Insert a verification unless one already exists for the same guild and user.
    ///
    /// Returns `true` when a new record was written.
    async fn record_verification(&self, record: VerificationRecord) -> Result<bool>;

    /// Insert or overwrite the token for a user
    async fn store_token(&self, record: TokenRecord) -> Result<()>;

    async fn token_for(&self, user_id: &str) -> Result<Option<TokenRecord>>;

    /// All verifications for a guild, oldest first
    async fn verified_users(&self, guild_id: &str) -> Result<Vec<VerificationRecord>>;

    async fn is_verified(&self, guild_id: &str, user_id: &str) -> Result<bool>;

    /// Total verification records across all guilds
    async fn verification_count(&self) -> Result<usize>;
}

/// Shared store type
pub type SharedStore = Arc<dyn VerificationStore>;

/// Open the configured backend
pub async fn open_store(backend: &StoreBackend) -> Result<SharedStore> {
    match backend {
        StoreBackend::File(path) => Ok(Arc::new(JsonFileStore::load(path).await?)),
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}
