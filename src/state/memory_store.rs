use async_trait::async_trait;
use dashmap::DashMap;

use super::{TokenRecord, VerificationRecord, VerificationStore};
use crate::error::Result;

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    verified_users: DashMap<String, Vec<VerificationRecord>>,
    oauth_tokens: DashMap<String, TokenRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerificationStore for MemoryStore {
    async fn record_verification(&self, record: VerificationRecord) -> Result<bool> {
        let mut guild = self
            .verified_users
            .entry(record.guild_id.clone())
            .or_default();
        if guild.iter().any(|r| r.user_id == record.user_id) {
            return Ok(false);
        }
        guild.push(record);
        Ok(true)
    }

    async fn store_token(&self, record: TokenRecord) -> Result<()> {
        self.oauth_tokens.insert(record.user_id.clone(), record);
        Ok(())
    }

    async fn token_for(&self, user_id: &str) -> Result<Option<TokenRecord>> {
        Ok(self.oauth_tokens.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn verified_users(&self, guild_id: &str) -> Result<Vec<VerificationRecord>> {
        Ok(self
            .verified_users
            .get(guild_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn is_verified(&self, guild_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .verified_users
            .get(guild_id)
            .map(|entry| entry.iter().any(|r| r.user_id == user_id))
            .unwrap_or(false))
    }

    async fn verification_count(&self) -> Result<usize> {
        Ok(self.verified_users.iter().map(|entry| entry.len()).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_duplicate_verification_ignored() {
        let store = MemoryStore::new();

        assert!(store
            .record_verification(VerificationRecord::new("g1", "u1"))
            .await
            .unwrap());
        assert!(!store
            .record_verification(VerificationRecord::new("g1", "u1"))
            .await
            .unwrap());
        assert!(store
            .record_verification(VerificationRecord::new("g2", "u1"))
            .await
            .unwrap());

        assert_eq!(store.verification_count().await.unwrap(), 2);
        assert!(store.is_verified("g2", "u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_lose_records() {
        let store = Arc::new(MemoryStore::new());

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let user = format!("u{}", i);
                store
                    .record_verification(VerificationRecord::new("g1", user.clone()))
                    .await
                    .unwrap();
                store
                    .store_token(TokenRecord::new(user, format!("tok-{}", i)))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.verified_users("g1").await.unwrap().len(), 50);
        assert_eq!(
            store.token_for("u7").await.unwrap().unwrap().access_token,
            "tok-7"
        );
    }
}
