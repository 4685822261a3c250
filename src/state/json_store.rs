use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{TokenRecord, VerificationRecord, VerificationStore};
use crate::error::{BotError, Result};

const SCHEMA_VERSION: u64 = 2;

/// On-disk layout of the data file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDocument {
    /// Schema version for migrations
    pub version: u32,

    /// Last update timestamp
    pub last_updated: DateTime<Utc>,

    /// Guild ID -> verifications in the order they happened
    #[serde(default)]
    pub verified_users: HashMap<String, Vec<VerificationRecord>>,

    /// User ID -> most recent token
    #[serde(default)]
    pub oauth_tokens: HashMap<String, TokenRecord>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION as u32,
            last_updated: Utc::now(),
            verified_users: HashMap::new(),
            oauth_tokens: HashMap::new(),
        }
    }
}

/// Store backed by a single JSON document, rewritten after every change
pub struct JsonFileStore {
    path: PathBuf,
    doc: RwLock<StoreDocument>,
}

impl JsonFileStore {
    /// Load from a JSON file, or start empty if it does not exist
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let path_str = path.display().to_string();

        let doc = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let mut value: serde_json::Value =
                    serde_json::from_str(&content).map_err(|e| BotError::StateParse {
                        path: path_str.clone(),
                        source: e,
                    })?;

                let version = value.get("version").and_then(|v| v.as_u64()).unwrap_or(0);
                if version < SCHEMA_VERSION {
                    info!(
                        "Migrating data file {} from version {} to {}",
                        path_str, version, SCHEMA_VERSION
                    );
                    migrate_legacy(&mut value);
                }

                serde_json::from_value(value).map_err(|e| BotError::StateParse {
                    path: path_str.clone(),
                    source: e,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No data file at {}, starting empty", path_str);
                StoreDocument::default()
            }
            Err(e) => {
                return Err(BotError::StateLoad {
                    path: path_str,
                    source: e,
                })
            }
        };

        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    /// Write the document atomically. Callers hold the write lock and only
    /// swap `doc` into memory once this returns `Ok`.
    async fn persist(&self, doc: &StoreDocument) -> Result<()> {
        let path_str = self.path.display().to_string();
        let content = serde_json::to_string_pretty(doc)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = format!("{}.tmp", path_str);
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|e| BotError::StateSave {
                path: path_str.clone(),
                source: e,
            })?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| BotError::StateSave {
                path: path_str.clone(),
                source: e,
            })?;

        debug!("Saved data file {}", path_str);
        Ok(())
    }
}

#[async_trait]
impl VerificationStore for JsonFileStore {
    async fn record_verification(&self, record: VerificationRecord) -> Result<bool> {
        let mut doc = self.doc.write().await;
        let already = doc
            .verified_users
            .get(&record.guild_id)
            .is_some_and(|users| users.iter().any(|r| r.user_id == record.user_id));
        if already {
            return Ok(false);
        }

        let mut next = doc.clone();
        next.verified_users
            .entry(record.guild_id.clone())
            .or_default()
            .push(record);
        next.last_updated = Utc::now();
        self.persist(&next).await?;
        *doc = next;
        Ok(true)
    }

    async fn store_token(&self, record: TokenRecord) -> Result<()> {
        let mut doc = self.doc.write().await;
        let mut next = doc.clone();
        next.oauth_tokens.insert(record.user_id.clone(), record);
        next.last_updated = Utc::now();
        self.persist(&next).await?;
        *doc = next;
        Ok(())
    }

    async fn token_for(&self, user_id: &str) -> Result<Option<TokenRecord>> {
        Ok(self.doc.read().await.oauth_tokens.get(user_id).cloned())
    }

    async fn verified_users(&self, guild_id: &str) -> Result<Vec<VerificationRecord>> {
        Ok(self
            .doc
            .read()
            .await
            .verified_users
            .get(guild_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_verified(&self, guild_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .doc
            .read()
            .await
            .verified_users
            .get(guild_id)
            .map(|users| users.iter().any(|r| r.user_id == user_id))
            .unwrap_or(false))
    }

    async fn verification_count(&self) -> Result<usize> {
        Ok(self.doc.read().await.verified_users.values().map(Vec::len).sum())
    }
}

/// Rewrite a version-less document in place.
///
/// Old files keep `verified_users` as `{guild: [user_id, ...]}` and
/// `oauth_tokens` as `{user_id: token}`. The original timestamps are unknown,
/// so the migration time is used.
fn migrate_legacy(value: &mut serde_json::Value) {
    let now = serde_json::Value::String(Utc::now().to_rfc3339());

    let Some(root) = value.as_object_mut() else {
        return;
    };

    if let Some(guilds) = root
        .get_mut("verified_users")
        .and_then(|v| v.as_object_mut())
    {
        for (guild_id, users) in guilds.iter_mut() {
            let Some(list) = users.as_array_mut() else {
                continue;
            };
            for entry in list.iter_mut() {
                if let Some(user_id) = entry.as_str().map(str::to_string) {
                    *entry = serde_json::json!({
                        "guild_id": guild_id,
                        "user_id": user_id,
                        "verified_at": now,
                    });
                }
            }
        }
    }

    if let Some(tokens) = root.get_mut("oauth_tokens").and_then(|v| v.as_object_mut()) {
        for (user_id, token) in tokens.iter_mut() {
            if let Some(access_token) = token.as_str().map(str::to_string) {
                *token = serde_json::json!({
                    "user_id": user_id,
                    "access_token": access_token,
                    "updated_at": now,
                });
            }
        }
    }

    root.insert("version".to_string(), SCHEMA_VERSION.into());
    root.entry("last_updated").or_insert(now);
}
