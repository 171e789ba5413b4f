//! スナップショットキャッシュ
//!
//! サービスごとに最後に調整済みのスナップショットを1件保持する。
//! 書き込みは一時ファイル→fsync→rename の原子的置換で、途中で落ちても
//! 半端なエントリは残らない。破損エントリはキャッシュミスとして扱う。

use crate::common::error::CacheError;
use crate::types::{ComponentState, HealthStatus, IncidentRecord, MaintenanceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// キャッシュエントリのスキーマバージョン
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// 永続化されるサービス単位のスナップショット
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// スキーマバージョン
    pub schema_version: u32,
    /// サービスキー
    pub service_key: String,
    /// 全体ステータス
    pub overall_status: HealthStatus,
    /// コンポーネント一覧
    #[serde(default)]
    pub components: Vec<ComponentState>,
    /// 継続中のインシデント
    #[serde(default)]
    pub incidents: Vec<IncidentRecord>,
    /// 継続中のメンテナンス
    #[serde(default)]
    pub maintenances: Vec<MaintenanceRecord>,
    /// 最後に観測した時刻
    pub observed_at: DateTime<Utc>,
}

impl CacheEntry {
    /// 現行スキーマでエントリを作成
    pub fn new(
        service_key: impl Into<String>,
        overall_status: HealthStatus,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            service_key: service_key.into(),
            overall_status,
            components: Vec::new(),
            incidents: Vec::new(),
            maintenances: Vec::new(),
            observed_at,
        }
    }
}

/// Per-service snapshot persistence.
///
/// Implementations only need per-key atomicity; rounds never overlap.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Last saved entry for `service_key`, `None` if never saved or purged.
    async fn load(&self, service_key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Atomically replace the entry for `entry.service_key`.
    async fn save(&self, entry: &CacheEntry) -> Result<(), CacheError>;

    /// Drop every entry, returning how many were removed.
    async fn purge_all(&self) -> Result<usize, CacheError>;
}

/// ファイルベースのキャッシュ（`<dir>/<key>.json`）
#[derive(Debug)]
pub struct FileCacheStore {
    dir: PathBuf,
    seq: AtomicU64,
}

impl FileCacheStore {
    /// 新しいファイルキャッシュを作成（ディレクトリは初回保存時に作成）
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    /// キャッシュディレクトリ
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, service_key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", service_key))
    }

    fn temp_path(&self, service_key: &str) -> PathBuf {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            "{}.json.tmp.{}.{}",
            service_key,
            std::process::id(),
            seq
        ))
    }

    async fn write_atomic(&self, key: &str, body: &[u8]) -> Result<(), CacheError> {
        let io_err = |source| CacheError::Io {
            key: key.to_string(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let temp = self.temp_path(key);
        let result = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            file.write_all(body).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&temp, self.entry_path(key)).await
        }
        .await;

        if let Err(err) = result {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_err(err));
        }
        Ok(())
    }
}

fn is_cache_file(name: &str) -> bool {
    name.ends_with(".json") || name.contains(".json.tmp.")
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn load(&self, service_key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(service_key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    key: service_key.to_string(),
                    source,
                })
            }
        };

        let entry: CacheEntry =
            serde_json::from_slice(&raw).map_err(|e| CacheError::Corrupt {
                key: service_key.to_string(),
                reason: e.to_string(),
            })?;

        if entry.schema_version != CACHE_SCHEMA_VERSION {
            return Err(CacheError::Corrupt {
                key: service_key.to_string(),
                reason: format!("unsupported schema version {}", entry.schema_version),
            });
        }
        if entry.service_key != service_key {
            return Err(CacheError::Corrupt {
                key: service_key.to_string(),
                reason: format!("entry belongs to '{}'", entry.service_key),
            });
        }
        Ok(Some(entry))
    }

    async fn save(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let body = serde_json::to_vec_pretty(entry)?;
        self.write_atomic(&entry.service_key, &body).await?;
        debug!(service = %entry.service_key, "Saved snapshot cache entry");
        Ok(())
    }

    async fn purge_all(&self) -> Result<usize, CacheError> {
        let io_err = |source| CacheError::Io {
            key: String::new(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(io_err(err)),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !is_cache_file(name) {
                continue;
            }
            tokio::fs::remove_file(entry.path()).await.map_err(io_err)?;
            removed += 1;
        }

        info!(dir = %self.dir.display(), removed, "Purged snapshot cache");
        Ok(removed)
    }
}

/// プロセス内メモリキャッシュ（テスト・`once` 実行用）
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    /// 空のメモリキャッシュを作成
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn load(&self, service_key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.get(service_key).cloned())
    }

    async fn save(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(entry.service_key.clone(), entry.clone());
        Ok(())
    }

    async fn purge_all(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}
