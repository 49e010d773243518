//! 依存キャッシュ
//!
//! フィンガープリントをキーにステージ出力レイヤーを保存する、内容アドレス型の
//! キー・バリューストアです。読み取りは並行に行えます。同一キーの書き込みが
//! 重複しないことは [`crate::orchestrator::BuildOrchestrator`] のキー単位ロックが保証します。

use crate::error::{BuildError, Result};
use crate::layer::Layer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[async_trait]
pub trait DependencyCache: Send + Sync {
    /// キーに対応するレイヤーを取得
    async fn get(&self, key: &str) -> Result<Option<Layer>>;

    /// レイヤーを保存（同じキーは上書き）
    async fn put(&self, stage: &str, layer: &Layer) -> Result<()>;
}

/// メモリ上のキャッシュ（テスト用、初期状態は空）
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Layer>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn remove(&self, key: &str) -> Option<Layer> {
        self.entries.write().await.remove(key)
    }
}

#[async_trait]
impl DependencyCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Layer>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, _stage: &str, layer: &Layer) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(layer.key.clone(), layer.clone());
        Ok(())
    }
}

/// キャッシュエントリのメタデータ（`<key>.json`）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntryMetadata {
    pub key: String,
    pub stage: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// ディスク上のキャッシュ
///
/// `<dir>/<key>.json` にメタデータ、`<dir>/<key>.tar.gz` にレイヤーを保存する。
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn layer_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.tar.gz", key))
    }

    fn metadata_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// 保存済みエントリのメタデータ
    pub async fn metadata(&self, key: &str) -> Result<Option<CacheEntryMetadata>> {
        validate_key(key)?;
        let path = self.metadata_path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| BuildError::Cache {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DependencyCache for DiskCache {
    async fn get(&self, key: &str) -> Result<Option<Layer>> {
        let Some(metadata) = self.metadata(key).await? else {
            debug!(key = %key, "Cache miss");
            return Ok(None);
        };

        let archive = match tokio::fs::read(self.layer_path(key)).await {
            Ok(archive) => archive,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(key = %key, "Cache metadata without layer, treating as miss");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if archive.len() as u64 != metadata.size_bytes {
            warn!(key = %key, "Cached layer size mismatch, treating as miss");
            return Ok(None);
        }

        info!(key = %key, stage = %metadata.stage, "Cache hit");
        Ok(Some(Layer::new(key, archive)))
    }

    async fn put(&self, stage: &str, layer: &Layer) -> Result<()> {
        validate_key(&layer.key)?;

        // 一時ファイルに書いてから rename し、読み手に書きかけを見せない
        let layer_tmp = self.dir.join(format!("{}.tar.gz.tmp", layer.key));
        tokio::fs::write(&layer_tmp, &layer.archive).await?;
        tokio::fs::rename(&layer_tmp, self.layer_path(&layer.key)).await?;

        let metadata = CacheEntryMetadata {
            key: layer.key.clone(),
            stage: stage.to_string(),
            size_bytes: layer.archive.len() as u64,
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&metadata).map_err(|e| BuildError::Cache {
            key: layer.key.clone(),
            message: e.to_string(),
        })?;
        let metadata_tmp = self.dir.join(format!("{}.json.tmp", layer.key));
        tokio::fs::write(&metadata_tmp, json).await?;
        tokio::fs::rename(&metadata_tmp, self.metadata_path(&layer.key)).await?;

        debug!(key = %layer.key, stage = %stage, bytes = layer.archive.len(), "Stored layer");
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BuildError::Cache {
            key: key.to_string(),
            message: "キャッシュキーは16進文字列である必要があります".to_string(),
        });
    }
    Ok(())
}
