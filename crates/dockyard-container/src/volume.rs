//! 名前付きボリュームのライフサイクル
//!
//! ボリュームの寿命はコンテナから独立しています。インスタンスの停止や削除で
//! ボリュームが消えることはなく、削除は [`VolumeManager::delete_volume`] の
//! 明示的な呼び出しだけが行います。

use crate::error::{ContainerError, Result};
use async_trait::async_trait;
use bollard::Docker;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// 名前付きボリューム
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedVolume {
    pub name: String,
    /// ドライバ上の実体の場所（取得できる場合）
    pub mountpoint: Option<PathBuf>,
    pub labels: BTreeMap<String, String>,
}

/// ボリュームの実体を管理するバックエンド
#[async_trait]
pub trait VolumeDriver: Send + Sync {
    /// 作成する。既に存在する場合は既存のボリュームを返す
    async fn create(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<NamedVolume>;

    async fn inspect(&self, name: &str) -> Result<Option<NamedVolume>>;

    async fn remove(&self, name: &str) -> Result<()>;

    /// ドライバが把握している、このボリュームをマウント中の実行中インスタンス
    async fn running_users(&self, name: &str) -> Result<Vec<String>>;
}

/// ディレクトリをボリュームの実体とするドライバ
pub struct LocalVolumeDriver {
    root: PathBuf,
}

impl LocalVolumeDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ContainerError::VolumeNotFound(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl VolumeDriver for LocalVolumeDriver {
    async fn create(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<NamedVolume> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&path).await?;
        Ok(NamedVolume {
            name: name.to_string(),
            mountpoint: Some(path),
            labels: labels.clone(),
        })
    }

    async fn inspect(&self, name: &str) -> Result<Option<NamedVolume>> {
        let path = self.path_for(name)?;
        if !path.is_dir() {
            return Ok(None);
        }
        Ok(Some(NamedVolume {
            name: name.to_string(),
            mountpoint: Some(path),
            labels: BTreeMap::new(),
        }))
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        tokio::fs::remove_dir_all(&path).await?;
        Ok(())
    }

    async fn running_users(&self, _name: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Docker の名前付きボリュームを使うドライバ
pub struct DockerVolumeDriver {
    docker: Docker,
}

impl DockerVolumeDriver {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

fn from_docker_volume(volume: bollard::models::Volume) -> NamedVolume {
    NamedVolume {
        mountpoint: (!volume.mountpoint.is_empty()).then(|| PathBuf::from(&volume.mountpoint)),
        labels: volume.labels.into_iter().collect(),
        name: volume.name,
    }
}

#[async_trait]
impl VolumeDriver for DockerVolumeDriver {
    async fn create(&self, name: &str, labels: &BTreeMap<String, String>) -> Result<NamedVolume> {
        // Docker のボリューム作成は同名が存在しても成功する
        let options = bollard::models::VolumeCreateOptions {
            name: Some(name.to_string()),
            labels: Some(labels.clone().into_iter().collect::<HashMap<_, _>>()),
            ..Default::default()
        };
        let volume = self.docker.create_volume(options).await?;
        Ok(from_docker_volume(volume))
    }

    async fn inspect(&self, name: &str) -> Result<Option<NamedVolume>> {
        match self.docker.inspect_volume(name).await {
            Ok(volume) => Ok(Some(from_docker_volume(volume))),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, name: &str) -> Result<()> {
        match self
            .docker
            .remove_volume(name, None::<bollard::query_parameters::RemoveVolumeOptions>)
            .await
        {
            Ok(_) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(ContainerError::VolumeNotFound(name.to_string())),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 409, ..
            }) => {
                // 停止済みコンテナが参照しているだけでも Docker は削除を拒否する
                Err(volume_conflict(name, self.running_users(name).await))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn running_users(&self, name: &str) -> Result<Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert("volume".to_string(), vec![name.to_string()]);
        filters.insert("status".to_string(), vec!["running".to_string()]);

        #[allow(deprecated)]
        let options = bollard::container::ListContainersOptions {
            all: false,
            filters,
            ..Default::default()
        };

        #[allow(deprecated)]
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| c.names.and_then(|names| names.into_iter().next()))
            .map(|n| n.trim_start_matches('/').to_string())
            .collect())
    }
}

/// ボリュームの作成・バインド・削除を管理
pub struct VolumeManager<D: VolumeDriver> {
    driver: D,
    /// ボリューム名 -> (インスタンス名 -> マウント先)
    bindings: Mutex<BTreeMap<String, BTreeMap<String, PathBuf>>>,
}

impl<D: VolumeDriver> VolumeManager<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            bindings: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// ボリュームを作成（冪等）
    #[instrument(skip(self, labels))]
    pub async fn create_volume(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<NamedVolume> {
        if let Some(existing) = self.driver.inspect(name).await? {
            debug!("Volume already exists");
            return Ok(existing);
        }
        let volume = self.driver.create(name, labels).await?;
        info!(volume = %name, "Created volume");
        Ok(volume)
    }

    /// 実行中のインスタンスにボリュームをバインド
    pub async fn bind(&self, volume: &str, instance: &str, mount_path: &Path) -> Result<()> {
        if self.driver.inspect(volume).await?.is_none() {
            return Err(ContainerError::VolumeNotFound(volume.to_string()));
        }
        self.bindings
            .lock()
            .await
            .entry(volume.to_string())
            .or_default()
            .insert(instance.to_string(), mount_path.to_path_buf());
        debug!(volume = %volume, instance = %instance, mount = %mount_path.display(), "Bound volume");
        Ok(())
    }

    /// インスタンスの停止・削除を記録する。ボリュームには触れない
    pub async fn instance_stopped(&self, instance: &str) {
        let mut bindings = self.bindings.lock().await;
        for users in bindings.values_mut() {
            users.remove(instance);
        }
        bindings.retain(|_, users| !users.is_empty());
    }

    /// ボリュームを使用中の実行中インスタンス
    pub async fn users_of(&self, volume: &str) -> Result<Vec<String>> {
        let mut users: BTreeSet<String> = self
            .bindings
            .lock()
            .await
            .get(volume)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default();
        users.extend(self.driver.running_users(volume).await?);
        Ok(users.into_iter().collect())
    }

    /// ボリュームを削除（破壊的操作）
    ///
    /// `confirmed` が false の場合、または実行中のインスタンスにバインドされている
    /// 場合は何も削除せずにエラーを返す。使用中の判定は即時で、解放を待たない。
    #[instrument(skip(self))]
    pub async fn delete_volume(&self, name: &str, confirmed: bool) -> Result<()> {
        if !confirmed {
            return Err(ContainerError::ConfirmationRequired(name.to_string()));
        }
        if self.driver.inspect(name).await?.is_none() {
            return Err(ContainerError::VolumeNotFound(name.to_string()));
        }

        let instances = self.users_of(name).await?;
        if !instances.is_empty() {
            return Err(ContainerError::VolumeInUse {
                volume: name.to_string(),
                instances,
            });
        }

        self.driver.remove(name).await?;
        info!(volume = %name, "Deleted volume");
        Ok(())
    }
}

/// 削除が競合したときのエラー。使用者の取得に失敗した場合はそのエラーを返す
fn volume_conflict(name: &str, users: Result<Vec<String>>) -> ContainerError {
    match users {
        Ok(instances) => ContainerError::VolumeInUse {
            volume: name.to_string(),
            instances,
        },
        Err(e) => e,
    }
}
