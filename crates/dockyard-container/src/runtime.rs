//! Docker ランタイムアダプタ
//!
//! ネットワーク・コンテナ・ボリュームに対する Docker API 呼び出しをまとめます。
//! 409/304/404 などの状態コードはここで冪等な結果に読み替えます。

use crate::converter::instance_to_container_config;
use crate::error::{ContainerError, Result};
use bollard::Docker;
use dockyard_core::{InstanceSpec, LABEL_PROJECT, LABEL_SERVICE, Topology};
use futures_util::stream::{BoxStream, StreamExt};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, instrument};

/// コンテナのステータス
#[derive(Debug, Clone, Serialize)]
pub struct ContainerStatus {
    pub name: String,
    pub service: Option<String>,
    pub image: String,
    pub state: ContainerState,
    pub status: String,
    /// `host:container` 形式の公開ポート
    pub ports: Vec<String>,
}

/// コンテナの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerState {
    Running,
    Stopped,
    Unknown,
}

/// 作成済みリソースの扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    AlreadyExists,
}

/// ログの1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLine {
    Stdout(String),
    Stderr(String),
}

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// プロジェクトのネットワークを作成（既に存在する場合はそのまま）
    #[instrument(skip(self))]
    pub async fn ensure_network(&self, name: &str, project: &str) -> Result<Provisioned> {
        let request = bollard::models::NetworkCreateRequest {
            name: name.to_string(),
            driver: Some("bridge".to_string()),
            labels: Some(HashMap::from([(
                LABEL_PROJECT.to_string(),
                project.to_string(),
            )])),
            ..Default::default()
        };

        match self.docker.create_network(request).await {
            Ok(_) => {
                info!(network = %name, "Created network");
                Ok(Provisioned::Created)
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 409, ..
            }) => Ok(Provisioned::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    /// ネットワークを削除（存在しない場合は何もしない）
    pub async fn remove_network(&self, name: &str) -> Result<bool> {
        match self.docker.remove_network(name).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// イメージをレジストリから取得
    pub async fn pull_image(&self, image: &str) -> Result<()> {
        let (from_image, tag) = match image.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => (repo, tag),
            _ => (image, "latest"),
        };
        info!(image = %image, "Pulling image");

        #[allow(deprecated)]
        let options = bollard::image::CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };

        #[allow(deprecated)]
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(info) = stream.next().await {
            let info = info?;
            if let Some(status) = info.status {
                debug!(image = %image, %status, "Pull progress");
            }
        }
        Ok(())
    }

    pub async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// インスタンスのコンテナを作成して起動
    ///
    /// 同名のコンテナが既に存在する場合は削除して作り直す。名前付きボリュームは
    /// コンテナと独立しているため、作り直してもデータは残る。
    #[allow(deprecated)]
    #[instrument(skip(self, topology, instance), fields(service = %instance.name))]
    pub async fn start_instance(&self, topology: &Topology, instance: &InstanceSpec) -> Result<String> {
        let (config, options) = instance_to_container_config(topology, instance);
        let container_name = options.name.clone();

        let id = match self
            .docker
            .create_container(Some(options.clone()), config.clone())
            .await
        {
            Ok(response) => response.id,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 409, ..
            }) => {
                info!(container = %container_name, "Replacing existing container");
                self.remove_container(&container_name).await?;
                self.docker
                    .create_container(Some(options), config)
                    .await?
                    .id
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                self.pull_image(&instance.image).await?;
                self.docker
                    .create_container(Some(options), config)
                    .await?
                    .id
            }
            Err(e) => return Err(e.into()),
        };

        match self
            .docker
            .start_container(&id, None::<bollard::query_parameters::StartContainerOptions>)
            .await
        {
            Ok(_)
            | Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {}
            Err(e) => return Err(e.into()),
        }

        info!(container = %container_name, "Started container");
        Ok(container_name)
    }

    /// コンテナを停止して削除（存在しない場合は false）
    ///
    /// ボリュームは削除しない。
    pub async fn stop_and_remove(&self, container_name: &str) -> Result<bool> {
        match self
            .docker
            .stop_container(
                container_name,
                None::<bollard::query_parameters::StopContainerOptions>,
            )
            .await
        {
            Ok(_)
            | Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {}
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        self.remove_container(container_name).await?;
        Ok(true)
    }

    async fn remove_container(&self, container_name: &str) -> Result<()> {
        let options = bollard::query_parameters::RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self
            .docker
            .remove_container(container_name, Some(options))
            .await
        {
            Ok(_)
            | Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// プロジェクトのコンテナ一覧
    pub async fn list(&self, project: &str, all: bool) -> Result<Vec<ContainerStatus>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{}={}", LABEL_PROJECT, project)],
        );

        #[allow(deprecated)]
        let options = bollard::container::ListContainersOptions {
            all,
            filters,
            ..Default::default()
        };

        #[allow(deprecated)]
        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|container| {
                let status = container.status.unwrap_or_default();
                let state = if status.starts_with("Up") {
                    ContainerState::Running
                } else if status.is_empty() {
                    ContainerState::Unknown
                } else {
                    ContainerState::Stopped
                };
                ContainerStatus {
                    name: container
                        .names
                        .and_then(|n| n.into_iter().next())
                        .map(|n| n.trim_start_matches('/').to_string())
                        .unwrap_or_else(|| "N/A".to_string()),
                    service: container
                        .labels
                        .and_then(|mut labels| labels.remove(LABEL_SERVICE)),
                    image: container.image.unwrap_or_default(),
                    state,
                    status,
                    ports: container
                        .ports
                        .unwrap_or_default()
                        .iter()
                        .filter_map(|p| {
                            p.public_port
                                .map(|public| format!("{}:{}", public, p.private_port))
                        })
                        .collect(),
                }
            })
            .collect())
    }

    /// プロジェクトの実行中コンテナが既に使っているホストポート
    pub async fn held_host_ports(&self, project: &str) -> Result<BTreeSet<u16>> {
        let running = self.list(project, false).await?;
        Ok(running
            .iter()
            .flat_map(|c| c.ports.iter())
            .filter_map(|p| p.split(':').next()?.parse().ok())
            .collect())
    }

    /// コンテナのログをストリームとして取得
    pub fn logs(
        &self,
        container_name: &str,
        tail: usize,
        follow: bool,
    ) -> BoxStream<'_, Result<LogLine>> {
        #[allow(deprecated)]
        let options = bollard::container::LogsOptions::<String> {
            follow,
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            timestamps: true,
            ..Default::default()
        };

        let container = container_name.to_string();
        self.docker
            .logs(container_name, Some(options))
            .map(move |item| match item {
                Ok(bollard::container::LogOutput::StdErr { message }) => Ok(LogLine::Stderr(
                    String::from_utf8_lossy(&message).into_owned(),
                )),
                Ok(output) => Ok(LogLine::Stdout(output.to_string())),
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                }) => Err(ContainerError::ContainerNotFound {
                    container: container.clone(),
                }),
                Err(e) => Err(e.into()),
            })
            .boxed()
    }
}

/// 起動時に警告すべき設定を列挙
pub fn startup_warnings(topology: &Topology) -> Vec<String> {
    let mut warnings = Vec::new();
    for instance in topology.ordered_instances() {
        if instance.security.read_only_root
            && instance.mounts.is_empty()
            && instance.security.writable_paths.is_empty()
        {
            warnings.push(format!(
                "サービス '{}' はルートが読み取り専用で、書き込み可能なパスがありません",
                instance.name
            ));
        }
        if !instance.depends_on.is_empty() && instance.wait_for.max_retries == 0 {
            warnings.push(format!(
                "サービス '{}' の wait_for.max_retries が 0 のため、依存先の準備完了は1回だけ確認されます",
                instance.name
            ));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use dockyard_core::{EnvMap, parse_stack_string};

    #[test]
    fn test_startup_warnings_for_read_only_root_without_writable_paths() {
        let stack = parse_stack_string(
            r#"
project "inventory"
service "api" {
    image "inventory-api:1.4.0"
    profile "locked"
}
profile "locked" {
    read_only_root #true
}
"#,
            "inventory".to_string(),
        )
        .unwrap();
        let topology = Topology::assemble(&stack, None, &EnvMap::new()).unwrap();

        let warnings = startup_warnings(&topology);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("api"));
    }

    #[tokio::test]
    #[ignore] // Docker接続が必要なため、通常のテストではスキップ
    async fn test_network_lifecycle() {
        let docker = Docker::connect_with_local_defaults().unwrap();
        let runtime = DockerRuntime::new(docker);

        let first = runtime
            .ensure_network("dockyard-test-net", "dockyard-test")
            .await
            .unwrap();
        let second = runtime
            .ensure_network("dockyard-test-net", "dockyard-test")
            .await
            .unwrap();
        assert_eq!(first, Provisioned::Created);
        assert_eq!(second, Provisioned::AlreadyExists);

        assert!(runtime.remove_network("dockyard-test-net").await.unwrap());
        assert!(!runtime.remove_network("dockyard-test-net").await.unwrap());
    }
}
