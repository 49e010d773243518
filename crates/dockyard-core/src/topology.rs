//! 実行トポロジー
//!
//! [`Stack`] と環境変数から、起動する各インスタンスの実効設定を組み立てます。
//! 組み立て結果は純粋な値で、ハードニングの適用は [`crate::hardening::apply`] が
//! 新しいトポロジーを返す形で行います。

use crate::env::{ConfigurationSet, EnvMap, check_database_link, resolve_for_service};
use crate::error::Result;
use crate::model::{HardeningProfile, HealthCheck, Port, Stack, VolumeMount, WaitConfig};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

/// コンテナラベル: プロジェクト名
pub const LABEL_PROJECT: &str = "dockyard.project";
/// コンテナラベル: サービス名
pub const LABEL_SERVICE: &str = "dockyard.service";

/// コンテナ名 `{project}-{service}`
pub fn container_name(project: &str, service: &str) -> String {
    format!("{}-{}", project, service)
}

/// Docker ボリューム名 `{project}_{volume}`
pub fn volume_name(project: &str, volume: &str) -> String {
    format!("{}_{}", project, volume)
}

/// 起動対象のトポロジー
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Topology {
    pub project: String,
    pub network: String,
    pub instances: BTreeMap<String, InstanceSpec>,
    pub volumes: BTreeSet<String>,
    /// 依存先が先に来る起動順
    pub startup_order: Vec<String>,
}

/// サービスインスタンスの実効設定
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSpec {
    /// 論理サービス名（ネットワーク上の名前）
    pub name: String,
    pub image: String,
    pub command: Option<String>,
    pub ports: Vec<Port>,
    pub environment: ConfigurationSet,
    pub mounts: Vec<VolumeMount>,
    pub depends_on: Vec<String>,
    pub healthcheck: Option<HealthCheck>,
    pub wait_for: WaitConfig,
    /// ベース設定にプロファイルを重ねた実行時制限
    pub security: HardeningProfile,
}

impl Topology {
    /// スタックからトポロジーを組み立てる
    ///
    /// サービスごとに環境変数を解決し、データベース接続先を検証したうえで、
    /// サービスに宣言されたプロファイルを適用する。
    #[instrument(skip_all, fields(project = %stack.name))]
    pub fn assemble(
        stack: &Stack,
        override_env: Option<&EnvMap>,
        process_env: &EnvMap,
    ) -> Result<Self> {
        let startup_order = stack.startup_order()?;
        let mut instances = BTreeMap::new();

        for (name, service) in &stack.services {
            let environment = resolve_for_service(service, override_env, process_env);

            if let Some(link) = &service.database {
                // 同一スタックのサービスは全て同じ仮想ネットワークに参加する
                let shares_network = stack.services.contains_key(&link.service);
                check_database_link(name, link, &environment, shares_network)?;
            }

            let mut security = HardeningProfile {
                restart_policy: service.restart,
                user: service.user.clone(),
                ..Default::default()
            };
            for profile_name in &service.profiles {
                security = security.compose(stack.profile(profile_name)?);
            }

            debug!(
                service = %name,
                variables = environment.len(),
                profiles = service.profiles.len(),
                "Assembled instance"
            );

            instances.insert(
                name.clone(),
                InstanceSpec {
                    name: name.clone(),
                    image: stack.image_for(name)?,
                    command: service.command.clone(),
                    ports: service.ports.clone(),
                    environment,
                    mounts: service.volumes.clone(),
                    depends_on: service.depends_on.clone(),
                    healthcheck: service.healthcheck.clone(),
                    wait_for: service.wait_for.clone().unwrap_or_default(),
                    security,
                },
            );
        }

        Ok(Self {
            project: stack.name.clone(),
            network: stack.network.clone(),
            instances,
            volumes: stack.volumes.clone(),
            startup_order,
        })
    }

    pub fn container_name(&self, service: &str) -> String {
        container_name(&self.project, service)
    }

    pub fn volume_name(&self, volume: &str) -> String {
        volume_name(&self.project, volume)
    }

    /// 起動順に並んだインスタンス
    pub fn ordered_instances(&self) -> impl Iterator<Item = &InstanceSpec> {
        self.startup_order
            .iter()
            .filter_map(|name| self.instances.get(name))
    }

    /// コンテナに付与するラベル
    pub fn labels_for(&self, service: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_PROJECT.to_string(), self.project.clone()),
            (LABEL_SERVICE.to_string(), service.to_string()),
        ])
    }
}
