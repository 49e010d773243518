//! 依存サービス待機モジュール（Exponential Backoff）
//!
//! 名前解決できること（到達性）と接続を受け付けること（準備完了）は別の状態です。
//! 依存先を起動しただけでは準備完了とみなさず、プローブで確認してから
//! 依存元を起動します。

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::error::{ContainerError, Result};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::InspectContainerOptions;
use bollard::models::HealthStatusEnum;
use dockyard_core::WaitConfig;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// 準備完了の確認手段
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// 対象が準備完了なら true。未起動や一時的なエラーは false として扱う
    async fn is_ready(&self, target: &str) -> Result<bool>;
}

/// `dependency` が準備完了になるまで待機
///
/// # Returns
/// * `Ok(attempts)` - 準備完了までに要した確認回数
/// * `Err(ContainerError::DependencyUnready)` - リトライを使い切った
pub async fn wait_until_ready(
    probe: &dyn ReadinessProbe,
    service: &str,
    dependency: &str,
    target: &str,
    config: &WaitConfig,
) -> Result<u32> {
    let max_retries = config.max_retries.max(1);

    for attempt in 0..max_retries {
        match probe.is_ready(target).await {
            Ok(true) => {
                info!(service, dependency, attempts = attempt + 1, "Dependency ready");
                return Ok(attempt + 1);
            }
            Ok(false) => {
                debug!(service, dependency, attempt, "Dependency not ready yet");
            }
            Err(e) => {
                debug!(service, dependency, attempt, error = %e, "Readiness probe failed");
            }
        }

        // 最後の試行でなければ待機
        if attempt + 1 < max_retries {
            sleep(Duration::from_millis(config.delay_for_attempt(attempt))).await;
        }
    }

    Err(ContainerError::DependencyUnready {
        service: service.to_string(),
        dependency: dependency.to_string(),
        attempts: max_retries,
    })
}

/// Docker のコンテナ状態とヘルスチェックで準備完了を判定
pub struct DockerHealthProbe {
    docker: Docker,
}

impl DockerHealthProbe {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ReadinessProbe for DockerHealthProbe {
    async fn is_ready(&self, container_name: &str) -> Result<bool> {
        let inspect_result = self
            .docker
            .inspect_container(container_name, None::<InspectContainerOptions>)
            .await?;

        let state = inspect_result
            .state
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: container_name.to_string(),
            })?;

        if !state.running.unwrap_or(false) {
            return Ok(false);
        }

        // ヘルスチェックが設定されている場合、そのステータスを確認
        if let Some(status) = state.health.and_then(|h| h.status) {
            return Ok(status == HealthStatusEnum::HEALTHY);
        }

        // ヘルスチェックがない場合はRunning状態で準備完了とみなす
        Ok(true)
    }
}
