//! ビルドオーケストレーター
//!
//! ステージを宣言順に逐次実行し、依存キャッシュを読み書きします。

use crate::cache::DependencyCache;
use crate::error::{BuildError, Result};
use crate::executor::{StageExecutor, StageRequest};
use crate::fingerprint::stage_fingerprint;
use crate::layer::Layer;
use crate::stage::{CacheStatus, decide};
use dockyard_core::{StageSpec, check_stage_order};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// ステージごとの結果
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub index: usize,
    pub name: String,
    pub key: String,
    pub status: CacheStatus,
    pub duration: Duration,
}

/// ビルド全体の結果
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub stages: Vec<StageReport>,
}

impl BuildReport {
    pub fn status_of(&self, name: &str) -> Option<CacheStatus> {
        self.stages.iter().find(|s| s.name == name).map(|s| s.status)
    }

    pub fn hits(&self) -> usize {
        self.stages.iter().filter(|s| s.status.is_hit()).count()
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }
}

/// ビルドの出力
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub report: BuildReport,
    /// 実行順のステージ出力レイヤー
    pub layers: Vec<Layer>,
}

impl BuildOutput {
    /// 成果物を後段のレイヤーから順に探す
    pub fn find_artifact(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        for layer in self.layers.iter().rev() {
            if let Some(contents) = layer.read_file(path)? {
                return Ok(Some(contents));
            }
        }
        Ok(None)
    }
}

/// ステージ通知（進捗表示用）
pub trait BuildObserver: Send + Sync {
    fn stage_started(&self, _index: usize, _stage: &StageSpec) {}
    fn stage_finished(&self, _report: &StageReport) {}
    fn stage_failed(&self, _index: usize, _stage: &StageSpec, _error: &BuildError) {}
}

/// 何もしないオブザーバー
#[derive(Debug, Default)]
pub struct NoopObserver;

impl BuildObserver for NoopObserver {}

/// キー単位の非同期ロック
#[derive(Debug, Default)]
struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

pub struct BuildOrchestrator {
    cache: Arc<dyn DependencyCache>,
    executor: Arc<dyn StageExecutor>,
    locks: KeyLocks,
    timeout: Duration,
}

impl BuildOrchestrator {
    pub fn new(cache: Arc<dyn DependencyCache>, executor: Arc<dyn StageExecutor>) -> Self {
        Self {
            cache,
            executor,
            locks: KeyLocks::default(),
            timeout: Duration::from_secs(1800),
        }
    }

    /// ステージ1つあたりのタイムアウト
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// ステージを順に実行
    ///
    /// 失敗したステージがあればその時点で中断し、ステージ番号付きのエラーを返す。
    pub async fn run(&self, workspace: &Path, stages: &[StageSpec]) -> Result<BuildOutput> {
        self.run_with_observer(workspace, stages, &NoopObserver).await
    }

    #[instrument(skip_all, fields(workspace = %workspace.display(), stages = stages.len()))]
    pub async fn run_with_observer(
        &self,
        workspace: &Path,
        stages: &[StageSpec],
        observer: &dyn BuildObserver,
    ) -> Result<BuildOutput> {
        check_stage_order(stages)?;

        let mut report = BuildReport::default();
        let mut layers: Vec<Layer> = Vec::with_capacity(stages.len());
        let mut upstream_rebuilt = false;

        for (index, stage) in stages.iter().enumerate() {
            observer.stage_started(index, stage);
            let started = Instant::now();
            let upstream_key = layers.last().map(|l| l.key.as_str());

            let result = self
                .run_stage(index, stage, workspace, &layers, upstream_key, upstream_rebuilt)
                .await;

            let (layer, status) = match result {
                Ok(done) => done,
                Err(e) => {
                    let error = BuildError::StageFailed {
                        index,
                        stage: stage.name.clone(),
                        source: Box::new(e),
                    };
                    warn!(index, stage = %stage.name, error = %error, "Build stage failed");
                    observer.stage_failed(index, stage, &error);
                    return Err(error);
                }
            };

            upstream_rebuilt |= status == CacheStatus::Miss;
            let stage_report = StageReport {
                index,
                name: stage.name.clone(),
                key: layer.key.clone(),
                status,
                duration: started.elapsed(),
            };
            info!(
                index,
                stage = %stage.name,
                status = status.label(),
                elapsed_ms = stage_report.duration.as_millis() as u64,
                "Stage complete"
            );
            observer.stage_finished(&stage_report);
            report.stages.push(stage_report);
            layers.push(layer);
        }

        Ok(BuildOutput { report, layers })
    }

    async fn run_stage(
        &self,
        index: usize,
        stage: &StageSpec,
        workspace: &Path,
        layers: &[Layer],
        upstream_key: Option<&str>,
        upstream_rebuilt: bool,
    ) -> Result<(Layer, CacheStatus)> {
        let key = stage_fingerprint(workspace, stage, upstream_key)?;
        debug!(index, stage = %stage.name, key = %key, "Computed stage fingerprint");

        if !upstream_rebuilt
            && let Some(layer) = self.cache.get(&key).await?
        {
            return Ok((layer, decide(true, false)));
        }

        // 同じキーを実行するのは1回だけ
        let lock = self.locks.lock_for(&key);
        let _guard = lock.lock().await;

        if !upstream_rebuilt
            && let Some(layer) = self.cache.get(&key).await?
        {
            debug!(key = %key, "Layer filled by a concurrent build");
            return Ok((layer, decide(true, false)));
        }

        let layer = self
            .executor
            .execute(StageRequest {
                index,
                stage,
                key: &key,
                workspace,
                layers,
                timeout: self.timeout,
            })
            .await?;
        self.cache.put(&stage.name, &layer).await?;

        Ok((layer, decide(false, upstream_rebuilt)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use async_trait::async_trait;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// コマンドを実行せず、実行回数だけを記録する
    #[derive(Default)]
    struct RecordingExecutor {
        runs: Mutex<Vec<String>>,
        fail_stage: Option<String>,
        concurrent_delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl RecordingExecutor {
        fn runs(&self) -> Vec<String> {
            self.runs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StageExecutor for RecordingExecutor {
        async fn execute(&self, request: StageRequest<'_>) -> Result<Layer> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.concurrent_delay {
                tokio::time::sleep(delay).await;
            }
            self.runs.lock().unwrap().push(request.stage.name.clone());
            if self.fail_stage.as_deref() == Some(request.stage.name.as_str()) {
                return Err(BuildError::CommandFailed {
                    code: Some(101),
                    stderr: "error[E0425]: cannot find value".to_string(),
                });
            }
            Ok(Layer::new(request.key, request.stage.name.as_bytes().to_vec()))
        }
    }

    fn stages() -> Vec<StageSpec> {
        vec![
            StageSpec {
                name: "dependencies".to_string(),
                inputs: vec![PathBuf::from("Cargo.toml")],
                run: "cargo fetch".to_string(),
                outputs: vec![],
                manifest: true,
            },
            StageSpec {
                name: "package".to_string(),
                inputs: vec![PathBuf::from("src")],
                run: "cargo build --release".to_string(),
                outputs: vec![],
                manifest: false,
            },
        ]
    }

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Cargo.toml"), "[dependencies]\nserde = \"1\"\n").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        dir
    }

    fn orchestrator(executor: Arc<RecordingExecutor>) -> (Arc<MemoryCache>, BuildOrchestrator) {
        let cache = Arc::new(MemoryCache::new());
        let orchestrator = BuildOrchestrator::new(cache.clone(), executor);
        (cache, orchestrator)
    }

    #[tokio::test]
    async fn test_unchanged_manifest_is_hit_on_second_build() {
        let dir = workspace();
        let executor = Arc::new(RecordingExecutor::default());
        let (_, orchestrator) = orchestrator(executor.clone());

        let first = orchestrator.run(dir.path(), &stages()).await.unwrap();
        assert_eq!(first.report.hits(), 0);

        let second = orchestrator.run(dir.path(), &stages()).await.unwrap();
        assert_eq!(second.report.status_of("dependencies"), Some(CacheStatus::Hit));
        assert_eq!(second.report.status_of("package"), Some(CacheStatus::Hit));
        assert_eq!(executor.runs(), vec!["dependencies", "package"]);
    }

    #[tokio::test]
    async fn test_source_only_change_keeps_dependency_cache() {
        let dir = workspace();
        let executor = Arc::new(RecordingExecutor::default());
        let (_, orchestrator) = orchestrator(executor.clone());
        orchestrator.run(dir.path(), &stages()).await.unwrap();

        fs::write(dir.path().join("src/main.rs"), "fn main() { run(); }").unwrap();
        let second = orchestrator.run(dir.path(), &stages()).await.unwrap();

        assert_eq!(second.report.status_of("dependencies"), Some(CacheStatus::Hit));
        assert_eq!(second.report.status_of("package"), Some(CacheStatus::Miss));
    }

    #[tokio::test]
    async fn test_upstream_miss_recomputes_downstream() {
        let dir = workspace();
        let executor = Arc::new(RecordingExecutor::default());
        let (cache, orchestrator) = orchestrator(executor.clone());
        let first = orchestrator.run(dir.path(), &stages()).await.unwrap();

        // 依存ステージのエントリだけを消す（入力は変えない）
        cache.remove(&first.report.stages[0].key).await;
        let second = orchestrator.run(dir.path(), &stages()).await.unwrap();

        assert_eq!(second.report.status_of("dependencies"), Some(CacheStatus::Miss));
        assert_eq!(second.report.status_of("package"), Some(CacheStatus::Miss));
        assert_eq!(executor.runs().len(), 4);
    }

    #[tokio::test]
    async fn test_manifest_change_changes_downstream_key() {
        let dir = workspace();
        let executor = Arc::new(RecordingExecutor::default());
        let (_, orchestrator) = orchestrator(executor);
        let first = orchestrator.run(dir.path(), &stages()).await.unwrap();

        fs::write(dir.path().join("Cargo.toml"), "[dependencies]\nserde = \"2\"\n").unwrap();
        let second = orchestrator.run(dir.path(), &stages()).await.unwrap();

        assert_ne!(first.report.stages[1].key, second.report.stages[1].key);
    }

    #[tokio::test]
    async fn test_manifest_after_source_stage_is_rejected_before_running() {
        let dir = workspace();
        let executor = Arc::new(RecordingExecutor::default());
        let (cache, orchestrator) = orchestrator(executor.clone());
        let mut reversed = stages();
        reversed.reverse();

        let err = orchestrator.run(dir.path(), &reversed).await.unwrap_err();

        assert!(matches!(
            err,
            BuildError::Stack(dockyard_core::StackError::ManifestAfterSource { .. })
        ));
        assert!(executor.runs().is_empty());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_stage_aborts_with_index() {
        let dir = workspace();
        let executor = Arc::new(RecordingExecutor {
            fail_stage: Some("package".to_string()),
            ..Default::default()
        });
        let (cache, orchestrator) = orchestrator(executor);

        let err = orchestrator.run(dir.path(), &stages()).await.unwrap_err();

        match &err {
            BuildError::StageFailed { index, stage, .. } => {
                assert_eq!(*index, 1);
                assert_eq!(stage, "package");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.stage_identifier().as_deref(), Some("stage 1 (package)"));
        // 成功した依存ステージだけがキャッシュに残る
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_builds_execute_each_key_once() {
        let dir = workspace();
        let executor = Arc::new(RecordingExecutor {
            concurrent_delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let (_, orchestrator) = orchestrator(executor.clone());
        let orchestrator = Arc::new(orchestrator);
        let stages = stages();

        let (a, b) = tokio::join!(
            orchestrator.run(dir.path(), &stages),
            orchestrator.run(dir.path(), &stages)
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_find_artifact_prefers_latest_layer() {
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("app"), "v1").unwrap();
        let old = Layer::capture("a", source.path(), &[PathBuf::from("app")]).unwrap();
        fs::write(source.path().join("app"), "v2").unwrap();
        let new = Layer::capture("b", source.path(), &[PathBuf::from("app")]).unwrap();

        let output = BuildOutput {
            report: BuildReport::default(),
            layers: vec![old, new],
        };
        assert_eq!(
            output.find_artifact(Path::new("app")).unwrap(),
            Some(b"v2".to_vec())
        );
    }
}
