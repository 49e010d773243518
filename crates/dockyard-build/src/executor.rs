//! ステージ実行
//!
//! [`StageExecutor`] はステージを1つ実行して出力レイヤーを返します。
//! テストではこのトレイトを差し替え、実際のコマンドを実行せずに
//! オーケストレーターを検証します。

use crate::error::{BuildError, Result};
use crate::fingerprint::collect_inputs;
use crate::layer::Layer;
use async_trait::async_trait;
use dockyard_core::StageSpec;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, instrument};

/// ステージ実行の入力
#[derive(Debug)]
pub struct StageRequest<'a> {
    pub index: usize,
    pub stage: &'a StageSpec,
    pub key: &'a str,
    /// ソースツリーのルート
    pub workspace: &'a Path,
    /// 先行ステージの出力レイヤー（実行順）
    pub layers: &'a [Layer],
    pub timeout: Duration,
}

#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(&self, request: StageRequest<'_>) -> Result<Layer>;
}

/// `sh -c` でステージのコマンドを実行する
///
/// 作業ディレクトリは一時ディレクトリで、先行レイヤーと宣言された入力だけが置かれる。
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    shell: PathBuf,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("sh"),
        }
    }
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn prepare_scratch(request: &StageRequest<'_>, scratch: &Path) -> Result<()> {
        for layer in request.layers {
            layer.unpack_into(scratch)?;
        }
        for (relative, absolute) in collect_inputs(request.workspace, &request.stage.inputs)? {
            let target = scratch.join(&relative);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&absolute, &target)?;
        }
        Ok(())
    }
}

#[async_trait]
impl StageExecutor for CommandExecutor {
    #[instrument(skip_all, fields(index = request.index, stage = %request.stage.name))]
    async fn execute(&self, request: StageRequest<'_>) -> Result<Layer> {
        let scratch = tempfile::Builder::new()
            .prefix("dockyard-stage-")
            .tempdir()?;
        Self::prepare_scratch(&request, scratch.path())?;

        debug!(command = %request.stage.run, scratch = %scratch.path().display(), "Running stage command");

        let child = tokio::process::Command::new(&self.shell)
            .arg("-c")
            .arg(&request.stage.run)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(request.timeout, child.wait_with_output())
            .await
            .map_err(|_| BuildError::Timeout {
                timeout_secs: request.timeout.as_secs(),
            })??;

        if !output.status.success() {
            return Err(BuildError::CommandFailed {
                code: output.status.code(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), 20),
            });
        }

        Layer::capture(request.key, scratch.path(), &request.stage.outputs)
    }
}

/// 末尾 n 行
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn spec(run: &str, inputs: &[&str], outputs: &[&str]) -> StageSpec {
        StageSpec {
            name: "package".to_string(),
            inputs: inputs.iter().map(PathBuf::from).collect(),
            run: run.to_string(),
            outputs: outputs.iter().map(PathBuf::from).collect(),
            manifest: false,
        }
    }

    fn request<'a>(stage: &'a StageSpec, workspace: &'a Path, layers: &'a [Layer]) -> StageRequest<'a> {
        StageRequest {
            index: 1,
            stage,
            key: "abc",
            workspace,
            layers,
            timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_command_executor_captures_outputs() {
        let workspace = TempDir::new().unwrap();
        fs::write(workspace.path().join("main.txt"), "hello").unwrap();
        let stage = spec("mkdir -p out && cp main.txt out/app", &["main.txt"], &["out/app"]);

        let layer = CommandExecutor::new()
            .execute(request(&stage, workspace.path(), &[]))
            .await
            .unwrap();

        assert_eq!(layer.key, "abc");
        assert_eq!(
            layer.read_file(Path::new("out/app")).unwrap(),
            Some(b"hello".to_vec())
        );
    }

    #[tokio::test]
    async fn test_command_executor_sees_previous_layers() {
        let workspace = TempDir::new().unwrap();
        let prepared = TempDir::new().unwrap();
        fs::create_dir_all(prepared.path().join("vendor")).unwrap();
        fs::write(prepared.path().join("vendor/dep.txt"), "dep").unwrap();
        let previous = Layer::capture("prev", prepared.path(), &[PathBuf::from("vendor")]).unwrap();

        let stage = spec("cat vendor/dep.txt > result.txt", &[], &["result.txt"]);
        let layers = [previous];
        let layer = CommandExecutor::new()
            .execute(request(&stage, workspace.path(), &layers))
            .await
            .unwrap();

        assert_eq!(
            layer.read_file(Path::new("result.txt")).unwrap(),
            Some(b"dep\n".to_vec())
        );
    }

    #[tokio::test]
    async fn test_stage_without_outputs_passes_working_directory_on() {
        let workspace = TempDir::new().unwrap();
        let deps = spec("echo dep > vendor.txt", &[], &[]);
        let first = CommandExecutor::new()
            .execute(request(&deps, workspace.path(), &[]))
            .await
            .unwrap();

        let package = spec("cat vendor.txt > app", &[], &["app"]);
        let layers = [first];
        let layer = CommandExecutor::new()
            .execute(request(&package, workspace.path(), &layers))
            .await
            .unwrap();

        assert_eq!(
            layer.read_file(Path::new("app")).unwrap(),
            Some(b"dep\n".to_vec())
        );
    }

    #[tokio::test]
    async fn test_command_executor_failure() {
        let workspace = TempDir::new().unwrap();
        let stage = spec("echo broken >&2; exit 3", &[], &[]);

        let result = CommandExecutor::new()
            .execute(request(&stage, workspace.path(), &[]))
            .await;

        match result {
            Err(BuildError::CommandFailed { code, stderr }) => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("broken"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_command_executor_timeout() {
        let workspace = TempDir::new().unwrap();
        let stage = spec("sleep 5", &[], &[]);
        let mut req = request(&stage, workspace.path(), &[]);
        req.timeout = Duration::from_millis(100);

        let result = CommandExecutor::new().execute(req).await;
        assert!(matches!(result, Err(BuildError::Timeout { .. })));
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc", 2), "b\nc");
        assert_eq!(tail("a", 5), "a");
    }
}
