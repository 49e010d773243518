//! ランタイムイメージの組み立て
//!
//! 最終ステージの成果物だけを最小ベースイメージにコピーし、専用の非特権
//! アカウントで実行するイメージ定義を生成します。

use crate::context::ContextBuilder;
use crate::error::{BuildError, Result};
use crate::orchestrator::BuildOutput;
use dockyard_core::{BuildSpec, RuntimeSpec};
use serde::Serialize;
use std::path::Path;

/// 成果物を配置するディレクトリ
pub const APP_DIR: &str = "/app";

/// 組み立てたイメージのメタデータ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    /// メイン参照（`repo:tag`）
    pub reference: String,
    /// メイン参照を含む全てのタグ
    pub tags: Vec<String>,
    /// 元になったビルドレイヤーのキー（実行順）
    pub layers: Vec<String>,
    pub entry_command: Vec<String>,
    pub exposed_port: u16,
    pub run_as: String,
}

/// Docker に渡す直前の状態
#[derive(Debug, Clone)]
pub struct AssembledImage {
    pub image: Image,
    pub dockerfile: String,
    /// tar.gz 形式のビルドコンテキスト
    pub context: Vec<u8>,
}

pub struct ImageAssembler;

impl ImageAssembler {
    /// ビルド出力からランタイムイメージを組み立てる
    pub fn assemble(spec: &BuildSpec, output: &BuildOutput) -> Result<AssembledImage> {
        let runtime = &spec.runtime;
        let artifact_name = artifact_name(&runtime.artifact)?;
        let artifact = output
            .find_artifact(&runtime.artifact)?
            .ok_or_else(|| BuildError::ArtifactNotFound(runtime.artifact.clone()))?;

        let dockerfile = render_dockerfile(runtime, &artifact_name)?;
        let context = ContextBuilder::runtime_context(&dockerfile, &artifact_name, &artifact)?;

        let image = Image {
            reference: spec.image_reference(),
            tags: spec.all_references(),
            layers: output.layers.iter().map(|l| l.key.clone()).collect(),
            entry_command: entry_command(runtime, &artifact_name),
            exposed_port: runtime.port,
            run_as: runtime.user.clone(),
        };

        tracing::info!(
            image = %image.reference,
            artifact = %artifact_name,
            artifact_bytes = artifact.len(),
            "Assembled runtime image"
        );

        Ok(AssembledImage {
            image,
            dockerfile,
            context,
        })
    }
}

fn artifact_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| {
            BuildError::InvalidConfig(format!("成果物パスが不正です: {}", path.display()))
        })
}

fn entry_command(runtime: &RuntimeSpec, artifact_name: &str) -> Vec<String> {
    if runtime.entrypoint.is_empty() {
        vec![format!("{}/{}", APP_DIR, artifact_name)]
    } else {
        runtime.entrypoint.clone()
    }
}

/// ランタイム専用の Dockerfile を生成
///
/// ログインできないシステムアカウントを作成し、成果物の所有者をそのアカウントにする。
pub fn render_dockerfile(runtime: &RuntimeSpec, artifact_name: &str) -> Result<String> {
    let user = &runtime.user;
    if !user
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(BuildError::InvalidConfig(format!(
            "runtime user に使えない文字が含まれています: {}",
            user
        )));
    }

    let entrypoint = serde_json::to_string(&entry_command(runtime, artifact_name))
        .map_err(|e| BuildError::InvalidConfig(e.to_string()))?;

    Ok(format!(
        "FROM {base}\n\
         RUN (addgroup -S {user} && adduser -S -D -H -G {user} -s /sbin/nologin {user}) 2>/dev/null \\\n    \
         || (groupadd --system {user} && useradd --system --gid {user} --no-create-home --shell /usr/sbin/nologin {user})\n\
         WORKDIR {app}\n\
         COPY --chown={user}:{user} {artifact} {app}/{artifact}\n\
         USER {user}\n\
         EXPOSE {port}\n\
         ENTRYPOINT {entrypoint}\n",
        base = runtime.base,
        user = user,
        app = APP_DIR,
        artifact = artifact_name,
        port = runtime.port,
        entrypoint = entrypoint,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;
    use crate::orchestrator::BuildReport;
    use dockyard_core::StageSpec;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn spec() -> BuildSpec {
        BuildSpec {
            image: "inventory-api".to_string(),
            tag: "1.4.0".to_string(),
            aliases: vec!["latest".to_string()],
            stages: vec![StageSpec {
                name: "package".to_string(),
                inputs: vec![],
                run: "cargo build --release".to_string(),
                outputs: vec![PathBuf::from("target/release/inventory-api")],
                manifest: false,
            }],
            runtime: RuntimeSpec {
                base: "debian:bookworm-slim".to_string(),
                user: "inventory".to_string(),
                port: 8080,
                artifact: PathBuf::from("target/release/inventory-api"),
                entrypoint: vec![],
            },
        }
    }

    fn output_with_artifact() -> BuildOutput {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("target/release")).unwrap();
        fs::write(dir.path().join("target/release/inventory-api"), "binary").unwrap();
        fs::write(dir.path().join("target/release/build-script"), "tool").unwrap();
        let layer = Layer::capture(
            "f00d",
            dir.path(),
            &[PathBuf::from("target/release/inventory-api")],
        )
        .unwrap();
        BuildOutput {
            report: BuildReport::default(),
            layers: vec![layer],
        }
    }

    #[test]
    fn test_render_dockerfile() {
        let dockerfile = render_dockerfile(&spec().runtime, "inventory-api").unwrap();

        assert!(dockerfile.starts_with("FROM debian:bookworm-slim\n"));
        assert!(dockerfile.contains("--shell /usr/sbin/nologin inventory"));
        assert!(dockerfile.contains("COPY --chown=inventory:inventory inventory-api /app/inventory-api"));
        assert!(dockerfile.contains("USER inventory\n"));
        assert!(dockerfile.contains("EXPOSE 8080\n"));
        assert!(dockerfile.contains("ENTRYPOINT [\"/app/inventory-api\"]"));
        // ビルドツールやソースのコピーは含まれない
        assert_eq!(dockerfile.matches("COPY").count(), 1);
    }

    #[test]
    fn test_render_dockerfile_rejects_shell_metacharacters_in_user() {
        let mut runtime = spec().runtime;
        runtime.user = "app; rm -rf /".to_string();
        assert!(render_dockerfile(&runtime, "app").is_err());
    }

    #[test]
    fn test_assemble_image_metadata() {
        let assembled = ImageAssembler::assemble(&spec(), &output_with_artifact()).unwrap();

        assert_eq!(assembled.image.reference, "inventory-api:1.4.0");
        assert_eq!(
            assembled.image.tags,
            vec!["inventory-api:1.4.0", "inventory-api:latest"]
        );
        assert_eq!(assembled.image.layers, vec!["f00d"]);
        assert_eq!(assembled.image.run_as, "inventory");
        assert_eq!(assembled.image.exposed_port, 8080);
        assert_eq!(assembled.image.entry_command, vec!["/app/inventory-api"]);
        assert!(!assembled.context.is_empty());
    }

    #[test]
    fn test_assemble_custom_entrypoint() {
        let mut spec = spec();
        spec.runtime.entrypoint = vec!["/app/inventory-api".to_string(), "--serve".to_string()];
        let assembled = ImageAssembler::assemble(&spec, &output_with_artifact()).unwrap();
        assert!(assembled
            .dockerfile
            .contains("ENTRYPOINT [\"/app/inventory-api\",\"--serve\"]"));
    }

    #[test]
    fn test_assemble_missing_artifact() {
        let mut spec = spec();
        spec.runtime.artifact = PathBuf::from("target/release/other");
        let result = ImageAssembler::assemble(&spec, &output_with_artifact());
        assert!(matches!(result, Err(BuildError::ArtifactNotFound(_))));
    }
}
