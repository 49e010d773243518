//! 統合ローダー
//!
//! ファイル発見、パース、検証を統合

use crate::discovery::{DiscoveredFiles, discover_files, find_project_root};
use crate::env::{EnvMap, load_env_file};
use crate::error::{Result, StackError};
use crate::model::Stack;
use crate::parser::parse_stack_string;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// ロード済みプロジェクト
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub stack: Stack,
    /// オーバーライドファイルの内容（.env または --env-file）
    pub override_env: Option<EnvMap>,
}

/// カレントディレクトリからプロジェクトをロード
#[instrument]
pub fn load_project(env_file: Option<&Path>) -> Result<Project> {
    info!("Starting project load");
    let project_root = find_project_root()?;
    load_project_from_root(&project_root, env_file)
}

/// 指定されたルートディレクトリからプロジェクトをロード
///
/// 読み込み順序: dockyard.kdl → dockyard.local.kdl。
/// `env_file` を指定した場合はプロジェクトの .env の代わりにそれを使う。
#[instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn load_project_from_root(project_root: &Path, env_file: Option<&Path>) -> Result<Project> {
    debug!("Step 1: Discovering files");
    let discovered = discover_files(project_root)?;

    debug!("Step 2: Reading stack files");
    let content = read_stack_files(&discovered)?;

    debug!("Step 3: Parsing KDL");
    let name = project_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    let stack = parse_stack_string(&content, name)?;

    debug!("Step 4: Validating stack");
    stack.validate()?;

    let override_env = match env_file {
        Some(path) => Some(load_env_file(&resolve_relative(project_root, path))?),
        None => discovered
            .env_file
            .as_deref()
            .map(load_env_file)
            .transpose()?,
    };

    info!(
        project = %stack.name,
        services = stack.services.len(),
        volumes = stack.volumes.len(),
        has_build = stack.build.is_some(),
        "Project loaded successfully"
    );

    Ok(Project {
        root: project_root.to_path_buf(),
        stack,
        override_env,
    })
}

fn read_stack_files(discovered: &DiscoveredFiles) -> Result<String> {
    let mut content = String::new();
    for path in discovered.stack_files() {
        let file = std::fs::read_to_string(path).map_err(|e| StackError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        content.push_str(&file);
        content.push('\n');
    }
    Ok(content)
}

fn resolve_relative(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || path.exists() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const STACK: &str = r#"
project "inventory"
volume "pgdata"
service "db" {
    image "postgres:16"
    volume "pgdata" "/var/lib/postgresql/data"
    env {
        POSTGRES_PASSWORD "changeme"
    }
}
"#;

    #[test]
    fn test_load_project_with_local_override_and_env_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("dockyard.kdl"), STACK).unwrap();
        fs::write(
            dir.path().join("dockyard.local.kdl"),
            "service \"db\" {\n    image \"postgres:17\"\n}\n",
        )
        .unwrap();
        fs::write(dir.path().join(".env"), "POSTGRES_PASSWORD=local\n").unwrap();

        let project = load_project_from_root(dir.path(), None).unwrap();

        assert_eq!(project.stack.name, "inventory");
        assert_eq!(
            project.stack.services["db"].image.as_deref(),
            Some("postgres:17")
        );
        assert_eq!(
            project.override_env.unwrap()["POSTGRES_PASSWORD"],
            "local"
        );
    }

    #[test]
    fn test_load_project_explicit_env_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("dockyard.kdl"), STACK).unwrap();
        fs::write(dir.path().join(".env"), "POSTGRES_PASSWORD=default\n").unwrap();
        fs::write(dir.path().join("staging.env"), "POSTGRES_PASSWORD=staging\n").unwrap();

        let project =
            load_project_from_root(dir.path(), Some(&dir.path().join("staging.env"))).unwrap();

        assert_eq!(
            project.override_env.unwrap()["POSTGRES_PASSWORD"],
            "staging"
        );
    }

    #[test]
    fn test_load_project_missing_explicit_env_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("dockyard.kdl"), STACK).unwrap();

        let result = load_project_from_root(dir.path(), Some(Path::new("missing.env")));
        assert!(matches!(result, Err(StackError::IoError { .. })));
    }

    #[test]
    fn test_load_project_rejects_invalid_stack() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("dockyard.kdl"),
            "service \"db\" {\n    image \"postgres\"\n    volume \"undeclared\" \"/data\"\n}\n",
        )
        .unwrap();

        let result = load_project_from_root(dir.path(), None);
        assert!(matches!(result, Err(StackError::VolumeNotDeclared { .. })));
    }
}
