//! プロジェクトファイルの発見
//!
//! dockyard.kdl を含むディレクトリをプロジェクトルートとし、
//! ローカルオーバーライドと .env ファイルを規約に従って探します。

use crate::error::{Result, StackError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// スタックファイル名
pub const STACK_FILE: &str = "dockyard.kdl";
/// ローカルオーバーライドファイル名（VCS管理外を想定）
pub const LOCAL_STACK_FILE: &str = "dockyard.local.kdl";
/// 隠しディレクトリ
pub const DOCKYARD_DIR: &str = ".dockyard";
/// デフォルトのオーバーライド環境変数ファイル
pub const ENV_FILE: &str = ".env";

/// 発見されたファイル群
#[derive(Debug, Clone, Default)]
pub struct DiscoveredFiles {
    /// ルートファイル (dockyard.kdl)
    pub root: Option<PathBuf>,
    /// ローカルオーバーライドファイル (dockyard.local.kdl)
    pub local_override: Option<PathBuf>,
    /// 環境変数ファイル (.env)
    pub env_file: Option<PathBuf>,
}

impl DiscoveredFiles {
    /// 読み込み順に並べたスタックファイル
    pub fn stack_files(&self) -> Vec<&Path> {
        self.root
            .iter()
            .chain(self.local_override.iter())
            .map(PathBuf::as_path)
            .collect()
    }
}

fn has_stack_file(dir: &Path) -> bool {
    dir.join(STACK_FILE).exists() || dir.join(DOCKYARD_DIR).join(STACK_FILE).exists()
}

/// プロジェクトルートを検出
///
/// 以下の優先順位で検索:
/// 1. 環境変数 DOCKYARD_PROJECT_ROOT
/// 2. カレントディレクトリから上に向かって dockyard.kdl または .dockyard/dockyard.kdl を探す
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var("DOCKYARD_PROJECT_ROOT") {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking DOCKYARD_PROJECT_ROOT");
        if has_stack_file(&path) {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
        warn!(env_root = %root, "DOCKYARD_PROJECT_ROOT does not contain a stack file");
    }

    let start_dir = std::env::current_dir()?;
    find_project_root_from(&start_dir)
}

/// 指定ディレクトリから上に向かってプロジェクトルートを探す
pub fn find_project_root_from(start_dir: &Path) -> Result<PathBuf> {
    let mut current = start_dir.to_path_buf();
    debug!(start_dir = %start_dir.display(), "Searching for project root");

    loop {
        if has_stack_file(&current) {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }
        if !current.pop() {
            break;
        }
    }

    warn!(start_dir = %start_dir.display(), "Project root not found");
    Err(StackError::ProjectRootNotFound(start_dir.to_path_buf()))
}

/// プロジェクトルートからファイルを発見
#[tracing::instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn discover_files(project_root: &Path) -> Result<DiscoveredFiles> {
    let mut discovered = DiscoveredFiles::default();

    let root_file = project_root.join(STACK_FILE);
    let hidden_root_file = project_root.join(DOCKYARD_DIR).join(STACK_FILE);
    if root_file.exists() {
        debug!(file = %root_file.display(), "Found root file");
        discovered.root = Some(root_file);
    } else if hidden_root_file.exists() {
        debug!(file = %hidden_root_file.display(), "Found root file in .dockyard/");
        discovered.root = Some(hidden_root_file);
    }

    let local_file = project_root.join(LOCAL_STACK_FILE);
    if local_file.exists() {
        debug!(file = %local_file.display(), "Found local override file");
        discovered.local_override = Some(local_file);
    }

    let env_file = project_root.join(ENV_FILE);
    if env_file.is_file() {
        debug!(file = %env_file.display(), "Found env file");
        discovered.env_file = Some(env_file);
    }

    if discovered.root.is_none() {
        return Err(StackError::ProjectRootNotFound(project_root.to_path_buf()));
    }

    info!(
        local_override = discovered.local_override.is_some(),
        env_file = discovered.env_file.is_some(),
        "File discovery complete"
    );
    Ok(discovered)
}
