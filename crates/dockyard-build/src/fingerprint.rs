//! ステージのキャッシュキー計算

use crate::error::{BuildError, Result};
use dockyard_core::StageSpec;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// ステージのフィンガープリントを計算
///
/// ステージ名・コマンド・出力パス・入力ファイルの内容に加えて、直前のステージの
/// キーを連鎖させる。上流の内容が変われば下流のキーも必ず変わる。
pub fn stage_fingerprint(
    workspace: &Path,
    stage: &StageSpec,
    upstream_key: Option<&str>,
) -> Result<String> {
    let mut hasher = Sha256::new();

    if let Some(parent) = upstream_key {
        hasher.update(b"parent\0");
        hasher.update(parent.as_bytes());
    }

    hasher.update(b"stage\0");
    hasher.update(stage.name.as_bytes());
    hasher.update(b"\0run\0");
    hasher.update(stage.run.as_bytes());
    for output in &stage.outputs {
        hasher.update(b"\0output\0");
        hasher.update(output.to_string_lossy().as_bytes());
    }

    for (relative, absolute) in collect_inputs(workspace, &stage.inputs)? {
        let contents = fs::read(&absolute)?;
        hasher.update(b"\0file\0");
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// 入力パスを展開してソート済みのファイル一覧を返す
///
/// 戻り値は `(ワークスペース相対パス, 絶対パス)`。
pub fn collect_inputs(workspace: &Path, inputs: &[PathBuf]) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut files = Vec::new();
    for input in inputs {
        let absolute = workspace.join(input);
        if !absolute.exists() {
            return Err(BuildError::InputNotFound(input.clone()));
        }
        walk(workspace, &absolute, &mut files)?;
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn walk(workspace: &Path, path: &Path, files: &mut Vec<(PathBuf, PathBuf)>) -> Result<()> {
    if path.is_dir() {
        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();
        for entry in entries {
            walk(workspace, &entry, files)?;
        }
    } else {
        let relative = path.strip_prefix(workspace).unwrap_or(path).to_path_buf();
        files.push((relative, path.to_path_buf()));
    }
    Ok(())
}
