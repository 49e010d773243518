//! ビルド定義

use serde::{Deserialize, Serialize};
use crate::error::{Result, StackError};
use std::path::PathBuf;

/// ビルド記述子
///
/// KDL形式：
/// ```kdl
/// build {
///     image "inventory-api"
///     tag "1.4.0"
///     alias "latest"
///     stage "dependencies" manifest=#true {
///         inputs "Cargo.toml" "Cargo.lock"
///         run "cargo fetch"
///     }
///     stage "package" {
///         inputs "src"
///         run "cargo build --release"
///         output "target/release/inventory-api"
///     }
///     runtime base="debian:bookworm-slim" user="inventory" port=8080 {
///         artifact "target/release/inventory-api"
///         entrypoint "/app/inventory-api"
///     }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    /// イメージのリポジトリ名
    pub image: String,
    /// メインタグ
    #[serde(default = "default_tag")]
    pub tag: String,
    /// 追加エイリアス（例: latest）
    #[serde(default)]
    pub aliases: Vec<String>,
    /// 実行順に並んだビルドステージ
    #[serde(default)]
    pub stages: Vec<StageSpec>,
    pub runtime: RuntimeSpec,
}

pub(crate) fn default_tag() -> String {
    "latest".to_string()
}

impl BuildSpec {
    /// `repo:tag` 形式のイメージ参照
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    /// メインタグとエイリアスを合わせた全参照
    pub fn all_references(&self) -> Vec<String> {
        let mut refs = vec![self.image_reference()];
        for alias in &self.aliases {
            let reference = format!("{}:{}", self.image, alias);
            if !refs.contains(&reference) {
                refs.push(reference);
            }
        }
        refs
    }
}

/// ビルドステージの宣言
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    /// 入力パス（プロジェクトルートからの相対パス）
    #[serde(default)]
    pub inputs: Vec<PathBuf>,
    /// 実行するシェルコマンド
    pub run: String,
    /// 次のステージへ引き継ぐ出力パス（空の場合は作業ディレクトリ全体）
    #[serde(default)]
    pub outputs: Vec<PathBuf>,
    /// 依存宣言（マニフェスト）を解決するステージか
    #[serde(default)]
    pub manifest: bool,
}

impl BuildSpec {
    /// マニフェストステージがソースをコピーするステージより前にあるか検証
    pub fn validate_stage_order(&self) -> Result<()> {
        check_stage_order(&self.stages)
    }
}

/// ステージ列の順序を検証
///
/// ステージのキーは先行ステージのキーを含むため、入力を持つ非マニフェストステージより
/// 後ろにあるマニフェストステージは、ソースのみの変更でも必ず再実行される。
pub fn check_stage_order(stages: &[StageSpec]) -> Result<()> {
    let mut source_stage: Option<&StageSpec> = None;
    for stage in stages {
        if stage.manifest {
            if let Some(earlier) = source_stage {
                return Err(StackError::ManifestAfterSource {
                    manifest: stage.name.clone(),
                    source_stage: earlier.name.clone(),
                });
            }
        } else if source_stage.is_none() && !stage.inputs.is_empty() {
            source_stage = Some(stage);
        }
    }
    Ok(())
}

/// ランタイムイメージ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSpec {
    /// 最小ランタイムベースイメージ
    pub base: String,
    /// 実行用の非特権アカウント名
    pub user: String,
    /// 公開ポート
    pub port: u16,
    /// ビルド成果物（最終ステージの出力内のパス）
    pub artifact: PathBuf,
    /// エントリポイント
    #[serde(default)]
    pub entrypoint: Vec<String>,
}

impl Default for RuntimeSpec {
    fn default() -> Self {
        Self {
            base: "debian:bookworm-slim".to_string(),
            user: "app".to_string(),
            port: 8080,
            artifact: PathBuf::new(),
            entrypoint: Vec::new(),
        }
    }
}
