use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("ステージ {index} ({stage}) が失敗しました: {source}")]
    StageFailed {
        index: usize,
        stage: String,
        #[source]
        source: Box<BuildError>,
    },

    #[error("コマンドが終了コード {code:?} で失敗しました\n{stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("コマンドが {timeout_secs} 秒以内に完了しませんでした")]
    Timeout { timeout_secs: u64 },

    #[error("入力ファイルが見つかりません: {0}")]
    InputNotFound(PathBuf),

    #[error("宣言された出力が生成されませんでした: {0}")]
    OutputMissing(PathBuf),

    #[error("成果物がビルドレイヤーに含まれていません: {0}")]
    ArtifactNotFound(PathBuf),

    #[error("キャッシュエラー ({key}): {message}")]
    Cache { key: String, message: String },

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Image build failed: {0}")]
    ImageBuildFailed(String),

    #[error("Invalid build configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Stack(#[from] dockyard_core::StackError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// 失敗したステージの識別子（例: `stage 2 (package)`）
    pub fn stage_identifier(&self) -> Option<String> {
        match self {
            BuildError::StageFailed { index, stage, .. } => {
                Some(format!("stage {} ({})", index, stage))
            }
            _ => None,
        }
    }

    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::StageFailed { index, stage, source } => {
                format!(
                    "ビルドステージ {} ({}) が失敗しました\n\
                     理由: {}\n\
                     \n\
                     ヒント:\n  \
                     • イメージは作成・タグ付けされていません\n  \
                     • dockyard.kdl の stage \"{}\" の run コマンドを確認してください",
                    index, stage, source, stage
                )
            }
            BuildError::ArtifactNotFound(path) => {
                format!(
                    "成果物が見つかりません: {}\n\
                     \n\
                     ヒント:\n  \
                     • 最終ステージの output に成果物のパスを含めてください\n  \
                     • runtime ブロックの artifact と output のパスを揃えてください",
                    path.display()
                )
            }
            BuildError::ImageBuildFailed(msg) => {
                format!(
                    "ランタイムイメージのビルドに失敗しました: {}\n\
                     \n\
                     runtime ブロックの base イメージを確認してください。",
                    msg
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
