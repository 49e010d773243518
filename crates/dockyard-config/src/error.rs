use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error("キャッシュディレクトリが見つかりません\nヒント: config.yaml の cache_dir で明示的に指定してください")]
    CacheDirNotFound,

    #[error(
        "設定ファイルの形式が不正です: {path}\n理由: {message}\n\nヒント:\n  • cache_dir, build_timeout_secs, default_profiles のみ指定できます"
    )]
    InvalidSettings { path: PathBuf, message: String },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
