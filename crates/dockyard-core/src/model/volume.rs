//! ボリューム定義

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// サービスから名前付きボリュームへのマウント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// 宣言済みボリューム名
    pub volume: String,
    /// コンテナ内のマウント先
    pub target: PathBuf,
    #[serde(default)]
    pub read_only: bool,
}
