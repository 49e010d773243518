use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error(
        "プロジェクトルートが見つかりません\n探索開始位置: {0}\nヒント: dockyard.kdl ファイルを含むディレクトリで実行してください"
    )]
    ProjectRootNotFound(PathBuf),

    #[error("サービスが見つかりません: {0}")]
    ServiceNotFound(String),

    #[error("ボリューム '{volume}' が宣言されていません（サービス '{service}' が参照）")]
    VolumeNotDeclared { service: String, volume: String },

    #[error("プロファイルが見つかりません: {0}")]
    ProfileNotFound(String),

    #[error("循環依存が検出されました: {0}")]
    CircularDependency(String),

    #[error("サービス '{0}' に image が指定されていません")]
    MissingImage(String),

    #[error(
        "サービス '{service}' の環境変数 {key} が設定されていません\n\nヒント:\n  • dockyard.kdl の env ブロック、.env ファイル、またはプロセス環境変数で設定してください"
    )]
    MissingVariable { service: String, key: String },

    #[error(
        "サービス '{service}' の {key} が自分自身を指しています（ホスト: {host}）\n\nヒント:\n  • コンテナ内の {host} は呼び出し元コンテナ自身です\n  • 同じネットワーク上のデータベースは論理サービス名 '{expected}' で指定してください"
    )]
    LoopbackTarget {
        service: String,
        key: String,
        host: String,
        expected: String,
    },

    #[error("接続文字列 {key} からホスト名を取得できません（サービス '{service}'）: {value}")]
    InvalidConnectionString {
        service: String,
        key: String,
        value: String,
    },

    #[error(
        "ビルド順序エラー: 依存マニフェストのステージ '{manifest}' がソースを入力に持つステージ '{source_stage}' より後にあります\n\nヒント:\n  • manifest ステージを先頭に移動してください\n  • ソースのみの変更でも依存取得がやり直しになります"
    )]
    ManifestAfterSource {
        manifest: String,
        source_stage: String,
    },
}

pub type Result<T> = std::result::Result<T, StackError>;
