use dockyard_core::StackError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(
        "Dockerに接続できません: {0}\n\nヒント:\n  • Dockerが起動しているか確認してください\n  • docker ps コマンドが正常に動作するか確認してください"
    )]
    DockerConnectionFailed(String),

    #[error("Docker APIエラー: {0}")]
    DockerApiError(String),

    #[error("コンテナ '{container}' が見つかりません")]
    ContainerNotFound { container: String },

    #[error(
        "ポート {port} は既に使用されています（サービス '{service}'）\n\nヒント:\n  • 別のホストポートに割り当ててください: port host={suggestion} container={container_port}\n  • ポートを使用しているプロセスまたはコンテナを停止してください"
    )]
    PortAlreadyInUse {
        service: String,
        port: u16,
        container_port: u16,
        suggestion: u16,
    },

    #[error(
        "サービス '{service}' の依存先 '{dependency}' が準備完了になりませんでした（{attempts}回確認）\n\nヒント:\n  • 依存先は名前解決できていますが、まだ接続を受け付けていません\n  • dockyard logs {dependency} で起動状況を確認してください\n  • wait_for の max_retries を増やしてみてください"
    )]
    DependencyUnready {
        service: String,
        dependency: String,
        attempts: u32,
    },

    #[error(
        "ボリューム '{volume}' は実行中のインスタンスで使用中のため削除できません: {}\n\nヒント:\n  • dockyard down でインスタンスを停止してから再実行してください",
        .instances.join(", ")
    )]
    VolumeInUse {
        volume: String,
        instances: Vec<String>,
    },

    #[error(
        "ボリューム '{0}' の削除には確認が必要です\n\nヒント:\n  • データは復元できません。削除する場合は --yes を指定してください"
    )]
    ConfirmationRequired(String),

    #[error("ボリューム '{0}' が見つかりません")]
    VolumeNotFound(String),

    #[error("ネットワーク '{0}' が見つかりません")]
    NetworkNotFound(String),

    #[error(
        "'{from}' から名前 '{name}' を解決できません\n\nヒント:\n  • 両方のインスタンスが同じネットワークに参加しているか確認してください"
    )]
    NameNotResolvable { from: String, name: String },

    #[error("ネットワーク '{0}' のアドレスが枯渇しました")]
    AddressPoolExhausted(String),

    #[error("ファイル操作エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Stack(#[from] StackError),
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        match &err {
            // 404/409 は呼び出し側で個別に処理する
            bollard::errors::Error::DockerResponseServerError { .. } => {
                ContainerError::DockerApiError(err.to_string())
            }
            _ => {
                let err_str = err.to_string();
                if err_str.contains("Connection refused")
                    || err_str.contains("No such file or directory")
                {
                    ContainerError::DockerConnectionFailed(err_str)
                } else {
                    ContainerError::DockerApiError(err_str)
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
