mod commands;
mod docker;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dockyard")]
#[command(about = "ビルドはキャッシュで速く、実行は堅く。", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// ステージを実行してランタイムイメージをビルド
    Build {
        /// イメージを作らずにステージの実行と Dockerfile の生成だけを行う
        #[arg(long)]
        no_image: bool,
    },
    /// スタックを起動
    Up {
        /// 適用するハードニングプロファイル（複数指定可）
        #[arg(short, long = "profile", env = "DOCKYARD_PROFILE", value_delimiter = ',')]
        profiles: Vec<String>,
        /// .env の代わりに読み込むオーバーライドファイル
        #[arg(short, long, env = "DOCKYARD_ENV_FILE")]
        env_file: Option<PathBuf>,
        /// 起動前に最新イメージをpullする
        #[arg(short, long)]
        pull: bool,
    },
    /// スタックを停止してコンテナとネットワークを削除
    Down {
        /// 名前付きボリュームも削除する（データは失われます）
        #[arg(long)]
        purge_volumes: bool,
    },
    /// コンテナの一覧を表示
    Ps {
        /// 停止中のコンテナも表示
        #[arg(short, long)]
        all: bool,
        /// JSON で出力
        #[arg(long)]
        json: bool,
    },
    /// サービスのログを表示
    Logs {
        /// サービス名
        service: String,
        /// ログの行数を指定
        #[arg(short = 'n', long, default_value = "100")]
        lines: usize,
        /// ログをリアルタイムで追跡
        #[arg(short, long)]
        follow: bool,
    },
    /// 名前付きボリュームの操作
    Volume {
        #[command(subcommand)]
        command: VolumeCommands,
    },
    /// 設定を検証
    Validate {
        /// 検証時に適用するハードニングプロファイル
        #[arg(short, long = "profile", env = "DOCKYARD_PROFILE", value_delimiter = ',')]
        profiles: Vec<String>,
        /// .env の代わりに読み込むオーバーライドファイル
        #[arg(short, long, env = "DOCKYARD_ENV_FILE")]
        env_file: Option<PathBuf>,
    },
    /// バージョン情報を表示
    Version,
}

#[derive(Subcommand)]
enum VolumeCommands {
    /// ボリュームを削除（破壊的操作）
    Rm {
        /// ボリューム名（dockyard.kdl で宣言した名前）
        name: String,
        /// 削除を確認済みとして実行
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("DOCKYARD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match cli.command {
        Commands::Version => {
            println!("dockyard {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Build { no_image } => commands::build::handle(no_image).await,
        Commands::Up {
            profiles,
            env_file,
            pull,
        } => commands::up::handle(&profiles, env_file.as_deref(), pull).await,
        Commands::Down { purge_volumes } => commands::down::handle(purge_volumes).await,
        Commands::Ps { all, json } => commands::ps::handle(all, json).await,
        Commands::Logs {
            service,
            lines,
            follow,
        } => commands::logs::handle(&service, lines, follow).await,
        Commands::Volume {
            command: VolumeCommands::Rm { name, yes },
        } => commands::volume::remove(&name, yes).await,
        Commands::Validate { profiles, env_file } => {
            commands::validate::handle(&profiles, env_file.as_deref())
        }
    }
}
