use crate::docker;
use crate::utils;
use colored::Colorize;
use dockyard_container::{DockerRuntime, DockerVolumeDriver, VolumeManager};
use dockyard_core::{load_project, volume_name};
use tracing::{debug, info};

pub async fn handle(purge_volumes: bool) -> anyhow::Result<()> {
    println!("{}", "スタックを停止中...".yellow());

    let project = load_project(None).map_err(|e| utils::report_failure("設定エラー", "停止", &e))?;
    utils::print_loaded_config_files(&project);
    let stack = &project.stack;

    println!();
    println!("{}", "Dockerに接続中...".blue());
    let docker_conn = docker::init_docker_with_error_handling().await?;
    let runtime = DockerRuntime::new(docker_conn.clone());

    // ラベルで探すため、定義から消えたサービスのコンテナも対象になる
    let containers = runtime.list(&stack.name, true).await?;
    debug!(project = %stack.name, count = containers.len(), "Found project containers");
    if containers.is_empty() {
        println!("{}", "  ℹ 停止するコンテナはありません".dimmed());
    }
    for container in &containers {
        println!();
        println!(
            "{}",
            format!("■ {} を停止中...", container.name).yellow().bold()
        );
        if runtime.stop_and_remove(&container.name).await? {
            info!(container = %container.name, "Container removed");
            println!("  ✓ 停止・削除完了");
        } else {
            println!("  ℹ コンテナが見つかりません");
        }
    }

    println!();
    println!(
        "{}",
        format!("🌐 ネットワーク削除: {}", stack.network).yellow()
    );
    match runtime.remove_network(&stack.network).await {
        Ok(true) => println!("  ✓ ネットワーク削除完了"),
        Ok(false) => println!("  ℹ ネットワークは既に存在しません"),
        // 他のコンテナがまだ接続されている可能性
        Err(e) => println!("  ⚠ ネットワーク削除エラー: {}", e),
    }

    if purge_volumes {
        // コンテナが全て消えてから削除する
        let volumes = VolumeManager::new(DockerVolumeDriver::new(docker_conn));
        for volume in &stack.volumes {
            let name = volume_name(&stack.name, volume);
            println!();
            println!("{}", format!("🗑 ボリューム削除: {}", name).red());
            match volumes.delete_volume(&name, true).await {
                Ok(()) => {
                    info!(volume = %name, "Volume purged");
                    println!("  ✓ 削除完了")
                }
                Err(dockyard_container::ContainerError::VolumeNotFound(_)) => {
                    println!("  ℹ ボリュームは既に存在しません")
                }
                Err(e) => {
                    return Err(utils::report_failure("ボリューム削除エラー", "ボリューム削除", &e));
                }
            }
        }
    }

    println!();
    if purge_volumes {
        println!(
            "{}",
            "✓ すべてのサービスとボリュームが削除されました！".green().bold()
        );
    } else {
        println!("{}", "✓ すべてのサービスが停止しました！".green().bold());
        if !stack.volumes.is_empty() {
            println!(
                "{}",
                "  ボリュームは保持されています。削除するには --purge-volumes を使用してください"
                    .dimmed()
            );
        }
    }

    Ok(())
}
