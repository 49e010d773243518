use crate::docker;
use crate::utils;
use colored::Colorize;
use dockyard_container::{ContainerError, DockerVolumeDriver, VolumeManager};
use dockyard_core::{load_project, volume_name};

/// 名前付きボリュームを削除
///
/// dockyard.kdl で宣言された名前はプロジェクト名付きの Docker ボリューム名に変換する。
pub async fn remove(name: &str, yes: bool) -> anyhow::Result<()> {
    let project = load_project(None)?;
    let stack = &project.stack;
    let docker_name = if stack.volumes.contains(name) {
        volume_name(&stack.name, name)
    } else {
        name.to_string()
    };

    // Docker に接続する前に確認の有無を判定する
    if !yes {
        return Err(utils::report_failure(
            "確認が必要です",
            "ボリューム削除",
            &ContainerError::ConfirmationRequired(docker_name),
        ));
    }

    println!("{}", format!("🗑 ボリューム削除: {}", docker_name).red());
    let docker_conn = docker::init_docker_with_error_handling().await?;
    let volumes = VolumeManager::new(DockerVolumeDriver::new(docker_conn));

    volumes
        .delete_volume(&docker_name, yes)
        .await
        .map_err(|e| utils::report_failure("ボリュームを削除できません", "ボリューム削除", &e))?;

    println!("{}", "✓ 削除完了".green().bold());
    Ok(())
}
