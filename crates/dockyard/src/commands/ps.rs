use crate::docker;
use colored::Colorize;
use dockyard_container::{ContainerState, DockerRuntime};
use dockyard_core::load_project;

pub async fn handle(all: bool, json: bool) -> anyhow::Result<()> {
    let project = load_project(None)?;

    if !json {
        println!("{}", "コンテナ一覧を取得中...".blue());
    }
    let docker_conn = docker::init_docker_with_error_handling().await?;
    let containers = DockerRuntime::new(docker_conn)
        .list(&project.stack.name, all)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&containers)?);
        return Ok(());
    }

    println!();
    if containers.is_empty() {
        println!("{}", "実行中のコンテナはありません".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<24} {:<20} {:<28} {:<30}",
            "NAME", "STATUS", "IMAGE", "PORTS"
        )
        .bold()
    );
    println!("{}", "─".repeat(102).dimmed());

    for container in containers {
        let status = if container.state == ContainerState::Running {
            container.status.green()
        } else {
            container.status.red()
        };
        println!(
            "{:<24} {:<20} {:<28} {:<30}",
            container.name.cyan(),
            status,
            container.image,
            container.ports.join(", ").dimmed()
        );
    }

    Ok(())
}
