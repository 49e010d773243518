use crate::docker;
use colored::Colorize;
use dockyard_container::{DockerRuntime, LogLine};
use dockyard_core::{container_name, load_project};
use futures_util::stream::StreamExt;

pub async fn handle(service: &str, lines: usize, follow: bool) -> anyhow::Result<()> {
    let project = load_project(None)?;
    project.stack.service(service)?;

    let docker_conn = docker::init_docker_with_error_handling().await?;
    let runtime = DockerRuntime::new(docker_conn);
    let container = container_name(&project.stack.name, service);

    if !follow {
        println!("{}", format!("=== {} のログ ===", service).bold().cyan());
    }

    let prefix = format!("[{}]", service).cyan();
    let mut log_stream = runtime.logs(&container, lines, follow);
    while let Some(line) = log_stream.next().await {
        match line? {
            LogLine::Stdout(message) => {
                for line in message.lines().filter(|l| !l.is_empty()) {
                    println!("{} {}", prefix, line);
                }
            }
            LogLine::Stderr(message) => {
                for line in message.lines().filter(|l| !l.is_empty()) {
                    println!("{} {} {}", prefix, "stderr:".red(), line);
                }
            }
        }
    }

    Ok(())
}
