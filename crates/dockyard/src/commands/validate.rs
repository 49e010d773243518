use crate::utils;
use colored::Colorize;
use dockyard_config::Settings;
use dockyard_core::{Topology, env::capture_process_env, hardening, load_project};
use std::path::Path;
use tracing::debug;

pub fn handle(profiles: &[String], env_file: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "設定を検証中...".blue());

    let project = load_project(env_file).map_err(|e| utils::report_failure("設定エラー", "検証", &e))?;
    utils::print_loaded_config_files(&project);
    let stack = &project.stack;

    // up と同じプロファイルを適用して検証する
    let settings = Settings::load()?;
    let profiles = utils::effective_profiles(profiles, &settings.default_profiles);
    let topology = Topology::assemble(stack, project.override_env.as_ref(), &capture_process_env())
        .and_then(|base| hardening::apply_named(&base, stack, &profiles))
        .map_err(|e| utils::report_failure("設定エラー", "検証", &e))?;
    debug!(services = topology.instances.len(), profiles = ?profiles, "Topology assembled");

    let networks = super::check_name_resolution(&topology)
        .map_err(|e| utils::report_failure("名前解決エラー", "検証", &e))?;

    println!("{}", "✓ 設定ファイルは正常です！".green().bold());
    println!();
    println!("サマリー:");
    if !profiles.is_empty() {
        println!("  プロファイル: {}", profiles.join(", ").cyan());
    }
    println!("  ネットワーク: {}", topology.network.cyan());
    println!("  サービス: {}個（起動順）", topology.instances.len());
    for instance in topology.ordered_instances() {
        let address = networks
            .resolve(&instance.name, &instance.name)
            .map(|a| a.to_string())
            .unwrap_or_default();
        println!(
            "    - {} ({}) {}",
            instance.name.cyan(),
            instance.image,
            address.dimmed()
        );
        for port in instance.ports.iter().filter(|p| p.is_published()) {
            if let Some(host) = port.host {
                println!("        port {} -> {}", host, port.container_key());
            }
        }
        if !instance.security.is_empty() {
            let security = &instance.security;
            let mut restrictions = Vec::new();
            if !security.drop_capabilities.is_empty() {
                restrictions.push(format!(
                    "cap_drop={}",
                    security
                        .drop_capabilities
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(",")
                ));
            }
            if security.read_only_root {
                restrictions.push("read_only_root".to_string());
            }
            if security.no_new_privileges {
                restrictions.push("no_new_privileges".to_string());
            }
            if let Some(policy) = security.restart_policy {
                restrictions.push(format!("restart={}", policy.as_docker_str()));
            }
            if let Some(user) = &security.user {
                restrictions.push(format!("user={}", user));
            }
            println!("        {}", restrictions.join(" ").dimmed());
        }
    }

    if !topology.volumes.is_empty() {
        println!("  ボリューム: {}個", topology.volumes.len());
        for volume in &topology.volumes {
            println!("    - {}", topology.volume_name(volume).cyan());
        }
    }

    if let Some(build) = &stack.build {
        println!(
            "  ビルド: {} ({}個のステージ)",
            build.image_reference().cyan(),
            build.stages.len()
        );
        for (index, stage) in build.stages.iter().enumerate() {
            let marker = if stage.manifest { " [manifest]" } else { "" };
            println!("    {}. {}{}", index + 1, stage.name, marker.dimmed());
        }
    }

    for warning in dockyard_container::startup_warnings(&topology) {
        println!("{} {}", "⚠".yellow(), warning);
    }

    Ok(())
}
