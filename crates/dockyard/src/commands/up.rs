use crate::docker;
use crate::utils;
use colored::Colorize;
use dockyard_config::Settings;
use dockyard_container::{
    DockerHealthProbe, DockerRuntime, DockerVolumeDriver, Provisioned, VolumeManager,
    ensure_ports_available, startup_warnings, wait_until_ready,
};
use dockyard_core::{LABEL_PROJECT, Topology, env::capture_process_env, hardening, load_project};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

pub async fn handle(profiles: &[String], env_file: Option<&Path>, pull: bool) -> anyhow::Result<()> {
    println!("{}", "スタックを起動中...".green());

    let project = load_project(env_file).map_err(|e| utils::report_failure("設定エラー", "起動", &e))?;
    utils::print_loaded_config_files(&project);
    let stack = &project.stack;

    // 1. 環境変数の解決とデータベース接続先の検証
    let settings = Settings::load()?;
    let profiles = utils::effective_profiles(profiles, &settings.default_profiles);
    let topology = Topology::assemble(stack, project.override_env.as_ref(), &capture_process_env())
        .and_then(|base| hardening::apply_named(&base, stack, &profiles))
        .map_err(|e| utils::report_failure("設定エラー", "起動", &e))?;
    super::check_name_resolution(&topology)
        .map_err(|e| utils::report_failure("名前解決エラー", "起動", &e))?;
    info!(
        project = %topology.project,
        services = topology.instances.len(),
        profiles = ?profiles,
        "Topology assembled"
    );

    if !profiles.is_empty() {
        println!("プロファイル: {}", profiles.join(", ").cyan());
    }
    for warning in startup_warnings(&topology) {
        println!("{} {}", "⚠".yellow(), warning);
    }

    println!();
    println!(
        "{}",
        format!("サービス一覧 ({} 個):", topology.instances.len()).bold()
    );
    for instance in topology.ordered_instances() {
        println!("  • {}", instance.name.cyan());
    }

    // Docker接続
    println!();
    println!("{}", "Dockerに接続中...".blue());
    let docker_conn = docker::init_docker_with_error_handling().await?;
    let runtime = DockerRuntime::new(docker_conn.clone());

    // 2. 公開ポートの競合確認
    let held = runtime.held_host_ports(&topology.project).await?;
    debug!(held = ?held, "Host ports held by this project");
    ensure_ports_available(&topology, &held)
        .map_err(|e| utils::report_failure("ポートが既に使用されています", "ポート確認", &e))?;

    // 3. ネットワーク作成
    println!();
    println!(
        "{}",
        format!("🌐 ネットワーク: {}", topology.network).blue()
    );
    match runtime.ensure_network(&topology.network, &topology.project).await? {
        Provisioned::Created => println!("  ✓ ネットワーク作成完了"),
        Provisioned::AlreadyExists => println!("  ℹ ネットワークは既に存在します"),
    }

    // 4. 名前付きボリューム作成（既存のデータは保持）
    let volumes = VolumeManager::new(DockerVolumeDriver::new(docker_conn.clone()));
    let labels = BTreeMap::from([(LABEL_PROJECT.to_string(), topology.project.clone())]);
    for volume in &topology.volumes {
        let name = topology.volume_name(volume);
        volumes.create_volume(&name, &labels).await?;
        debug!(volume = %name, "Volume ready");
        println!("  ✓ ボリューム: {}", name.cyan());
    }

    // 5. 依存順に起動。依存先は準備完了を確認してから次へ進む
    let probe = DockerHealthProbe::new(docker_conn.clone());
    for instance in topology.ordered_instances() {
        println!();
        println!(
            "{}",
            format!("▶ {} を起動中...", instance.name).green().bold()
        );

        for dependency in &instance.depends_on {
            println!("  … {} の準備完了を待機中", dependency.cyan());
            let attempts = wait_until_ready(
                &probe,
                &instance.name,
                dependency,
                &topology.container_name(dependency),
                &instance.wait_for,
            )
            .await
            .map_err(|e| {
                utils::report_failure(
                    "依存サービスが準備完了になりません",
                    &format!("{} の起動", instance.name),
                    &e,
                )
            })?;
            info!(service = %instance.name, dependency = %dependency, attempts, "Dependency ready");
            println!("  ✓ {} 準備完了（{}回目）", dependency, attempts);
        }

        if pull {
            runtime.pull_image(&instance.image).await?;
            println!("  ✓ イメージ取得: {}", instance.image.cyan());
        }

        let container = runtime
            .start_instance(&topology, instance)
            .await
            .map_err(|e| {
                utils::report_failure(
                    "コンテナ起動エラー",
                    &format!("{} の起動", instance.name),
                    &e,
                )
            })?;
        for mount in &instance.mounts {
            volumes
                .bind(&topology.volume_name(&mount.volume), &container, &mount.target)
                .await?;
        }
        info!(service = %instance.name, container = %container, "Service started");
        println!("  ✓ 起動完了: {}", container);
    }

    println!();
    println!("{}", "✓ すべてのサービスが起動しました！".green().bold());

    Ok(())
}
