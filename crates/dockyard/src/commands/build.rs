use crate::docker;
use crate::utils;
use colored::Colorize;
use dockyard_build::{
    BuildOrchestrator, BuildProgress, CommandExecutor, DiskCache, ImageAssembler, ImageBuilder,
};
use dockyard_config::Settings;
use dockyard_core::load_project;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub async fn handle(no_image: bool) -> anyhow::Result<()> {
    println!("{}", "ビルドを開始します...".blue());

    let project = load_project(None).map_err(|e| utils::report_failure("設定エラー", "ビルド", &e))?;
    utils::print_loaded_config_files(&project);

    let build = project.stack.build.as_ref().ok_or_else(|| {
        anyhow::anyhow!(
            "dockyard.kdl に build ブロックがありません\n\nヒント:\n  • build {{ image \"...\" stage \"...\" {{ ... }} runtime ... }} を追加してください"
        )
    })?;

    let settings = Settings::load()?;
    let cache_dir = settings.cache_dir()?;
    let cache = DiskCache::new(&cache_dir)?;
    debug!(cache_dir = %cache_dir.display(), timeout_secs = settings.build_timeout_secs, "Using disk cache");
    println!("キャッシュ: {}", cache_dir.display().to_string().dimmed());

    let orchestrator = BuildOrchestrator::new(Arc::new(cache), Arc::new(CommandExecutor::new()))
        .with_timeout(Duration::from_secs(settings.build_timeout_secs));

    println!();
    println!(
        "{}",
        format!("ステージ一覧 ({} 個):", build.stages.len()).bold()
    );
    let progress = BuildProgress::new(build.stages.len());
    let output = match orchestrator
        .run_with_observer(&project.root, &build.stages, &progress)
        .await
    {
        Ok(output) => output,
        Err(e) => {
            let step = e
                .stage_identifier()
                .unwrap_or_else(|| "ビルド".to_string());
            eprintln!();
            eprintln!("{}", format!("✗ ビルド失敗: {}", step).red().bold());
            eprintln!("{}", e.user_message());
            eprintln!("{}", "イメージは作成されていません".dimmed());
            return Err(anyhow::anyhow!("{} に失敗しました", step));
        }
    };

    let report = &output.report;
    info!(
        image = %build.image_reference(),
        hits = report.hits(),
        stages = report.stages.len(),
        "Build stages finished"
    );
    println!(
        "  {} / {} ステージがキャッシュヒット（{:.1}s）",
        report.hits(),
        report.stages.len(),
        report.total_duration().as_secs_f64()
    );

    let assembled = ImageAssembler::assemble(build, &output)?;

    if no_image {
        println!();
        println!("{}", "Dockerfile:".bold());
        print!("{}", assembled.dockerfile.dimmed());
        return Ok(());
    }

    println!();
    println!("{}", "Dockerに接続中...".blue());
    let docker_conn = docker::init_docker_with_error_handling().await?;

    let builder = ImageBuilder::new(docker_conn);
    builder
        .build_and_tag(&assembled)
        .await
        .map_err(|e| utils::report_failure("イメージのビルドに失敗しました", "イメージビルド", &e.user_message()))?;

    println!();
    println!("{}", "✓ ビルド完了！".green().bold());
    for tag in &assembled.image.tags {
        println!("  • {}", tag.cyan());
    }
    println!(
        "  実行ユーザー: {}  ポート: {}",
        assembled.image.run_as, assembled.image.exposed_port
    );

    Ok(())
}
