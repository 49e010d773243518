use colored::Colorize;
use dockyard_core::{LOCAL_STACK_FILE, Project};

/// 読み込んだ設定ファイルを表示
pub fn print_loaded_config_files(project: &Project) {
    println!(
        "プロジェクト: {} ({})",
        project.stack.name.cyan(),
        project.root.display().to_string().dimmed()
    );
    if project.root.join(LOCAL_STACK_FILE).exists() {
        println!("  + {}", LOCAL_STACK_FILE.dimmed());
    }
    if let Some(env) = &project.override_env {
        println!("  + オーバーライド変数: {}個", env.len());
    }
}

/// CLI 指定のプロファイルに設定ファイルのデフォルトを足す（重複は除く）
pub fn effective_profiles(cli: &[String], defaults: &[String]) -> Vec<String> {
    let mut profiles: Vec<String> = Vec::new();
    for name in defaults.iter().chain(cli) {
        if !profiles.contains(name) {
            profiles.push(name.clone());
        }
    }
    profiles
}

/// エラーを表示してプロセスの終了に使う anyhow エラーに変換
pub fn report_failure(title: &str, step: &str, error: &dyn std::fmt::Display) -> anyhow::Error {
    eprintln!();
    eprintln!("{}", format!("✗ {}", title).red().bold());
    eprintln!("  {}", error);
    anyhow::anyhow!("{} に失敗しました", step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_profiles_keeps_order_and_dedups() {
        let cli = vec!["hardened".to_string(), "readonly".to_string()];
        let defaults = vec!["baseline".to_string(), "hardened".to_string()];
        assert_eq!(
            effective_profiles(&cli, &defaults),
            vec!["baseline", "hardened", "readonly"]
        );
    }
}
