pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 設定ファイル名
pub const SETTINGS_FILE: &str = "config.yaml";

/// Dockyardの設定ディレクトリを取得
///
/// `DOCKYARD_CONFIG_DIR` が設定されていればそれを使う。
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = match std::env::var_os("DOCKYARD_CONFIG_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::config_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join("dockyard"),
    };

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// グローバル設定（~/.config/dockyard/config.yaml）
///
/// ```yaml
/// cache_dir: /var/cache/dockyard
/// build_timeout_secs: 900
/// default_profiles:
///   - hardened
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// 依存キャッシュの保存先
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// ビルドステージ1つあたりのタイムアウト（秒）
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,
    /// `up` で常に適用するハードニングプロファイル
    #[serde(default)]
    pub default_profiles: Vec<String>,
}

fn default_build_timeout_secs() -> u64 {
    1800
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: None,
            build_timeout_secs: default_build_timeout_secs(),
            default_profiles: Vec::new(),
        }
    }
}

impl Settings {
    /// 設定ディレクトリから読み込む。ファイルがなければデフォルト
    pub fn load() -> Result<Self> {
        let path = get_config_dir()?.join(SETTINGS_FILE);
        Self::load_from(&path)
    }

    /// 指定パスから読み込む。ファイルがなければデフォルト
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Settings file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| ConfigError::InvalidSettings {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// 依存キャッシュのディレクトリ
    ///
    /// 優先順位: 設定ファイルの cache_dir → ユーザーキャッシュディレクトリ/dockyard
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let dir = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir()
                .ok_or(ConfigError::CacheDirNotFound)?
                .join("dockyard"),
        };

        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }

        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn test_get_config_dir() {
        temp_env::with_var_unset("DOCKYARD_CONFIG_DIR", || {
            let config_dir = get_config_dir().unwrap();
            assert!(config_dir.ends_with("dockyard"));
            assert!(config_dir.exists());
        });
    }

    #[test]
    #[serial]
    fn test_get_config_dir_env_override() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("custom-config");

        temp_env::with_var("DOCKYARD_CONFIG_DIR", Some(&custom), || {
            let config_dir = get_config_dir().unwrap();
            assert_eq!(config_dir, custom);
            assert!(custom.exists());
        });
    }

    #[test]
    #[serial]
    fn test_load_settings_from_config_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(
            temp_dir.path().join(SETTINGS_FILE),
            "build_timeout_secs: 60\ndefault_profiles: [hardened]\n",
        )
        .unwrap();

        temp_env::with_var("DOCKYARD_CONFIG_DIR", Some(temp_dir.path()), || {
            let settings = Settings::load().unwrap();
            assert_eq!(settings.build_timeout_secs, 60);
            assert_eq!(settings.default_profiles, vec!["hardened"]);
        });
    }

    #[test]
    fn test_load_settings_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&temp_dir.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.build_timeout_secs, 1800);
    }

    #[test]
    fn test_load_settings_empty_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE);
        fs::write(&path, "\n").unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), Settings::default());
    }

    #[test]
    fn test_load_settings_unknown_field() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE);
        fs::write(&path, "cache_directory: /tmp\n").unwrap();

        let result = Settings::load_from(&path);
        assert!(matches!(result, Err(ConfigError::InvalidSettings { .. })));
    }

    #[test]
    fn test_cache_dir_from_settings() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            cache_dir: Some(temp_dir.path().join("cache")),
            ..Default::default()
        };

        let dir = settings.cache_dir().unwrap();
        assert_eq!(dir, temp_dir.path().join("cache"));
        assert!(dir.exists());
    }
}
