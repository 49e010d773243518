//! サービス定義

use super::port::Port;
use super::volume::VolumeMount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// サービス定義
///
/// KDL形式：
/// ```kdl
/// service "api" {
///     image "inventory-api:latest"
///     port host=8080 container=8080
///     depends_on "db"
///     database "db"
///     env {
///         DATABASE_URL "postgres://db:5432/inventory"
///     }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    pub image: Option<String>,
    pub command: Option<String>,
    #[serde(default)]
    pub ports: Vec<Port>,
    /// ベースとなる環境変数（最も優先度が低い）
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// ヘルスチェック設定
    pub healthcheck: Option<HealthCheck>,
    /// 再起動ポリシー (no, always, on-failure, unless-stopped)
    pub restart: Option<RestartPolicy>,
    /// 依存サービス待機設定（exponential backoff）
    pub wait_for: Option<WaitConfig>,
    /// データベース接続先の宣言
    pub database: Option<DatabaseLink>,
    /// このサービスにだけ適用するハードニングプロファイル
    #[serde(default)]
    pub profiles: Vec<String>,
    /// 実行ユーザー
    pub user: Option<String>,
}

/// 再起動ポリシー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// 再起動しない（デフォルト）
    #[default]
    No,
    /// 異常終了時のみ再起動
    OnFailure,
    /// 明示的に停止しない限り再起動
    UnlessStopped,
    /// 常に再起動
    Always,
}

impl RestartPolicy {
    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "no" | "never" => Some(Self::No),
            "always" => Some(Self::Always),
            "on-failure" | "on_failure" => Some(Self::OnFailure),
            "unless-stopped" | "unless_stopped" => Some(Self::UnlessStopped),
            _ => None,
        }
    }

    /// Docker APIで使用する文字列に変換
    pub fn as_docker_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Always => "always",
            Self::OnFailure => "on-failure",
            Self::UnlessStopped => "unless-stopped",
        }
    }

    /// 再起動の強さ。プロファイル合成では強い方を採用する
    pub fn strength(&self) -> u8 {
        match self {
            Self::No => 0,
            Self::OnFailure => 1,
            Self::UnlessStopped => 2,
            Self::Always => 3,
        }
    }

    /// 2つのポリシーのうち強い方
    pub fn stronger(self, other: Self) -> Self {
        if other.strength() > self.strength() {
            other
        } else {
            self
        }
    }
}

/// ヘルスチェック設定
///
/// KDL形式：
/// ```kdl
/// healthcheck "CMD-SHELL" "pg_isready -U app" interval=5 timeout=3
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// テストコマンド (CMD-SHELL形式またはCMD形式)
    pub test: Vec<String>,
    /// チェック間隔（秒）
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// タイムアウト（秒）
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// リトライ回数
    #[serde(default = "default_retries")]
    pub retries: u64,
    /// 起動待機時間（秒）
    #[serde(default = "default_start_period")]
    pub start_period: u64,
}

pub(crate) fn default_interval() -> u64 {
    30
}
pub(crate) fn default_timeout() -> u64 {
    3
}
pub(crate) fn default_retries() -> u64 {
    3
}
pub(crate) fn default_start_period() -> u64 {
    10
}

/// 依存サービス待機設定（Exponential Backoff）
///
/// KDL形式：
/// ```kdl
/// wait_for max_retries=10 initial_delay_ms=500 max_delay_ms=5000 multiplier=2.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitConfig {
    /// 最大リトライ回数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 初期待機時間（ミリ秒）
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    /// 最大待機時間（ミリ秒）
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Exponential倍率
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_retries() -> u32 {
    10
}
fn default_initial_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    5000
}
fn default_multiplier() -> f64 {
    2.0
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

impl WaitConfig {
    /// 指定回数目の待機時間を計算（ミリ秒）
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        (delay as u64).min(self.max_delay_ms)
    }

    /// 全リトライを使い切った場合の最大待機時間（ミリ秒）
    pub fn total_budget_ms(&self) -> u64 {
        (0..self.max_retries.saturating_sub(1))
            .map(|attempt| self.delay_for_attempt(attempt))
            .sum()
    }
}

/// データベース接続先の宣言
///
/// 接続文字列・ユーザー・パスワード・DB名をどの環境変数から読むかを表す。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseLink {
    /// 接続先のサービス名（論理名）
    pub service: String,
    pub url_key: String,
    pub user_key: String,
    pub password_key: String,
    pub name_key: String,
}

impl DatabaseLink {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            url_key: "DATABASE_URL".to_string(),
            user_key: "DATABASE_USER".to_string(),
            password_key: "DATABASE_PASSWORD".to_string(),
            name_key: "DATABASE_NAME".to_string(),
        }
    }

    /// 必須の環境変数キー
    pub fn required_keys(&self) -> [&str; 4] {
        [
            self.url_key.as_str(),
            self.user_key.as_str(),
            self.password_key.as_str(),
            self.name_key.as_str(),
        ]
    }
}

impl Service {
    /// 他のServiceをマージする
    ///
    /// otherで定義されたフィールドが優先される（オーバーライド）。
    /// - Option<T>: otherがSomeならそれを使用
    /// - Vec<T>: otherが空でなければそれを使用
    /// - 環境変数: キー単位でotherが優先
    pub fn merge(&mut self, other: Service) {
        if other.image.is_some() {
            self.image = other.image;
        }
        if other.command.is_some() {
            self.command = other.command;
        }
        if other.healthcheck.is_some() {
            self.healthcheck = other.healthcheck;
        }
        if other.restart.is_some() {
            self.restart = other.restart;
        }
        if other.wait_for.is_some() {
            self.wait_for = other.wait_for;
        }
        if other.database.is_some() {
            self.database = other.database;
        }
        if other.user.is_some() {
            self.user = other.user;
        }

        if !other.ports.is_empty() {
            self.ports = other.ports;
        }
        if !other.volumes.is_empty() {
            self.volumes = other.volumes;
        }
        if !other.depends_on.is_empty() {
            self.depends_on = other.depends_on;
        }
        if !other.profiles.is_empty() {
            self.profiles = other.profiles;
        }

        for (key, value) in other.environment {
            self.environment.insert(key, value);
        }
    }
}
