//! 環境変数の解決
//!
//! ベース定義・オーバーライドファイル・プロセス環境変数の3つのソースを
//! キー単位でマージします。優先順位は固定です:
//!
//! `process_environment > override_file > base_defaults`
//!
//! 1つのキーの値が部分的にマージされることはありません。

use crate::error::{Result, StackError};
use crate::model::{DatabaseLink, Service};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

/// 環境変数のマップ
pub type EnvMap = BTreeMap<String, String>;

/// 値の出所
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Base,
    OverrideFile,
    Process,
}

impl Source {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::OverrideFile => "override-file",
            Self::Process => "process",
        }
    }
}

/// 解決済みの値
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedValue {
    pub value: String,
    pub source: Source,
}

/// 解決済みの設定セット
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigurationSet {
    values: BTreeMap<String, ResolvedValue>,
}

impl ConfigurationSet {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.value.as_str())
    }

    pub fn source_of(&self, key: &str) -> Option<Source> {
        self.values.get(key).map(|v| v.source)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResolvedValue)> {
        self.values.iter()
    }

    /// 出所を捨てた単純なマップ
    pub fn to_env_map(&self) -> EnvMap {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect()
    }

    fn layer(&mut self, source: Source, values: &EnvMap) {
        for (key, value) in values {
            self.values.insert(
                key.clone(),
                ResolvedValue {
                    value: value.clone(),
                    source,
                },
            );
        }
    }
}

/// 3つのソースをキー単位でマージ
///
/// 上位ソースに存在するキーは下位ソースの同じキーを完全に隠す。
pub fn resolve(base: &EnvMap, override_file: Option<&EnvMap>, process: &EnvMap) -> ConfigurationSet {
    let mut set = ConfigurationSet::default();
    set.layer(Source::Base, base);
    if let Some(overrides) = override_file {
        set.layer(Source::OverrideFile, overrides);
    }
    set.layer(Source::Process, process);
    set
}

/// サービス単位で解決
///
/// オーバーライドファイルとプロセス環境変数は、サービスがベース定義で宣言した
/// キーだけに絞り込んでから適用する。ホスト固有の変数や他サービスの秘密情報が
/// コンテナに漏れることはない。
pub fn resolve_for_service(
    service: &Service,
    override_file: Option<&EnvMap>,
    process: &EnvMap,
) -> ConfigurationSet {
    let base = &service.environment;
    let scoped_overrides = override_file.map(|values| restrict_to(values, base));
    let scoped_process = restrict_to(process, base);
    resolve(base, scoped_overrides.as_ref(), &scoped_process)
}

fn restrict_to(values: &EnvMap, declared: &EnvMap) -> EnvMap {
    values
        .iter()
        .filter(|(key, _)| declared.contains_key(*key))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// 現在のプロセス環境変数を取得
pub fn capture_process_env() -> EnvMap {
    std::env::vars().collect()
}

/// .env 形式の文字列をパース
///
/// 空行と `#` で始まるコメント行はスキップし、対になったクォートを1段だけ除去する。
pub fn parse_env_file(content: &str) -> EnvMap {
    let mut values = EnvMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            values.insert(key.to_string(), strip_quotes(value.trim()).to_string());
        }
    }
    values
}

/// .env ファイルを読み込む
#[tracing::instrument]
pub fn load_env_file(path: &Path) -> Result<EnvMap> {
    let content = std::fs::read_to_string(path).map_err(|e| StackError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let values = parse_env_file(&content);
    info!(
        env_file = %path.display(),
        variable_count = values.len(),
        "Loaded variables from env file"
    );
    Ok(values)
}

fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

static CONNECTION_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:jdbc:)?[A-Za-z][A-Za-z0-9+.\-]*://(?:[^/?#]*@)?(\[[^\]]+\]|[^:/?#,@]+)")
        .expect("connection host pattern is valid")
});

/// 接続文字列からホスト部分を取り出す
///
/// `postgres://user:pass@db:5432/app` → `db`、`jdbc:mysql://[::1]:3306/app` → `::1`
///
/// ユーザー情報はパス手前の最後の `@` までとみなす（パスワード中の `@` を許容）。
pub fn connection_host(url: &str) -> Option<String> {
    let captures = CONNECTION_HOST.captures(url.trim())?;
    let host = captures.get(1)?.as_str();
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

/// 呼び出し元コンテナ自身を指すアドレスか
pub fn is_self_address(host: &str) -> bool {
    let host = host.trim().to_lowercase();
    // FQDN 表記の末尾ドット
    let host = host.strip_suffix('.').unwrap_or(&host);
    if matches!(
        host,
        "localhost" | "localhost.localdomain" | "ip6-localhost" | "ip6-loopback"
    ) {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(ip) => {
            // ::ffff:127.0.0.1 などの IPv4 射影アドレスは IPv4 として判定する
            let ip = ip.to_canonical();
            ip.is_loopback() || ip.is_unspecified()
        }
        Err(_) => false,
    }
}

/// データベース接続設定の検証
///
/// 必須キーの存在を確認し、同じネットワーク上のデータベースを
/// ループバックアドレスで指していないかを接続前に検出する。
pub fn check_database_link(
    service_name: &str,
    link: &DatabaseLink,
    config: &ConfigurationSet,
    shares_network: bool,
) -> Result<()> {
    for key in link.required_keys() {
        if config.get(key).is_none() {
            return Err(StackError::MissingVariable {
                service: service_name.to_string(),
                key: key.to_string(),
            });
        }
    }

    let url = config.get(&link.url_key).unwrap_or_default();
    let host = connection_host(url).ok_or_else(|| StackError::InvalidConnectionString {
        service: service_name.to_string(),
        key: link.url_key.clone(),
        value: url.to_string(),
    })?;

    debug!(service = %service_name, host = %host, shares_network, "Checking database target");

    if shares_network && is_self_address(&host) {
        return Err(StackError::LoopbackTarget {
            service: service_name.to_string(),
            key: link.url_key.clone(),
            host,
            expected: link.service.clone(),
        });
    }

    Ok(())
}
