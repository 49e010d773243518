//! ハードニングプロファイル定義

use super::service::RestartPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// ハードニングプロファイル
///
/// ベースのランタイム設定に重ねる制限の集合。合成は常に制限の和集合で、
/// 既存の制限を緩めることはない。
///
/// KDL形式：
/// ```kdl
/// profile "hardened" {
///     drop_capabilities "NET_RAW" "SYS_ADMIN"
///     read_only_root #true
///     no_new_privileges #true
///     restart "on-failure"
///     writable "/tmp"
///     user "app"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardeningProfile {
    #[serde(default)]
    pub drop_capabilities: BTreeSet<String>,
    #[serde(default)]
    pub read_only_root: bool,
    #[serde(default)]
    pub no_new_privileges: bool,
    #[serde(default)]
    pub restart_policy: Option<RestartPolicy>,
    /// 読み取り専用ルートでも書き込み可能にするパス（tmpfs）
    #[serde(default)]
    pub writable_paths: BTreeSet<PathBuf>,
    /// 非rootの実行ユーザー
    #[serde(default)]
    pub user: Option<String>,
}

impl HardeningProfile {
    /// 何も制限しないプロファイルか
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// 2つのプロファイルを制限の和集合として合成
    pub fn compose(&self, other: &HardeningProfile) -> HardeningProfile {
        let restart_policy = match (self.restart_policy, other.restart_policy) {
            (Some(a), Some(b)) => Some(a.stronger(b)),
            (a, b) => a.or(b),
        };
        let user = match (&self.user, &other.user) {
            (Some(current), _) if !is_root_user(current) => Some(current.clone()),
            (_, Some(next)) if !is_root_user(next) => Some(next.clone()),
            (current, _) => current.clone(),
        };

        HardeningProfile {
            drop_capabilities: self
                .drop_capabilities
                .union(&other.drop_capabilities)
                .cloned()
                .collect(),
            read_only_root: self.read_only_root || other.read_only_root,
            no_new_privileges: self.no_new_privileges || other.no_new_privileges,
            restart_policy,
            writable_paths: self
                .writable_paths
                .union(&other.writable_paths)
                .cloned()
                .collect(),
            user,
        }
    }
}

/// capability 名を正規化（大文字化し `CAP_` を除去）
pub fn normalize_capability(name: &str) -> String {
    let upper = name.trim().to_uppercase();
    upper
        .strip_prefix("CAP_")
        .map(str::to_string)
        .unwrap_or(upper)
}

/// root 権限のユーザー指定か
pub fn is_root_user(user: &str) -> bool {
    let name = user.split(':').next().unwrap_or(user).trim();
    name.is_empty() || name == "root" || name == "0"
}
