//! ハードニングプロファイルのパース

use super::{first_bool, first_string, positional_strings};
use crate::error::{Result, StackError};
use crate::model::{HardeningProfile, RestartPolicy, normalize_capability};
use kdl::KdlNode;
use std::path::PathBuf;

/// profile ノードをパース
pub fn parse_profile(node: &KdlNode) -> Result<(String, HardeningProfile)> {
    let name = first_string(node)
        .ok_or_else(|| StackError::InvalidConfig("profile requires a name".to_string()))?;

    let mut profile = HardeningProfile::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "drop_capabilities" => {
                    profile.drop_capabilities.extend(
                        positional_strings(child)
                            .iter()
                            .map(|cap| normalize_capability(cap)),
                    );
                }
                "read_only_root" => {
                    profile.read_only_root = first_bool(child);
                }
                "no_new_privileges" => {
                    profile.no_new_privileges = first_bool(child);
                }
                "restart" => {
                    let policy = first_string(child).unwrap_or_default();
                    profile.restart_policy =
                        Some(RestartPolicy::parse(&policy).ok_or_else(|| {
                            StackError::InvalidConfig(format!(
                                "profile '{name}': 不明な再起動ポリシー '{policy}'"
                            ))
                        })?);
                }
                "writable" => {
                    profile
                        .writable_paths
                        .extend(positional_strings(child).into_iter().map(PathBuf::from));
                }
                "user" => {
                    profile.user = first_string(child);
                }
                _ => {}
            }
        }
    }

    Ok((name, profile))
}
