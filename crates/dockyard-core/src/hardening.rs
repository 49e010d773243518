//! ハードニングポリシーの適用
//!
//! ベースのトポロジーにプロファイルを重ね、新しいトポロジーを返します。
//! ベースは変更されず、イメージにも影響しません。

use crate::error::Result;
use crate::model::{HardeningProfile, Stack};
use crate::topology::Topology;
use tracing::debug;

/// トポロジー全体にプロファイルを適用
///
/// 空のプロファイルは恒等変換。適用は制限の和集合で、既存の制限を外すことはない。
pub fn apply(base: &Topology, profile: &HardeningProfile) -> Topology {
    let mut hardened = base.clone();
    if profile.is_empty() {
        return hardened;
    }

    for instance in hardened.instances.values_mut() {
        instance.security = instance.security.compose(profile);
    }
    hardened
}

/// 名前で指定したプロファイルを順に適用
pub fn apply_named<S: AsRef<str>>(base: &Topology, stack: &Stack, names: &[S]) -> Result<Topology> {
    let mut topology = base.clone();
    for name in names {
        let profile = stack.profile(name.as_ref())?;
        debug!(profile = %name.as_ref(), "Applying hardening profile");
        topology = apply(&topology, profile);
    }
    Ok(topology)
}
