//! サービス内 volume ノードのパース

use super::{positional_strings, prop_bool};
use crate::error::{Result, StackError};
use crate::model::VolumeMount;
use kdl::KdlNode;
use std::path::PathBuf;

/// `volume "pgdata" "/var/lib/postgresql/data" read_only=#false`
pub fn parse_volume_mount(node: &KdlNode) -> Result<VolumeMount> {
    let args = positional_strings(node);
    let [volume, target, ..] = args.as_slice() else {
        return Err(StackError::InvalidConfig(
            "service volume requires a volume name and a mount path".to_string(),
        ));
    };

    Ok(VolumeMount {
        volume: volume.clone(),
        target: PathBuf::from(target),
        read_only: prop_bool(node, "read_only").unwrap_or(false),
    })
}
