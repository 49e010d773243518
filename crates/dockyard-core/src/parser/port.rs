//! ポートノードのパース

use super::{positional_strings, prop_integer, prop_string, to_port};
use crate::error::{Result, StackError};
use crate::model::{Port, Protocol};
use kdl::KdlNode;

/// port ノードをパース
///
/// ```kdl
/// port container=5432                  // ネットワーク内部のみ
/// port host=15432 container=5432       // ホストへ再公開
/// port 8080 8080 protocol="tcp"
/// ```
pub fn parse_port(node: &KdlNode) -> Result<Port> {
    let positional: Vec<i128> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_integer())
        .collect();

    let (mut host, mut container) = match positional.as_slice() {
        [container] => (None, Some(*container)),
        [host, container, ..] => (Some(*host), Some(*container)),
        [] => (None, None),
    };

    if let Some(value) = prop_integer(node, "host") {
        host = Some(value);
    }
    if let Some(value) = prop_integer(node, "container") {
        container = Some(value);
    }

    let container = container
        .ok_or_else(|| StackError::InvalidConfig("port requires a container port".to_string()))?;

    // 文字列で書かれた protocol も位置引数として許容
    let protocol = prop_string(node, "protocol")
        .or_else(|| positional_strings(node).into_iter().next())
        .map(|p| Protocol::parse(&p))
        .unwrap_or_default();

    Ok(Port {
        host: host.map(|h| to_port(h, "port host")).transpose()?,
        container: to_port(container, "port container")?,
        protocol,
        host_ip: prop_string(node, "host_ip"),
    })
}
