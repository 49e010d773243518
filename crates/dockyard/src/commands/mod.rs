pub mod build;
pub mod down;
pub mod logs;
pub mod ps;
pub mod up;
pub mod validate;
pub mod volume;

use dockyard_container::NetworkTopology;
use dockyard_core::Topology;

/// 依存先とデータベース接続先が論理名で解決できることを確認
///
/// 同じネットワークに参加していないサービス同士は名前で解決できない。
pub fn check_name_resolution(topology: &Topology) -> anyhow::Result<NetworkTopology> {
    let networks = NetworkTopology::from_topology(topology)?;
    for instance in topology.ordered_instances() {
        for dependency in &instance.depends_on {
            networks.resolve(&instance.name, dependency)?;
        }
    }
    Ok(networks)
}
