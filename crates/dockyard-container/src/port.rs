use crate::error::{ContainerError, Result};
use dockyard_core::{Protocol, Topology};
use std::collections::BTreeSet;
use std::net::{TcpListener, UdpSocket};
use tracing::debug;

/// ホスト側でポートをバインドできるか確認する
pub fn is_port_available(host_ip: &str, port: u16, protocol: Protocol) -> bool {
    match protocol {
        Protocol::Tcp => TcpListener::bind((host_ip, port)).is_ok(),
        Protocol::Udp => UdpSocket::bind((host_ip, port)).is_ok(),
    }
}

/// `start` 以降で最初に空いているポート
pub fn next_free_port(host_ip: &str, start: u16, protocol: Protocol) -> Option<u16> {
    (start..=u16::MAX).find(|&port| is_port_available(host_ip, port, protocol))
}

/// 公開ポートが全て空いていることを確認する
///
/// `held` はこのプロジェクトの既存コンテナが既に使っているホストポートで、
/// 再起動時の自己衝突として扱わない。
pub fn ensure_ports_available(topology: &Topology, held: &BTreeSet<u16>) -> Result<()> {
    let mut claimed = BTreeSet::new();

    for instance in topology.ordered_instances() {
        for port in &instance.ports {
            let Some(host_port) = port.host else {
                continue;
            };
            let host_ip = port.host_ip.as_deref().unwrap_or("0.0.0.0");

            let conflict = !claimed.insert(host_port)
                || (!held.contains(&host_port)
                    && !is_port_available(host_ip, host_port, port.protocol));

            if conflict {
                let suggestion = (host_port.saturating_add(1)..=u16::MAX)
                    .filter(|p| !claimed.contains(p) && !held.contains(p))
                    .find(|&p| is_port_available(host_ip, p, port.protocol))
                    .unwrap_or(0);
                return Err(ContainerError::PortAlreadyInUse {
                    service: instance.name.clone(),
                    port: host_port,
                    container_port: port.container,
                    suggestion,
                });
            }
            debug!(service = %instance.name, port = host_port, "Host port available");
        }
    }
    Ok(())
}
