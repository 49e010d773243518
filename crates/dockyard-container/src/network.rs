//! 仮想ネットワークと論理名の解決
//!
//! インスタンスは参加しているネットワーク上で論理サービス名により解決されます。
//! 解決は呼び出しごとに現在の参加状況から行うため、同じ名前で作り直された
//! インスタンスには相手側の再設定なしで到達できます。
//!
//! ネットワークの集合は値として保持され、グローバルな名前解決の状態は持ちません。

use crate::error::{ContainerError, Result};
use dockyard_core::Topology;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use tracing::debug;

/// ゲートウェイ（.0.1）の次から割り当てる
const FIRST_HOST: u32 = 2;
/// /16 のうち利用可能なホスト数の上限
const LAST_HOST: u32 = 0xFFFE;

/// 仮想ネットワーク
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualNetwork {
    pub name: String,
    /// 参加中のインスタンス名と現在のアドレス
    pub members: BTreeMap<String, Ipv4Addr>,
    subnet: Ipv4Addr,
    next_host: u32,
}

impl VirtualNetwork {
    fn new(name: &str, subnet_index: u8) -> Self {
        Self {
            name: name.to_string(),
            members: BTreeMap::new(),
            subnet: Ipv4Addr::new(10, subnet_index, 0, 0),
            next_host: FIRST_HOST,
        }
    }

    pub fn subnet(&self) -> Ipv4Addr {
        self.subnet
    }

    pub fn contains(&self, instance: &str) -> bool {
        self.members.contains_key(instance)
    }

    /// アドレスは再利用しない。作り直したインスタンスは新しいアドレスを受け取る
    fn allocate(&mut self) -> Result<Ipv4Addr> {
        if self.next_host > LAST_HOST {
            return Err(ContainerError::AddressPoolExhausted(self.name.clone()));
        }
        let address = Ipv4Addr::from(u32::from(self.subnet) + self.next_host);
        self.next_host += 1;
        Ok(address)
    }
}

/// ネットワークの集合
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkTopology {
    networks: BTreeMap<String, VirtualNetwork>,
    next_subnet: u8,
}

impl NetworkTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// 起動トポロジーの全インスタンスを1つのネットワークに参加させた状態を作る
    pub fn from_topology(topology: &Topology) -> Result<Self> {
        let mut networks = Self::new();
        networks.create_network(&topology.network)?;
        for instance in topology.ordered_instances() {
            networks.attach(&topology.network, &instance.name)?;
        }
        Ok(networks)
    }

    /// ネットワークを作成（既に存在する場合はそのまま返す）
    pub fn create_network(&mut self, name: &str) -> Result<&VirtualNetwork> {
        if !self.networks.contains_key(name) {
            let subnet_index = self
                .next_subnet
                .checked_add(1)
                .ok_or_else(|| ContainerError::AddressPoolExhausted(name.to_string()))?;
            self.next_subnet = subnet_index;
            debug!(network = %name, subnet_index, "Created virtual network");
            self.networks
                .insert(name.to_string(), VirtualNetwork::new(name, subnet_index));
        }
        self.network(name)
    }

    pub fn network(&self, name: &str) -> Result<&VirtualNetwork> {
        self.networks
            .get(name)
            .ok_or_else(|| ContainerError::NetworkNotFound(name.to_string()))
    }

    /// インスタンスをネットワークに参加させ、割り当てたアドレスを返す
    ///
    /// 同じ名前のインスタンスが既に参加している場合は置き換える。
    pub fn attach(&mut self, network: &str, instance: &str) -> Result<Ipv4Addr> {
        let net = self
            .networks
            .get_mut(network)
            .ok_or_else(|| ContainerError::NetworkNotFound(network.to_string()))?;
        let address = net.allocate()?;
        net.members.insert(instance.to_string(), address);
        debug!(network = %network, instance = %instance, %address, "Attached instance");
        Ok(address)
    }

    /// ネットワークから外す。参加していなかった場合は false
    pub fn detach(&mut self, network: &str, instance: &str) -> bool {
        self.networks
            .get_mut(network)
            .and_then(|net| net.members.remove(instance))
            .is_some()
    }

    /// 全ネットワークからインスタンスを外す（インスタンスの削除）
    pub fn remove_instance(&mut self, instance: &str) {
        for net in self.networks.values_mut() {
            net.members.remove(instance);
        }
    }

    pub fn remove_network(&mut self, name: &str) -> Option<VirtualNetwork> {
        self.networks.remove(name)
    }

    /// `from` の視点で論理名 `name` を現在のアドレスに解決
    ///
    /// 両者が共通のネットワークに参加している場合のみ解決できる。
    pub fn resolve(&self, from: &str, name: &str) -> Result<Ipv4Addr> {
        self.networks
            .values()
            .filter(|net| net.contains(from))
            .find_map(|net| net.members.get(name).copied())
            .ok_or_else(|| ContainerError::NameNotResolvable {
                from: from.to_string(),
                name: name.to_string(),
            })
    }
}
