//! ポート定義

use serde::{Deserialize, Serialize};

/// ポート定義
///
/// `host` が未指定のポートはネットワーク内部にのみ公開される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    #[serde(default)]
    pub host: Option<u16>,
    pub container: u16,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub host_ip: Option<String>,
}

impl Port {
    /// ネットワーク内部専用のポート
    pub fn internal(container: u16) -> Self {
        Self {
            host: None,
            container,
            protocol: Protocol::Tcp,
            host_ip: None,
        }
    }

    /// ホストに公開するポート
    pub fn published(host: u16, container: u16) -> Self {
        Self {
            host: Some(host),
            container,
            protocol: Protocol::Tcp,
            host_ip: None,
        }
    }

    pub fn is_published(&self) -> bool {
        self.host.is_some()
    }

    /// Docker API のポートキー（例: `5432/tcp`）
    pub fn container_key(&self) -> String {
        format!("{}/{}", self.container, self.protocol.as_str())
    }
}

/// プロトコル種別
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    /// 文字列からProtocolをパース
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "udp" => Protocol::Udp,
            _ => Protocol::Tcp,
        }
    }

    /// Docker APIで使用する文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}
