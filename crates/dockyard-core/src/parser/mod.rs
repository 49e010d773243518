//! KDLパーサー
//!
//! dockyard.kdl をパースして [`Stack`] を生成します。
//! 各ノードタイプのパース処理はモジュールに分離されています。

mod build;
mod port;
mod profile;
mod service;
mod volume;

use build::parse_build;
use profile::parse_profile;
use service::parse_service;

use crate::error::{Result, StackError};
use crate::model::{Service, Stack};
use kdl::{KdlDocument, KdlNode};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// KDLファイルをパースしてStackを生成
pub fn parse_stack_file<P: AsRef<Path>>(path: P) -> Result<Stack> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| StackError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let name = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_stack_string(&content, name)
}

/// KDL文字列をパース
///
/// 同名の service ノードが複数ある場合は後のものがマージされる
/// （dockyard.local.kdl による上書き）。
pub fn parse_stack_string(content: &str, default_name: String) -> Result<Stack> {
    let doc: KdlDocument = content.parse()?;

    let mut stack = Stack {
        name: default_name,
        ..Default::default()
    };
    let mut network: Option<String> = None;
    let mut services: BTreeMap<String, Service> = BTreeMap::new();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if let Some(project_name) = first_string(node) {
                    stack.name = project_name;
                }
            }
            "network" => {
                network = first_string(node);
            }
            "volume" => {
                let name = first_string(node).ok_or_else(|| {
                    StackError::InvalidConfig("volume requires a name".to_string())
                })?;
                stack.volumes.insert(name);
            }
            "service" => {
                let (service_name, service) = parse_service(node)?;
                if let Some(existing) = services.get_mut(&service_name) {
                    existing.merge(service);
                } else {
                    services.insert(service_name, service);
                }
            }
            "profile" => {
                let (profile_name, profile) = parse_profile(node)?;
                stack.profiles.insert(profile_name, profile);
            }
            "build" => {
                stack.build = Some(parse_build(node)?);
            }
            _ => {
                // 不明なノードはスキップ
            }
        }
    }

    stack.network = network.unwrap_or_else(|| stack.name.clone());
    stack.services = services;
    Ok(stack)
}

/// 最初の位置引数（文字列）
pub(crate) fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// 全ての位置引数（文字列）
pub(crate) fn positional_strings(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string().map(|s| s.to_string()))
        .collect()
}

/// 最初の位置引数（真偽値）。引数のないフラグノードは true
pub(crate) fn first_bool(node: &KdlNode) -> bool {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
        .unwrap_or(true)
}

/// 最初の位置引数（整数）
pub(crate) fn first_integer(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

pub(crate) fn prop_string(node: &KdlNode, key: &str) -> Option<String> {
    node.get(key)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

pub(crate) fn prop_integer(node: &KdlNode, key: &str) -> Option<i128> {
    node.get(key).and_then(|v| v.as_integer())
}

pub(crate) fn prop_bool(node: &KdlNode, key: &str) -> Option<bool> {
    node.get(key).and_then(|v| v.as_bool())
}

/// ポート番号として解釈
pub(crate) fn to_port(value: i128, context: &str) -> Result<u16> {
    u16::try_from(value)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| StackError::InvalidConfig(format!("{context}: 無効なポート番号 {value}")))
}
