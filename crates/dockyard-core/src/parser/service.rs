//! サービスノードのパース

use super::port::parse_port;
use super::volume::parse_volume_mount;
use super::{first_integer, first_string, positional_strings, prop_integer, prop_string};
use crate::error::{Result, StackError};
use crate::model::{DatabaseLink, HealthCheck, RestartPolicy, Service, WaitConfig};
use crate::model::service::{
    default_interval, default_retries, default_start_period, default_timeout,
};
use kdl::{KdlDocument, KdlNode};

/// service ノードをパース
pub fn parse_service(node: &KdlNode) -> Result<(String, Service)> {
    let name = first_string(node)
        .ok_or_else(|| StackError::InvalidConfig("service requires a name".to_string()))?;

    let mut service = Service::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "image" => {
                    service.image = first_string(child);
                }
                "command" => {
                    service.command = first_string(child);
                }
                "port" => {
                    service.ports.push(parse_port(child)?);
                }
                "volume" => {
                    service.volumes.push(parse_volume_mount(child)?);
                }
                "env" | "environment" => {
                    if let Some(envs) = child.children() {
                        for env_node in envs.nodes() {
                            let key = env_node.name().value().to_string();
                            let value = first_string(env_node).unwrap_or_default();
                            service.environment.insert(key, value);
                        }
                    } else if let Some(val) = first_string(child)
                        && let Some((k, v)) = val.split_once('=')
                    {
                        // フラットな env "KEY=VALUE" 形式
                        service
                            .environment
                            .insert(k.trim().to_string(), v.trim().to_string());
                    }
                }
                "depends_on" => {
                    service.depends_on.extend(positional_strings(child));
                }
                "healthcheck" => {
                    service.healthcheck = Some(parse_healthcheck(child));
                }
                "restart" => {
                    if let Some(policy) = first_string(child) {
                        service.restart = Some(RestartPolicy::parse(&policy).ok_or_else(|| {
                            StackError::InvalidConfig(format!(
                                "service '{name}': 不明な再起動ポリシー '{policy}'"
                            ))
                        })?);
                    }
                }
                "wait_for" => {
                    service.wait_for = Some(parse_wait_config(child));
                }
                "database" => {
                    service.database = Some(parse_database(child).ok_or_else(|| {
                        StackError::InvalidConfig(format!(
                            "service '{name}': database requires a service name"
                        ))
                    })?);
                }
                "profile" => {
                    service.profiles.extend(positional_strings(child));
                }
                "user" => {
                    service.user = first_string(child);
                }
                _ => {}
            }
        }
    }

    Ok((name, service))
}

/// healthcheck ノードをパース
///
/// 位置引数をテストコマンドとして扱い、設定はプロパティまたは子ノードで指定する。
pub fn parse_healthcheck(node: &KdlNode) -> HealthCheck {
    let mut healthcheck = HealthCheck {
        test: positional_strings(node),
        interval: default_interval(),
        timeout: default_timeout(),
        retries: default_retries(),
        start_period: default_start_period(),
    };

    let read = |key: &str| prop_integer(node, key).map(|v| v.max(0) as u64);
    if let Some(v) = read("interval") {
        healthcheck.interval = v;
    }
    if let Some(v) = read("timeout") {
        healthcheck.timeout = v;
    }
    if let Some(v) = read("retries") {
        healthcheck.retries = v;
    }
    if let Some(v) = read("start_period") {
        healthcheck.start_period = v;
    }

    if let Some(children) = node.children() {
        apply_healthcheck_children(&mut healthcheck, children);
    }

    healthcheck
}

fn apply_healthcheck_children(healthcheck: &mut HealthCheck, doc: &KdlDocument) {
    for node in doc.nodes() {
        let value = first_integer(node).map(|v| v.max(0) as u64);
        match (node.name().value(), value) {
            ("test", _) => healthcheck.test = positional_strings(node),
            ("interval", Some(v)) => healthcheck.interval = v,
            ("timeout", Some(v)) => healthcheck.timeout = v,
            ("retries", Some(v)) => healthcheck.retries = v,
            ("start_period", Some(v)) => healthcheck.start_period = v,
            _ => {}
        }
    }
}

/// wait_for ノードをパース（exponential backoff設定）
///
/// 何も指定しなければデフォルト設定で有効化される。
pub fn parse_wait_config(node: &KdlNode) -> WaitConfig {
    let mut config = WaitConfig::default();

    if let Some(v) = prop_integer(node, "max_retries") {
        config.max_retries = v.max(0) as u32;
    }
    if let Some(v) = prop_integer(node, "initial_delay_ms") {
        config.initial_delay_ms = v.max(0) as u64;
    }
    if let Some(v) = prop_integer(node, "max_delay_ms") {
        config.max_delay_ms = v.max(0) as u64;
    }
    if let Some(value) = node.get("multiplier") {
        // 整数または浮動小数点数を受け付ける
        if let Some(v) = value.as_float() {
            config.multiplier = v;
        } else if let Some(v) = value.as_integer() {
            config.multiplier = v as f64;
        }
    }

    config
}

/// `database "db" url="DATABASE_URL" user="DATABASE_USER" password="DATABASE_PASSWORD" name="DATABASE_NAME"`
fn parse_database(node: &KdlNode) -> Option<DatabaseLink> {
    let mut link = DatabaseLink::new(first_string(node)?);
    if let Some(key) = prop_string(node, "url") {
        link.url_key = key;
    }
    if let Some(key) = prop_string(node, "user") {
        link.user_key = key;
    }
    if let Some(key) = prop_string(node, "password") {
        link.password_key = key;
    }
    if let Some(key) = prop_string(node, "name") {
        link.name_key = key;
    }
    Some(link)
}
