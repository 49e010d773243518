//! 実行トポロジーから Docker API パラメータへの変換

use bollard::container::{Config, CreateContainerOptions, NetworkingConfig};
use bollard::models::{
    EndpointSettings, HealthConfig, HostConfig, PortBinding, RestartPolicy as DockerRestartPolicy,
    RestartPolicyNameEnum,
};
use dockyard_core::{HealthCheck, InstanceSpec, RestartPolicy, Topology};
use std::collections::HashMap;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// インスタンスを Docker のコンテナ設定に変換
#[allow(deprecated)]
pub fn instance_to_container_config(
    topology: &Topology,
    instance: &InstanceSpec,
) -> (Config<String>, CreateContainerOptions<String>) {
    let env: Vec<String> = instance
        .environment
        .iter()
        .map(|(k, v)| format!("{}={}", k, v.value))
        .collect();

    // 全ポートをネットワーク上に公開し、host が指定されたものだけホストへバインド
    let mut port_bindings = HashMap::new();
    let mut exposed_ports = HashMap::new();

    for port in &instance.ports {
        let container_port = port.container_key();
        exposed_ports.insert(container_port.clone(), HashMap::new());

        if let Some(host_port) = port.host {
            let host_ip = port.host_ip.as_deref().unwrap_or("0.0.0.0");
            port_bindings.insert(
                container_port,
                Some(vec![PortBinding {
                    host_ip: Some(host_ip.to_string()),
                    host_port: Some(host_port.to_string()),
                }]),
            );
        }
    }

    // 名前付きボリューム（{project}_{volume}）
    let binds: Vec<String> = instance
        .mounts
        .iter()
        .map(|m| {
            let mode = if m.read_only { "ro" } else { "rw" };
            format!(
                "{}:{}:{}",
                topology.volume_name(&m.volume),
                m.target.display(),
                mode
            )
        })
        .collect();

    let security = &instance.security;

    let mut security_opt = Vec::new();
    if security.no_new_privileges {
        security_opt.push("no-new-privileges:true".to_string());
    }

    let tmpfs: HashMap<String, String> = security
        .writable_paths
        .iter()
        .map(|p| (p.display().to_string(), "rw,noexec,nosuid".to_string()))
        .collect();

    let host_config = Some(HostConfig {
        port_bindings: Some(port_bindings),
        binds: Some(binds),
        network_mode: Some(topology.network.clone()),
        cap_drop: (!security.drop_capabilities.is_empty())
            .then(|| security.drop_capabilities.iter().cloned().collect()),
        readonly_rootfs: security.read_only_root.then_some(true),
        security_opt: (!security_opt.is_empty()).then_some(security_opt),
        tmpfs: (!tmpfs.is_empty()).then_some(tmpfs),
        restart_policy: security.restart_policy.map(to_docker_restart_policy),
        ..Default::default()
    });

    let labels: HashMap<String, String> = topology.labels_for(&instance.name).into_iter().collect();

    // ネットワーク設定（論理サービス名でエイリアス）
    let mut endpoints = HashMap::new();
    endpoints.insert(
        topology.network.clone(),
        EndpointSettings {
            aliases: Some(vec![instance.name.clone()]),
            ..Default::default()
        },
    );

    let config = Config {
        image: Some(instance.image.clone()),
        env: Some(env),
        exposed_ports: Some(exposed_ports),
        host_config,
        labels: Some(labels),
        user: security.user.clone(),
        healthcheck: instance.healthcheck.as_ref().map(to_health_config),
        cmd: instance
            .command
            .as_ref()
            .map(|c| c.split_whitespace().map(String::from).collect()),
        networking_config: Some(NetworkingConfig {
            endpoints_config: endpoints,
        }),
        ..Default::default()
    };

    let options = CreateContainerOptions {
        name: topology.container_name(&instance.name),
        platform: None,
    };

    (config, options)
}

fn to_docker_restart_policy(policy: RestartPolicy) -> DockerRestartPolicy {
    let name = match policy {
        RestartPolicy::No => RestartPolicyNameEnum::NO,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
    };
    DockerRestartPolicy {
        name: Some(name),
        maximum_retry_count: None,
    }
}

/// 秒 → ナノ秒。i64 に収まらない値は None（Docker のデフォルトに任せる）
fn to_health_config(check: &HealthCheck) -> HealthConfig {
    let secs = |s: u64| i64::try_from(s).ok()?.checked_mul(NANOS_PER_SEC);
    HealthConfig {
        test: Some(check.test.clone()),
        interval: secs(check.interval),
        timeout: secs(check.timeout),
        retries: i64::try_from(check.retries).ok(),
        start_period: secs(check.start_period),
        ..Default::default()
    }
}

#[cfg(test)]
#[allow(deprecated)]
mod tests {
    use super::*;
    use dockyard_core::{EnvMap, hardening, parse_stack_string};

    const STACK: &str = r#"
project "inventory"
volume "pgdata"
service "db" {
    image "postgres:16"
    port container=5432
    volume "pgdata" "/var/lib/postgresql/data"
    healthcheck "CMD-SHELL" "pg_isready -U inventory" interval=5 timeout=3
    restart "unless-stopped"
    env {
        POSTGRES_PASSWORD "changeme"
    }
}
service "api" {
    image "inventory-api:1.4.0"
    command "/app/inventory-api --serve"
    port host=8080 container=8080
    depends_on "db"
    profile "hardened"
}
profile "hardened" {
    drop_capabilities "NET_RAW" "CAP_SYS_ADMIN"
    read_only_root #true
    no_new_privileges #true
    writable "/tmp"
    user "inventory"
}
"#;

    fn topology() -> Topology {
        let stack = parse_stack_string(STACK, "inventory".to_string()).unwrap();
        Topology::assemble(&stack, None, &EnvMap::new()).unwrap()
    }

    #[test]
    fn test_instance_to_container_config_basic() {
        let topology = topology();
        let (config, options) = instance_to_container_config(&topology, &topology.instances["db"]);

        assert_eq!(options.name, "inventory-db");
        assert_eq!(config.image, Some("postgres:16".to_string()));
        assert_eq!(
            config.env,
            Some(vec!["POSTGRES_PASSWORD=changeme".to_string()])
        );

        let labels = config.labels.unwrap();
        assert_eq!(labels["dockyard.project"], "inventory");
        assert_eq!(labels["dockyard.service"], "db");
    }

    #[test]
    fn test_internal_port_is_exposed_but_not_published() {
        let topology = topology();
        let (config, _) = instance_to_container_config(&topology, &topology.instances["db"]);

        assert!(config.exposed_ports.unwrap().contains_key("5432/tcp"));
        let host_config = config.host_config.unwrap();
        assert!(host_config.port_bindings.unwrap().is_empty());
    }

    #[test]
    fn test_published_port_binding() {
        let topology = topology();
        let (config, _) = instance_to_container_config(&topology, &topology.instances["api"]);

        let bindings = config.host_config.unwrap().port_bindings.unwrap();
        let binding = bindings["8080/tcp"].as_ref().unwrap();
        assert_eq!(binding[0].host_port, Some("8080".to_string()));
        assert_eq!(binding[0].host_ip, Some("0.0.0.0".to_string()));
    }

    #[test]
    fn test_named_volume_bind_uses_project_prefix() {
        let topology = topology();
        let (config, _) = instance_to_container_config(&topology, &topology.instances["db"]);

        assert_eq!(
            config.host_config.unwrap().binds,
            Some(vec![
                "inventory_pgdata:/var/lib/postgresql/data:rw".to_string()
            ])
        );
    }

    #[test]
    fn test_network_alias_is_service_name() {
        let topology = topology();
        let (config, _) = instance_to_container_config(&topology, &topology.instances["db"]);

        assert_eq!(
            config.host_config.unwrap().network_mode,
            Some("inventory".to_string())
        );
        let endpoints = config.networking_config.unwrap().endpoints_config;
        assert_eq!(
            endpoints["inventory"].aliases,
            Some(vec!["db".to_string()])
        );
    }

    #[test]
    fn test_hardening_is_applied() {
        let topology = topology();
        let (config, _) = instance_to_container_config(&topology, &topology.instances["api"]);

        assert_eq!(config.user, Some("inventory".to_string()));
        assert_eq!(
            config.cmd,
            Some(vec!["/app/inventory-api".to_string(), "--serve".to_string()])
        );

        let host_config = config.host_config.unwrap();
        assert_eq!(
            host_config.cap_drop,
            Some(vec!["NET_RAW".to_string(), "SYS_ADMIN".to_string()])
        );
        assert_eq!(host_config.readonly_rootfs, Some(true));
        assert_eq!(
            host_config.security_opt,
            Some(vec!["no-new-privileges:true".to_string()])
        );
        assert!(host_config.tmpfs.unwrap().contains_key("/tmp"));
    }

    #[test]
    fn test_baseline_has_no_restrictions() {
        let topology = topology();
        let (config, _) = instance_to_container_config(&topology, &topology.instances["db"]);

        let host_config = config.host_config.unwrap();
        assert_eq!(host_config.cap_drop, None);
        assert_eq!(host_config.readonly_rootfs, None);
        assert_eq!(host_config.security_opt, None);
        assert_eq!(
            host_config.restart_policy.unwrap().name,
            Some(RestartPolicyNameEnum::UNLESS_STOPPED)
        );
    }

    #[test]
    fn test_overlay_profile_reaches_container_config() {
        let stack = parse_stack_string(STACK, "inventory".to_string()).unwrap();
        let base = Topology::assemble(&stack, None, &EnvMap::new()).unwrap();
        let hardened = hardening::apply_named(&base, &stack, &["hardened"]).unwrap();

        let (config, _) = instance_to_container_config(&hardened, &hardened.instances["db"]);
        let host_config = config.host_config.unwrap();
        assert_eq!(host_config.readonly_rootfs, Some(true));
        // プロファイルの上書きでも既存の再起動ポリシーは弱まらない
        assert_eq!(
            host_config.restart_policy.unwrap().name,
            Some(RestartPolicyNameEnum::UNLESS_STOPPED)
        );
    }

    #[test]
    fn test_healthcheck_conversion() {
        let topology = topology();
        let (config, _) = instance_to_container_config(&topology, &topology.instances["db"]);

        let health = config.healthcheck.unwrap();
        assert_eq!(
            health.test,
            Some(vec![
                "CMD-SHELL".to_string(),
                "pg_isready -U inventory".to_string()
            ])
        );
        assert_eq!(health.interval, Some(5 * NANOS_PER_SEC));
        assert_eq!(health.timeout, Some(3 * NANOS_PER_SEC));
    }

    #[test]
    fn test_healthcheck_out_of_range_durations_are_dropped() {
        let check = HealthCheck {
            test: vec!["CMD".to_string(), "true".to_string()],
            interval: u64::MAX,
            timeout: 10_000_000_000,
            retries: u64::MAX,
            start_period: 10,
        };

        let health = to_health_config(&check);

        assert_eq!(health.interval, None);
        assert_eq!(health.timeout, None);
        assert_eq!(health.retries, None);
        assert_eq!(health.start_period, Some(10 * NANOS_PER_SEC));
    }
}
