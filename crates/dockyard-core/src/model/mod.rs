//! モデル定義
//!
//! Dockyardで使用されるデータモデルを定義します。

pub(crate) mod build;
mod hardening;
mod port;
pub(crate) mod service;
mod stack;
mod volume;

pub use build::*;
pub use hardening::*;
pub use port::*;
pub use service::*;
pub use stack::*;
pub use volume::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackError;
    use std::path::PathBuf;

    fn service(image: &str, depends_on: &[&str]) -> Service {
        Service {
            image: Some(image.to_string()),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_startup_order_puts_dependencies_first() {
        let mut stack = Stack {
            name: "inventory".to_string(),
            network: "inventory".to_string(),
            ..Default::default()
        };
        stack
            .services
            .insert("api".to_string(), service("inventory-api:1.0", &["db"]));
        stack
            .services
            .insert("db".to_string(), service("postgres:16", &[]));

        let order = stack.startup_order().unwrap();
        assert_eq!(order, vec!["db".to_string(), "api".to_string()]);
    }

    #[test]
    fn test_startup_order_detects_cycle() {
        let mut stack = Stack::default();
        stack.services.insert("a".to_string(), service("a", &["b"]));
        stack.services.insert("b".to_string(), service("b", &["a"]));

        let err = stack.startup_order().unwrap_err();
        assert!(matches!(err, StackError::CircularDependency(_)));
    }

    #[test]
    fn test_validate_rejects_undeclared_volume() {
        let mut stack = Stack::default();
        let mut db = service("postgres:16", &[]);
        db.volumes.push(VolumeMount {
            volume: "db-data".to_string(),
            target: PathBuf::from("/var/lib/postgresql/data"),
            read_only: false,
        });
        stack.services.insert("db".to_string(), db);

        let err = stack.validate().unwrap_err();
        assert!(matches!(err, StackError::VolumeNotDeclared { .. }));

        stack.volumes.insert("db-data".to_string());
        assert!(stack.validate().is_ok());
    }

    #[test]
    fn test_image_for_falls_back_to_built_image() {
        let mut stack = Stack::default();
        stack.services.insert("api".to_string(), Service::default());
        assert!(matches!(
            stack.image_for("api"),
            Err(StackError::MissingImage(_))
        ));

        stack.build = Some(BuildSpec {
            image: "inventory-api".to_string(),
            tag: "1.2.0".to_string(),
            aliases: vec!["latest".to_string()],
            stages: vec![],
            runtime: RuntimeSpec::default(),
        });
        assert_eq!(stack.image_for("api").unwrap(), "inventory-api:1.2.0");
    }

    #[test]
    fn test_all_references_include_aliases_once() {
        let build = BuildSpec {
            image: "inventory-api".to_string(),
            tag: "latest".to_string(),
            aliases: vec!["latest".to_string(), "stable".to_string()],
            stages: vec![],
            runtime: RuntimeSpec::default(),
        };
        assert_eq!(
            build.all_references(),
            vec![
                "inventory-api:latest".to_string(),
                "inventory-api:stable".to_string()
            ]
        );
    }

    #[test]
    fn test_manifest_stage_must_precede_source_stage() {
        let source = StageSpec {
            name: "package".to_string(),
            inputs: vec![PathBuf::from(".")],
            run: "make".to_string(),
            ..Default::default()
        };
        let manifest = StageSpec {
            name: "dependencies".to_string(),
            inputs: vec![PathBuf::from("Cargo.toml")],
            run: "cargo fetch".to_string(),
            manifest: true,
            ..Default::default()
        };

        let mut build = BuildSpec {
            image: "app".to_string(),
            tag: "latest".to_string(),
            aliases: vec![],
            stages: vec![source.clone(), manifest.clone()],
            runtime: RuntimeSpec::default(),
        };
        assert!(matches!(
            build.validate_stage_order(),
            Err(StackError::ManifestAfterSource { .. })
        ));

        build.stages = vec![manifest, source];
        assert!(build.validate_stage_order().is_ok());
    }

    #[test]
    fn test_manifest_stage_after_any_source_input_is_rejected() {
        let package = StageSpec {
            name: "package".to_string(),
            inputs: vec![PathBuf::from("src")],
            run: "cargo build --release".to_string(),
            ..Default::default()
        };
        let dependencies = StageSpec {
            name: "dependencies".to_string(),
            inputs: vec![PathBuf::from("Cargo.toml")],
            run: "cargo fetch".to_string(),
            manifest: true,
            ..Default::default()
        };

        match check_stage_order(&[package, dependencies]) {
            Err(StackError::ManifestAfterSource {
                manifest,
                source_stage,
            }) => {
                assert_eq!(manifest, "dependencies");
                assert_eq!(source_stage, "package");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_manifest_stage_after_input_less_stage_is_allowed() {
        let prepare = StageSpec {
            name: "prepare".to_string(),
            run: "mkdir -p vendor".to_string(),
            ..Default::default()
        };
        let dependencies = StageSpec {
            name: "dependencies".to_string(),
            inputs: vec![PathBuf::from("Cargo.toml")],
            run: "cargo fetch".to_string(),
            manifest: true,
            ..Default::default()
        };
        assert!(check_stage_order(&[prepare, dependencies]).is_ok());
    }

    #[test]
    fn test_restart_policy_parse_and_strength() {
        assert_eq!(RestartPolicy::parse("never"), Some(RestartPolicy::No));
        assert_eq!(
            RestartPolicy::parse("on_failure"),
            Some(RestartPolicy::OnFailure)
        );
        assert_eq!(RestartPolicy::parse("sometimes"), None);
        assert_eq!(
            RestartPolicy::OnFailure.stronger(RestartPolicy::No),
            RestartPolicy::OnFailure
        );
        assert_eq!(
            RestartPolicy::OnFailure.stronger(RestartPolicy::Always),
            RestartPolicy::Always
        );
    }

    #[test]
    fn test_wait_config_delay_is_capped() {
        let config = WaitConfig::default();
        assert_eq!(config.delay_for_attempt(0), 500);
        assert_eq!(config.delay_for_attempt(1), 1000);
        assert_eq!(config.delay_for_attempt(3), 4000);
        assert_eq!(config.delay_for_attempt(4), 5000);
        assert_eq!(config.delay_for_attempt(9), 5000);
        // 最後の試行の後は待たない
        assert_eq!(config.total_budget_ms(), 32_500);
    }

    #[test]
    fn test_service_merge_overrides_per_key() {
        let mut base = Service {
            image: Some("postgres:15".to_string()),
            ..Default::default()
        };
        base.environment
            .insert("POSTGRES_USER".to_string(), "app".to_string());
        base.environment
            .insert("POSTGRES_DB".to_string(), "inventory".to_string());

        let mut other = Service {
            image: Some("postgres:16".to_string()),
            ..Default::default()
        };
        other
            .environment
            .insert("POSTGRES_DB".to_string(), "inventory_dev".to_string());

        base.merge(other);
        assert_eq!(base.image.as_deref(), Some("postgres:16"));
        assert_eq!(base.environment["POSTGRES_USER"], "app");
        assert_eq!(base.environment["POSTGRES_DB"], "inventory_dev");
    }
}
