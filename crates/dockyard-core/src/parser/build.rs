//! build ノードのパース

use super::{first_bool, first_string, positional_strings, prop_bool, prop_integer, prop_string, to_port};
use crate::error::{Result, StackError};
use crate::model::{BuildSpec, RuntimeSpec, StageSpec};
use crate::model::build::default_tag;
use kdl::KdlNode;
use std::path::PathBuf;

/// build ノードをパース
pub fn parse_build(node: &KdlNode) -> Result<BuildSpec> {
    let mut image: Option<String> = None;
    let mut tag = default_tag();
    let mut aliases = Vec::new();
    let mut stages = Vec::new();
    let mut runtime: Option<RuntimeSpec> = None;

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "image" => image = first_string(child),
                "tag" => {
                    if let Some(value) = first_string(child) {
                        tag = value;
                    }
                }
                "alias" => aliases.extend(positional_strings(child)),
                "stage" => stages.push(parse_stage(child)?),
                "runtime" => runtime = Some(parse_runtime(child)?),
                _ => {}
            }
        }
    }

    let image =
        image.ok_or_else(|| StackError::InvalidConfig("build requires an image".to_string()))?;
    let runtime = runtime
        .ok_or_else(|| StackError::InvalidConfig("build requires a runtime block".to_string()))?;
    if runtime.artifact.as_os_str().is_empty() {
        return Err(StackError::InvalidConfig(
            "build runtime requires an artifact".to_string(),
        ));
    }

    let mut names = std::collections::HashSet::new();
    for stage in &stages {
        if !names.insert(stage.name.as_str()) {
            return Err(StackError::InvalidConfig(format!(
                "build stage '{}' is defined more than once",
                stage.name
            )));
        }
    }

    Ok(BuildSpec {
        image,
        tag,
        aliases,
        stages,
        runtime,
    })
}

fn parse_stage(node: &KdlNode) -> Result<StageSpec> {
    let name = first_string(node)
        .ok_or_else(|| StackError::InvalidConfig("stage requires a name".to_string()))?;

    let mut stage = StageSpec {
        name,
        inputs: Vec::new(),
        run: String::new(),
        outputs: Vec::new(),
        manifest: prop_bool(node, "manifest").unwrap_or(false),
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "inputs" | "input" => stage
                    .inputs
                    .extend(positional_strings(child).into_iter().map(PathBuf::from)),
                "run" => stage.run = first_string(child).unwrap_or_default(),
                "output" | "outputs" => stage
                    .outputs
                    .extend(positional_strings(child).into_iter().map(PathBuf::from)),
                "manifest" => stage.manifest = first_bool(child),
                _ => {}
            }
        }
    }

    if stage.run.trim().is_empty() {
        return Err(StackError::InvalidConfig(format!(
            "stage '{}' requires a run command",
            stage.name
        )));
    }

    Ok(stage)
}

fn parse_runtime(node: &KdlNode) -> Result<RuntimeSpec> {
    let mut runtime = RuntimeSpec::default();

    if let Some(base) = prop_string(node, "base") {
        runtime.base = base;
    }
    if let Some(user) = prop_string(node, "user") {
        runtime.user = user;
    }
    if let Some(port) = prop_integer(node, "port") {
        runtime.port = to_port(port, "runtime port")?;
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "artifact" => {
                    if let Some(path) = first_string(child) {
                        runtime.artifact = PathBuf::from(path);
                    }
                }
                "entrypoint" => runtime.entrypoint = positional_strings(child),
                _ => {}
            }
        }
    }

    if crate::model::is_root_user(&runtime.user) {
        return Err(StackError::InvalidConfig(
            "runtime user must be a non-root account".to_string(),
        ));
    }

    Ok(runtime)
}
