//! スタック定義

use super::build::BuildSpec;
use super::hardening::HardeningProfile;
use super::service::Service;
use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// スタック全体の定義（dockyard.kdl の内容）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stack {
    /// プロジェクト名
    pub name: String,
    /// サービス同士が論理名で解決し合う仮想ネットワーク名
    pub network: String,
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
    /// 宣言された名前付きボリューム
    #[serde(default)]
    pub volumes: BTreeSet<String>,
    #[serde(default)]
    pub profiles: HashMap<String, HardeningProfile>,
    #[serde(default)]
    pub build: Option<BuildSpec>,
}

impl Stack {
    pub fn service(&self, name: &str) -> Result<&Service> {
        self.services
            .get(name)
            .ok_or_else(|| StackError::ServiceNotFound(name.to_string()))
    }

    pub fn profile(&self, name: &str) -> Result<&HardeningProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| StackError::ProfileNotFound(name.to_string()))
    }

    /// 依存関係を満たす起動順（依存先が先）
    pub fn startup_order(&self) -> Result<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            stack: &Stack,
            name: &str,
            marks: &mut HashMap<String, Mark>,
            path: &mut Vec<String>,
            order: &mut Vec<String>,
        ) -> Result<()> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    path.push(name.to_string());
                    return Err(StackError::CircularDependency(path.join(" -> ")));
                }
                None => {}
            }

            let service = stack.service(name)?;
            marks.insert(name.to_string(), Mark::Visiting);
            path.push(name.to_string());
            for dependency in &service.depends_on {
                visit(stack, dependency, marks, path, order)?;
            }
            path.pop();
            marks.insert(name.to_string(), Mark::Done);
            order.push(name.to_string());
            Ok(())
        }

        let mut marks = HashMap::new();
        let mut order = Vec::with_capacity(self.services.len());
        for name in self.services.keys() {
            let mut path = Vec::new();
            visit(self, name, &mut marks, &mut path, &mut order)?;
        }
        Ok(order)
    }

    /// 参照整合性の検証
    pub fn validate(&self) -> Result<()> {
        for (name, service) in &self.services {
            if service.image.is_none() && self.build.is_none() {
                return Err(StackError::MissingImage(name.clone()));
            }
            for dependency in &service.depends_on {
                self.service(dependency)?;
            }
            for mount in &service.volumes {
                if !self.volumes.contains(&mount.volume) {
                    return Err(StackError::VolumeNotDeclared {
                        service: name.clone(),
                        volume: mount.volume.clone(),
                    });
                }
            }
            for profile in &service.profiles {
                self.profile(profile)?;
            }
            if let Some(link) = &service.database {
                self.service(&link.service)?;
            }
        }

        if let Some(build) = &self.build {
            build.validate_stage_order()?;
        }

        self.startup_order()?;
        Ok(())
    }

    /// サービスのイメージ参照
    ///
    /// image 未指定のサービスは build で組み立てたイメージを使う。
    pub fn image_for(&self, service_name: &str) -> Result<String> {
        let service = self.service(service_name)?;
        match (&service.image, &self.build) {
            (Some(image), _) => Ok(image.clone()),
            (None, Some(build)) => Ok(build.image_reference()),
            (None, None) => Err(StackError::MissingImage(service_name.to_string())),
        }
    }
}
