/*
Copyright 2025 The Flame Authors.
Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at
    http://www.apache.org/licenses/LICENSE-2.0
Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, Pod, PodSpec, ResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use common::apis::{OwnerContext, ResourceLimits, WorkloadSpec};
use common::InfravalError;

pub const APP_KEY: &str = "app";
pub const MODEL_SERVER_POD_NAME_PREFIX: &str = "infraval-modelserver-";
pub const MODEL_SERVER_APP_LABEL: &str = "infraval-modelserver";
pub const MODEL_SERVER_CONTAINER_NAME: &str = "model-server";
pub const MODEL_SERVER_PORT_NAME: &str = "serving";
pub const DEFAULT_ACTIVE_DEADLINE_SECS: i64 = 24 * 60 * 60;

const RESTART_POLICY_NEVER: &str = "Never";

/// Returns the labels attached to every model server Pod.
pub fn model_server_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(APP_KEY.to_string(), MODEL_SERVER_APP_LABEL.to_string())])
}

/// Builds the model server Pod owned by `owner`.
///
/// The Pod never restarts in place and lives at most `activeDeadlineSeconds`,
/// 24 hours when unset or zero.
pub fn build_pod_manifest(spec: &WorkloadSpec, owner: &OwnerContext) -> Result<Pod, InfravalError> {
    let active_deadline_seconds = match spec.active_deadline_seconds {
        None | Some(0) => DEFAULT_ACTIVE_DEADLINE_SECS,
        Some(secs) if secs < 0 => {
            return Err(InfravalError::InvalidConfig(format!(
                "active_deadline_seconds should be > 0. Got {secs}"
            )));
        }
        Some(secs) => secs,
    };

    let service_account_name = spec
        .service_account_name
        .clone()
        .or(owner.service_account_name.clone());

    let env = spec
        .envs
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..EnvVar::default()
        })
        .collect::<Vec<_>>();

    let container = Container {
        name: MODEL_SERVER_CONTAINER_NAME.to_string(),
        image: Some(spec.image.clone()),
        env: Some(env),
        ports: Some(vec![ContainerPort {
            name: Some(MODEL_SERVER_PORT_NAME.to_string()),
            container_port: i32::from(spec.container_port),
            ..ContainerPort::default()
        }]),
        resources: resource_requirements(&spec.resources),
        ..Container::default()
    };

    Ok(Pod {
        metadata: ObjectMeta {
            generate_name: Some(MODEL_SERVER_POD_NAME_PREFIX.to_string()),
            labels: Some(model_server_labels()),
            owner_references: Some(vec![OwnerReference {
                api_version: owner.api_version.clone(),
                kind: owner.kind.clone(),
                name: owner.name.clone(),
                uid: owner.uid.clone(),
                ..OwnerReference::default()
            }]),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: vec![container],
            service_account_name,
            restart_policy: Some(RESTART_POLICY_NEVER.to_string()),
            active_deadline_seconds: Some(active_deadline_seconds),
            ..PodSpec::default()
        }),
        ..Pod::default()
    })
}

fn resource_requirements(limits: &ResourceLimits) -> Option<ResourceRequirements> {
    if limits.is_empty() {
        return None;
    }

    let mut quantities = BTreeMap::new();
    if let Some(cpu) = &limits.cpu {
        quantities.insert("cpu".to_string(), Quantity(cpu.clone()));
    }
    if let Some(memory) = &limits.memory {
        quantities.insert("memory".to_string(), Quantity(memory.clone()));
    }

    Some(ResourceRequirements {
        limits: Some(quantities),
        ..ResourceRequirements::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> OwnerContext {
        OwnerContext {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            name: "pipeline-infra-validator-1234".to_string(),
            uid: "0b6e3f5a".to_string(),
            namespace: "kubeflow".to_string(),
            service_account_name: Some("pipeline-runner".to_string()),
        }
    }

    fn spec() -> WorkloadSpec {
        WorkloadSpec {
            image: "tensorflow/serving:latest".to_string(),
            envs: BTreeMap::from([
                ("MODEL_NAME".to_string(), "chicago-taxi".to_string()),
                ("MODEL_BASE_PATH".to_string(), "/models".to_string()),
            ]),
            container_port: 8500,
            service_account_name: None,
            active_deadline_seconds: None,
            resources: ResourceLimits::default(),
        }
    }

    fn pod_spec(pod: &Pod) -> &PodSpec {
        pod.spec.as_ref().unwrap()
    }

    #[test]
    fn test_build_pod_manifest() -> Result<(), InfravalError> {
        let pod = build_pod_manifest(&spec(), &owner())?;

        assert_eq!(
            pod.metadata.generate_name,
            Some("infraval-modelserver-".to_string())
        );
        assert_eq!(pod.metadata.name, None);
        assert_eq!(pod.metadata.labels, Some(model_server_labels()));

        let refs = pod.metadata.owner_references.clone().unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].api_version, "v1");
        assert_eq!(refs[0].kind, "Pod");
        assert_eq!(refs[0].name, "pipeline-infra-validator-1234");
        assert_eq!(refs[0].uid, "0b6e3f5a");

        let spec = pod_spec(&pod);
        assert_eq!(spec.restart_policy, Some("Never".to_string()));
        assert_eq!(spec.active_deadline_seconds, Some(86400));
        assert_eq!(
            spec.service_account_name,
            Some("pipeline-runner".to_string())
        );

        assert_eq!(spec.containers.len(), 1);
        let container = &spec.containers[0];
        assert_eq!(container.name, "model-server");
        assert_eq!(
            container.image,
            Some("tensorflow/serving:latest".to_string())
        );
        assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 8500);
        assert!(container.resources.is_none());

        let env = container.env.clone().unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env[0].name, "MODEL_BASE_PATH");
        assert_eq!(env[0].value, Some("/models".to_string()));
        assert_eq!(env[1].name, "MODEL_NAME");
        assert_eq!(env[1].value, Some("chicago-taxi".to_string()));

        Ok(())
    }

    #[test]
    fn test_build_pod_manifest_is_deterministic() -> Result<(), InfravalError> {
        assert_eq!(
            build_pod_manifest(&spec(), &owner())?,
            build_pod_manifest(&spec(), &owner())?
        );

        Ok(())
    }

    #[test]
    fn test_active_deadline() -> Result<(), InfravalError> {
        let mut workload = spec();

        workload.active_deadline_seconds = Some(600);
        let pod = build_pod_manifest(&workload, &owner())?;
        assert_eq!(pod_spec(&pod).active_deadline_seconds, Some(600));

        workload.active_deadline_seconds = Some(0);
        let pod = build_pod_manifest(&workload, &owner())?;
        assert_eq!(pod_spec(&pod).active_deadline_seconds, Some(86400));

        workload.active_deadline_seconds = Some(-1);
        let err = build_pod_manifest(&workload, &owner());
        assert!(matches!(err, Err(InfravalError::InvalidConfig(_))));

        Ok(())
    }

    #[test]
    fn test_service_account_override() -> Result<(), InfravalError> {
        let mut workload = spec();
        workload.service_account_name = Some("model-server".to_string());
        let pod = build_pod_manifest(&workload, &owner())?;
        assert_eq!(
            pod_spec(&pod).service_account_name,
            Some("model-server".to_string())
        );

        let mut owner = owner();
        owner.service_account_name = None;
        let pod = build_pod_manifest(&spec(), &owner)?;
        assert_eq!(pod_spec(&pod).service_account_name, None);

        Ok(())
    }

    #[test]
    fn test_resource_limits() -> Result<(), InfravalError> {
        let mut workload = spec();
        workload.resources = ResourceLimits {
            cpu: Some("500m".to_string()),
            memory: Some("2Gi".to_string()),
        };

        let pod = build_pod_manifest(&workload, &owner())?;
        let resources = pod_spec(&pod).containers[0].resources.clone().unwrap();
        let limits = resources.limits.unwrap();
        assert_eq!(limits.get("cpu"), Some(&Quantity("500m".to_string())));
        assert_eq!(limits.get("memory"), Some(&Quantity("2Gi".to_string())));
        assert!(resources.requests.is_none());

        Ok(())
    }
}
