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

use common::apis::{ResourceLimits, WorkloadSpec};
use common::ctx::{KubernetesConfig, ServingConfig};
use common::InfravalError;

pub const TENSORFLOW_SERVING_KIND: &str = "tensorflow_serving";

const TENSORFLOW_SERVING_IMAGE: &str = "tensorflow/serving";
const TENSORFLOW_SERVING_GRPC_PORT: u16 = 8500;
const TENSORFLOW_SERVING_REST_PORT: u16 = 8501;
const MODEL_NAME_ENV: &str = "MODEL_NAME";
const MODEL_BASE_PATH_ENV: &str = "MODEL_BASE_PATH";

/// A family of serving binaries: where to pull it from, which port it
/// serves on, and the environment that points it at a model.
pub trait EnvironmentProvider: Send + Sync {
    fn image(&self) -> String;
    fn container_port(&self) -> u16;
    fn build_env(&self, model_path: &str) -> Result<BTreeMap<String, String>, InfravalError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServingBinary {
    TensorFlowServing(TensorFlowServing),
}

impl TryFrom<&ServingConfig> for ServingBinary {
    type Error = InfravalError;

    fn try_from(config: &ServingConfig) -> Result<Self, Self::Error> {
        match config.kind.as_str() {
            TENSORFLOW_SERVING_KIND => Ok(ServingBinary::TensorFlowServing(
                TensorFlowServing::new(&config.model_name, &config.tag),
            )),
            kind => Err(InfravalError::NotImplemented(format!(
                "serving binary <{kind}>"
            ))),
        }
    }
}

impl EnvironmentProvider for ServingBinary {
    fn image(&self) -> String {
        match self {
            ServingBinary::TensorFlowServing(tfs) => tfs.image(),
        }
    }

    fn container_port(&self) -> u16 {
        match self {
            ServingBinary::TensorFlowServing(tfs) => tfs.container_port(),
        }
    }

    fn build_env(&self, model_path: &str) -> Result<BTreeMap<String, String>, InfravalError> {
        match self {
            ServingBinary::TensorFlowServing(tfs) => tfs.build_env(model_path),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorFlowServing {
    pub model_name: String,
    pub tag: String,
}

impl TensorFlowServing {
    pub fn new(model_name: &str, tag: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            tag: tag.to_string(),
        }
    }

    pub fn rest_port(&self) -> u16 {
        TENSORFLOW_SERVING_REST_PORT
    }
}

impl EnvironmentProvider for TensorFlowServing {
    fn image(&self) -> String {
        format!("{TENSORFLOW_SERVING_IMAGE}:{}", self.tag)
    }

    fn container_port(&self) -> u16 {
        TENSORFLOW_SERVING_GRPC_PORT
    }

    fn build_env(&self, model_path: &str) -> Result<BTreeMap<String, String>, InfravalError> {
        let path = ModelPath::parse(model_path)?;
        if path.model_name != self.model_name {
            return Err(InfravalError::InvalidConfig(format!(
                "model path <{model_path}> does not belong to model <{}>",
                self.model_name
            )));
        }

        Ok(BTreeMap::from([
            (MODEL_NAME_ENV.to_string(), path.model_name),
            (MODEL_BASE_PATH_ENV.to_string(), path.base_path),
        ]))
    }
}

/// A model path laid out as `<base_path>/<model_name>/<version>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelPath {
    pub base_path: String,
    pub model_name: String,
    pub version: u64,
}

impl ModelPath {
    pub fn parse(path: &str) -> Result<Self, InfravalError> {
        let invalid = || {
            InfravalError::InvalidConfig(format!(
                "<{path}> is not a <base_path>/<model_name>/<version> model path"
            ))
        };

        let mut parts = path.trim_end_matches('/').rsplitn(3, '/');
        let version = parts.next().ok_or_else(invalid)?;
        let model_name = parts.next().ok_or_else(invalid)?;
        let base_path = parts.next().ok_or_else(invalid)?;

        if model_name.is_empty() || base_path.is_empty() {
            return Err(invalid());
        }
        let version = version.parse::<u64>().map_err(|_| invalid())?;

        Ok(Self {
            base_path: base_path.to_string(),
            model_name: model_name.to_string(),
            version,
        })
    }
}

/// Assembles the workload of one serving binary loading `model_path`.
pub fn build_workload_spec(
    binary: &dyn EnvironmentProvider,
    model_path: &str,
    k8s: &KubernetesConfig,
    resources: ResourceLimits,
) -> Result<WorkloadSpec, InfravalError> {
    Ok(WorkloadSpec {
        image: binary.image(),
        envs: binary.build_env(model_path)?,
        container_port: binary.container_port(),
        service_account_name: k8s.service_account_name.clone(),
        active_deadline_seconds: k8s.active_deadline_seconds,
        resources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tfs_config(kind: &str) -> ServingConfig {
        ServingConfig {
            kind: kind.to_string(),
            model_name: "chicago-taxi".to_string(),
            tag: "2.15.0".to_string(),
        }
    }

    #[test]
    fn test_model_path_parse() -> Result<(), InfravalError> {
        let path = ModelPath::parse("gs://bucket/pipeline/serving/chicago-taxi/1712345678")?;
        assert_eq!(path.base_path, "gs://bucket/pipeline/serving");
        assert_eq!(path.model_name, "chicago-taxi");
        assert_eq!(path.version, 1712345678);

        let path = ModelPath::parse("/models/chicago-taxi/3/")?;
        assert_eq!(path.base_path, "/models");
        assert_eq!(path.version, 3);

        Ok(())
    }

    #[test]
    fn test_model_path_parse_invalid() {
        for path in ["", "chicago-taxi/3", "/chicago-taxi/3", "/models/chicago-taxi/latest"] {
            assert!(
                matches!(ModelPath::parse(path), Err(InfravalError::InvalidConfig(_))),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_tensorflow_serving_env() -> Result<(), InfravalError> {
        let binary = ServingBinary::try_from(&tfs_config(TENSORFLOW_SERVING_KIND))?;

        assert_eq!(binary.image(), "tensorflow/serving:2.15.0");
        assert_eq!(binary.container_port(), 8500);

        let envs = binary.build_env("/models/chicago-taxi/7")?;
        assert_eq!(envs.len(), 2);
        assert_eq!(envs.get("MODEL_NAME"), Some(&"chicago-taxi".to_string()));
        assert_eq!(envs.get("MODEL_BASE_PATH"), Some(&"/models".to_string()));

        let err = binary.build_env("/models/other-model/7");
        assert!(matches!(err, Err(InfravalError::InvalidConfig(_))));

        Ok(())
    }

    #[test]
    fn test_unsupported_serving_binary() {
        let err = ServingBinary::try_from(&tfs_config("torchserve"));
        assert!(matches!(err, Err(InfravalError::NotImplemented(ref s)) if s.contains("torchserve")));
    }

    #[test]
    fn test_build_workload_spec() -> Result<(), InfravalError> {
        let binary = TensorFlowServing::new("chicago-taxi", "latest");
        let k8s = KubernetesConfig {
            service_account_name: Some("model-server".to_string()),
            active_deadline_seconds: Some(600),
        };
        let resources = ResourceLimits {
            cpu: Some("2".to_string()),
            memory: None,
        };

        let spec = build_workload_spec(&binary, "/models/chicago-taxi/1", &k8s, resources.clone())?;
        assert_eq!(spec.image, "tensorflow/serving:latest");
        assert_eq!(spec.container_port, 8500);
        assert_eq!(spec.envs.len(), 2);
        assert_eq!(spec.service_account_name, Some("model-server".to_string()));
        assert_eq!(spec.active_deadline_seconds, Some(600));
        assert_eq!(spec.resources, resources);

        Ok(())
    }
}
