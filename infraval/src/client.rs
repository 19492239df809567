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

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

use common::apis::{Instance, InstancePhase, InstanceStatus};
use common::{trace::TraceFn, trace_fn, InfravalError};

pub type OrchestratorClientPtr = Arc<dyn OrchestratorClient>;

/// The subset of the orchestrator API the runner depends on. `delete_instance`
/// reports a missing instance as `InfravalError::NotFound`.
#[async_trait]
pub trait OrchestratorClient: Send + Sync + 'static {
    async fn create_instance(
        &self,
        namespace: &str,
        manifest: &Pod,
    ) -> Result<Instance, InfravalError>;

    async fn get_instance(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<InstanceStatus, InfravalError>;

    async fn delete_instance(&self, name: &str, namespace: &str) -> Result<(), InfravalError>;
}

pub struct KubeOrchestrator {
    client: Client,
}

impl KubeOrchestrator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects with the in-cluster config, or the local kubeconfig.
    pub async fn try_default() -> Result<Self, InfravalError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    pub fn new_ptr(client: Client) -> OrchestratorClientPtr {
        Arc::new(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl OrchestratorClient for KubeOrchestrator {
    async fn create_instance(
        &self,
        namespace: &str,
        manifest: &Pod,
    ) -> Result<Instance, InfravalError> {
        trace_fn!("KubeOrchestrator::create_instance");

        let pod = self
            .pods(namespace)
            .create(&PostParams::default(), manifest)
            .await?;

        instance_of(&pod, namespace)
    }

    async fn get_instance(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<InstanceStatus, InfravalError> {
        let pod = self.pods(namespace).get(name).await?;

        Ok(status_of(&pod))
    }

    async fn delete_instance(&self, name: &str, namespace: &str) -> Result<(), InfravalError> {
        trace_fn!("KubeOrchestrator::delete_instance");

        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await?;

        Ok(())
    }
}

pub fn instance_of(pod: &Pod, namespace: &str) -> Result<Instance, InfravalError> {
    let name = pod.metadata.name.clone().ok_or(InfravalError::Internal(
        "orchestrator did not assign a name to the instance".to_string(),
    ))?;

    Ok(Instance {
        name,
        namespace: pod
            .metadata
            .namespace
            .clone()
            .unwrap_or(namespace.to_string()),
        uid: pod.metadata.uid.clone(),
    })
}

pub fn status_of(pod: &Pod) -> InstanceStatus {
    let status = pod.status.as_ref();

    InstanceStatus {
        phase: InstancePhase::from(status.and_then(|s| s.phase.as_deref())),
        address: status
            .and_then(|s| s.pod_ip.clone())
            .filter(|ip| !ip.is_empty()),
    }
}
