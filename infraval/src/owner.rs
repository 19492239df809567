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

use std::env;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::Resource;
use kube::api::Api;
use kube::Client;

use common::apis::OwnerContext;
use common::{trace::TraceFn, trace_fn, InfravalError};

/// The name of the Pod running the current process, set by the pipeline controller.
pub const OWNER_POD_NAME_ENV: &str = "KFP_POD_NAME";
pub const OWNER_NAMESPACE_ENV: &str = "KFP_NAMESPACE";

#[async_trait]
pub trait OwnerProvider: Send + Sync + 'static {
    async fn owner(&self) -> Result<OwnerContext, InfravalError>;
}

/// Resolves the owner as the Pod this process runs in.
pub struct KubeOwnerProvider {
    client: Client,
}

impl KubeOwnerProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OwnerProvider for KubeOwnerProvider {
    async fn owner(&self) -> Result<OwnerContext, InfravalError> {
        trace_fn!("KubeOwnerProvider::owner");

        let (name, namespace) = owner_identity(|key| env::var(key).ok())?;

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        let pod = pods.get(&name).await?;

        let owner = owner_from_pod(&pod)?;
        tracing::debug!("Resolved owner of model server: {owner}");

        Ok(owner)
    }
}

/// Reads the owner Pod's name and namespace through `lookup`.
pub fn owner_identity<F>(lookup: F) -> Result<(String, String), InfravalError>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| {
        lookup(key)
            .filter(|v| !v.is_empty())
            .ok_or(InfravalError::OwnerUnavailable(format!(
                "environment variable <{key}> is not set"
            )))
    };

    Ok((read(OWNER_POD_NAME_ENV)?, read(OWNER_NAMESPACE_ENV)?))
}

pub fn owner_from_pod(pod: &Pod) -> Result<OwnerContext, InfravalError> {
    let missing =
        |field: &str| InfravalError::OwnerUnavailable(format!("owner pod has no {field}"));

    Ok(OwnerContext {
        api_version: Pod::API_VERSION.to_string(),
        kind: Pod::KIND.to_string(),
        name: pod.metadata.name.clone().ok_or_else(|| missing("name"))?,
        uid: pod.metadata.uid.clone().ok_or_else(|| missing("uid"))?,
        namespace: pod
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| missing("namespace"))?,
        service_account_name: pod
            .spec
            .as_ref()
            .and_then(|s| s.service_account_name.clone()),
    })
}
