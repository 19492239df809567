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

use std::fmt::{Display, Formatter};
use std::time::Duration;

use chrono::{DateTime, Utc};

use common::apis::{
    InstancePhase, InstanceStatus, OwnerContext, ResourceLimits, RunnerState, WorkloadSpec,
};
use common::ctx::{BackoffConfig, InfravalContext, RunnerConfig};
use common::{trace::TraceFn, trace_fn, InfravalError};

use crate::backoff;
use crate::client::OrchestratorClientPtr;
use crate::clock::{ClockPtr, SystemClock};
use crate::manifest;
use crate::owner::OwnerProvider;
use crate::serving::{self, ServingBinary};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// The instance was deleted by this call.
    Deleted,
    /// The orchestrator no longer knows the instance.
    AlreadyGone,
    /// No instance was ever created.
    NothingToStop,
    /// Every deletion attempt failed; the instance may still exist.
    Abandoned,
}

/// Runs one model server instance on the orchestrator, from creation to
/// teardown. Not internally synchronized: calls must be serialized by the
/// caller, which `&mut self` enforces.
pub struct WorkloadRunner {
    client: OrchestratorClientPtr,
    clock: ClockPtr,
    owner: OwnerContext,
    spec: WorkloadSpec,
    config: RunnerConfig,
    cleanup: BackoffConfig,

    namespace: String,
    // Assigned by the orchestrator once the creation request succeeds.
    instance_name: Option<String>,
    // Resolved once the instance is running.
    endpoint: Option<String>,
    state: RunnerState,
}

impl WorkloadRunner {
    pub fn new(client: OrchestratorClientPtr, owner: OwnerContext, spec: WorkloadSpec) -> Self {
        let namespace = owner.namespace.clone();

        Self {
            client,
            clock: SystemClock::new_ptr(),
            owner,
            spec,
            config: RunnerConfig::default(),
            cleanup: BackoffConfig::default(),
            namespace,
            instance_name: None,
            endpoint: None,
            state: RunnerState::Unstarted,
        }
    }

    pub fn with_clock(mut self, clock: ClockPtr) -> Self {
        self.clock = clock;
        self
    }

    /// Builds a runner for the model at `model_path` from every section of
    /// `ctx`. The owner is resolved first; outside of a controller this fails
    /// with `OwnerUnavailable` before anything else is checked.
    pub async fn from_context(
        client: OrchestratorClientPtr,
        owner: &dyn OwnerProvider,
        ctx: &InfravalContext,
        model_path: &str,
    ) -> Result<Self, InfravalError> {
        trace_fn!("WorkloadRunner::from_context");

        let owner = owner.owner().await?;

        let serving_config = ctx.serving.as_ref().ok_or(InfravalError::InvalidConfig(
            "serving section is missing".to_string(),
        ))?;
        let binary = ServingBinary::try_from(serving_config)?;
        let spec = serving::build_workload_spec(
            &binary,
            model_path,
            &ctx.kubernetes,
            ResourceLimits::default(),
        )?;

        let mut runner = Self::new(client, owner, spec);
        runner.config = ctx.runner.clone();
        runner.cleanup = ctx.cleanup.clone();

        tracing::debug!("Build {runner} with context: {ctx}");

        Ok(runner)
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn instance_name(&self) -> Option<&str> {
        self.instance_name.as_deref()
    }

    pub fn endpoint(&self) -> Result<&str, InfravalError> {
        match (&self.endpoint, self.state) {
            (Some(endpoint), RunnerState::Running) => Ok(endpoint.as_str()),
            _ => Err(InfravalError::Uninitialized(
                "endpoint; call start() and wait_until_running() first".to_string(),
            )),
        }
    }

    /// Submits the model server Pod. Creation errors are returned as is.
    pub async fn start(&mut self) -> Result<(), InfravalError> {
        trace_fn!("WorkloadRunner::start");

        if self.state != RunnerState::Unstarted || self.instance_name.is_some() {
            return Err(InfravalError::InvalidState(
                "model server can not be started multiple times".to_string(),
            ));
        }

        let pod = manifest::build_pod_manifest(&self.spec, &self.owner)?;
        let instance = self.client.create_instance(&self.namespace, &pod).await?;

        tracing::info!(
            "Created model server instance <{}/{}> owned by {}",
            instance.namespace,
            instance.name,
            self.owner
        );

        self.instance_name = Some(instance.name);
        self.state = RunnerState::Pending;

        Ok(())
    }

    /// Polls the instance until it is running with an address, reaches a
    /// terminal phase, or `deadline` passes.
    pub async fn wait_until_running(&mut self, deadline: DateTime<Utc>) -> Result<(), InfravalError> {
        trace_fn!("WorkloadRunner::wait_until_running");

        let name = match (&self.instance_name, self.state) {
            (Some(_), RunnerState::Running) => return Ok(()),
            (Some(name), RunnerState::Pending | RunnerState::TimedOut) => name.clone(),
            (None, _) => {
                return Err(InfravalError::InvalidState(
                    "model server has not been created yet; call start() first".to_string(),
                ));
            }
            (Some(name), state) => {
                return Err(InfravalError::InvalidState(format!(
                    "can not wait for model server <{name}> in state {state}"
                )));
            }
        };

        while self.clock.now() < deadline {
            match self.poll(&name).await {
                Ok(InstanceStatus {
                    phase: InstancePhase::Running,
                    address: Some(address),
                }) => {
                    let endpoint = format!("{address}:{}", self.spec.container_port);
                    tracing::info!("Model server <{name}> is running at <{endpoint}>");

                    self.endpoint = Some(endpoint);
                    self.state = RunnerState::Running;
                    return Ok(());
                }
                Ok(status) if status.phase.is_terminal() => {
                    tracing::warn!(
                        "Model server <{name}> exited before running (phase={})",
                        status.phase
                    );

                    self.state = RunnerState::Aborted;
                    return Err(InfravalError::JobAborted(status.phase));
                }
                Ok(status) => {
                    tracing::info!(
                        "Waiting for model server <{name}> to be running (phase={})",
                        status.phase
                    );
                }
                // Every query error is retried until the deadline, even those
                // that will not go away by themselves.
                Err(e) if e.is_transient() => {
                    tracing::info!("Continue polling model server <{name}> after error: {e}");
                }
                Err(e) => {
                    tracing::warn!("Continue polling model server <{name}> after error: {e}");
                }
            }

            self.sleep_until_next_poll(deadline).await;
        }

        self.state = RunnerState::TimedOut;
        Err(InfravalError::DeadlineExceeded(format!(
            "model server <{name}> was not running before {deadline}"
        )))
    }

    /// Deletes the instance, retrying with exponential backoff. Never fails:
    /// if every attempt errors, a warning with the manual cleanup command is
    /// logged instead.
    pub async fn stop(&mut self) -> StopOutcome {
        trace_fn!("WorkloadRunner::stop");

        self.endpoint = None;
        self.state = RunnerState::Stopped;

        let Some(name) = self.instance_name.clone() else {
            tracing::debug!("No model server was created, nothing to stop.");
            return StopOutcome::NothingToStop;
        };

        let client = &self.client;
        let namespace = self.namespace.as_str();
        let instance = name.as_str();

        let result = backoff::retry_with_backoff(
            self.clock.as_ref(),
            &self.cleanup,
            "delete model server",
            || async move {
                tracing::info!("Deleting model server <{namespace}/{instance}>");
                match client.delete_instance(instance, namespace).await {
                    Ok(()) => Ok(StopOutcome::Deleted),
                    Err(InfravalError::NotFound(_)) => {
                        tracing::info!("Model server <{namespace}/{instance}> does not exist.");
                        Ok(StopOutcome::AlreadyGone)
                    }
                    Err(e) => Err(e),
                }
            },
        )
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    "Unable to delete the model server <{namespace}/{instance}>: {e}\n\
                     Please run the following command to manually clean up the resource:\n\
                     \n\
                     kubectl delete pod --namespace {namespace} {instance}\n"
                );
                StopOutcome::Abandoned
            }
        }
    }

    async fn poll(&self, name: &str) -> Result<InstanceStatus, InfravalError> {
        let query = self.client.get_instance(name, &self.namespace);

        match tokio::time::timeout(self.config.request_timeout, query).await {
            Ok(status) => status,
            Err(_) => Err(InfravalError::Network(format!(
                "query of model server <{name}> timed out after {:?}",
                self.config.request_timeout
            ))),
        }
    }

    async fn sleep_until_next_poll(&self, deadline: DateTime<Utc>) {
        let remaining = (deadline - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        self.clock.sleep(self.config.poll_interval.min(remaining)).await;
    }
}

impl Display for WorkloadRunner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "WorkloadRunner(image: {}, instance: {})",
            self.spec.image,
            self.instance_name.as_deref().unwrap_or("<none>")
        )
    }
}
