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
use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, EnumString};

/// The phase of an instance as reported by the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay, EnumString)]
pub enum InstancePhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl InstancePhase {
    /// The workload process has exited; the instance will never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstancePhase::Succeeded | InstancePhase::Failed)
    }
}

impl From<Option<&str>> for InstancePhase {
    fn from(phase: Option<&str>) -> Self {
        phase
            .and_then(|p| p.parse::<InstancePhase>().ok())
            .unwrap_or(InstancePhase::Unknown)
    }
}

/// An instance created by the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instance {
    pub name: String,
    pub namespace: String,
    pub uid: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceStatus {
    pub phase: InstancePhase,
    pub address: Option<String>,
}

/// The identity of the process owning the instances it creates; the
/// orchestrator garbage-collects them once the owner is gone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerContext {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    pub namespace: String,
    pub service_account_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

/// Everything needed to build the manifest of a serving workload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub image: String,
    pub envs: BTreeMap<String, String>,
    pub container_port: u16,
    pub service_account_name: Option<String>,
    pub active_deadline_seconds: Option<i64>,
    pub resources: ResourceLimits,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay)]
pub enum RunnerState {
    Unstarted,
    Pending,
    Running,
    Aborted,
    TimedOut,
    Stopped,
}

impl Display for OwnerContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} <{}/{}>",
            self.api_version, self.kind, self.namespace, self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_phase_from_str() {
        assert_eq!(InstancePhase::from(Some("Running")), InstancePhase::Running);
        assert_eq!(InstancePhase::from(Some("Pending")), InstancePhase::Pending);
        assert_eq!(InstancePhase::from(Some("Failed")), InstancePhase::Failed);
        assert_eq!(InstancePhase::from(Some("Evicted")), InstancePhase::Unknown);
        assert_eq!(InstancePhase::from(None), InstancePhase::Unknown);
    }

    #[test]
    fn test_instance_phase_terminal() {
        assert!(InstancePhase::Succeeded.is_terminal());
        assert!(InstancePhase::Failed.is_terminal());
        assert!(!InstancePhase::Running.is_terminal());
        assert!(!InstancePhase::Pending.is_terminal());
        assert!(!InstancePhase::Unknown.is_terminal());
    }
}
