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

pub mod backoff;
pub mod client;
pub mod clock;
pub mod manifest;
pub mod owner;
pub mod runner;
pub mod serving;

pub use crate::client::{KubeOrchestrator, OrchestratorClient, OrchestratorClientPtr};
pub use crate::clock::{Clock, ClockPtr, SystemClock};
#[cfg(any(feature = "test-util", test))]
pub use crate::clock::ManualClock;
pub use crate::owner::{KubeOwnerProvider, OwnerProvider};
pub use crate::runner::{StopOutcome, WorkloadRunner};
pub use crate::serving::{EnvironmentProvider, ServingBinary, TensorFlowServing};
