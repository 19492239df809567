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
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::InfravalError;

const DEFAULT_INFRAVAL_HOME: &str = ".infraval";
const DEFAULT_INFRAVAL_CONF: &str = "infraval.yaml";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 3;
const DEFAULT_CLEANUP_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_BACKOFF_SECS: u64 = 1;
const DEFAULT_MAX_BACKOFF_SECS: u64 = 10;
const DEFAULT_SERVING_KIND: &str = "tensorflow_serving";
const DEFAULT_SERVING_TAG: &str = "latest";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct InfravalContextYaml {
    pub runner: Option<RunnerYaml>,
    pub cleanup: Option<CleanupYaml>,
    pub kubernetes: Option<KubernetesYaml>,
    pub serving: Option<ServingYaml>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunnerYaml {
    pub poll_interval_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CleanupYaml {
    pub attempts: Option<u32>,
    pub initial_backoff_secs: Option<u64>,
    pub max_backoff_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KubernetesYaml {
    pub service_account_name: Option<String>,
    pub active_deadline_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServingYaml {
    pub kind: Option<String>,
    pub model_name: String,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InfravalContext {
    pub runner: RunnerConfig,
    pub cleanup: BackoffConfig,
    pub kubernetes: KubernetesConfig,
    pub serving: Option<ServingConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub poll_interval: Duration,
    /// Upper bound of a single orchestrator query; shorter than `poll_interval`.
    pub request_timeout: Duration,
}

/// Exponential backoff: `initial_delay * multiplier^n`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubernetesConfig {
    pub service_account_name: Option<String>,
    pub active_deadline_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingConfig {
    pub kind: String,
    pub model_name: String,
    pub tag: String,
}

impl Display for InfravalContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "poll interval: {:?}, cleanup attempts: {}",
            self.runner.poll_interval, self.cleanup.attempts
        )
    }
}

impl InfravalContext {
    pub fn from_file(fp: Option<String>) -> Result<Self, InfravalError> {
        let fp = match fp {
            None => Self::default_path()?,
            Some(path) => path,
        };

        if !Path::new(&fp).is_file() {
            return Err(InfravalError::InvalidConfig(format!("<{fp}> is not a file")));
        }

        let contents =
            fs::read_to_string(fp.clone()).map_err(|e| InfravalError::Internal(e.to_string()))?;

        Self::from_yaml(&contents)
    }

    /// `$HOME/.infraval/infraval.yaml`, resolved when called.
    pub fn default_path() -> Result<String, InfravalError> {
        let home = env::var("HOME")
            .map_err(|e| InfravalError::InvalidConfig(format!("failed to read $HOME: {e}")))?;

        Ok(format!("{home}/{DEFAULT_INFRAVAL_HOME}/{DEFAULT_INFRAVAL_CONF}"))
    }

    pub fn from_yaml(contents: &str) -> Result<Self, InfravalError> {
        let ctx: InfravalContextYaml = serde_yaml::from_str(contents)?;

        tracing::debug!("Load InfravalContext: {ctx:?}");

        InfravalContext::try_from(ctx)
    }
}

impl TryFrom<InfravalContextYaml> for InfravalContext {
    type Error = InfravalError;
    fn try_from(ctx: InfravalContextYaml) -> Result<Self, Self::Error> {
        Ok(InfravalContext {
            runner: ctx
                .runner
                .map(RunnerConfig::try_from)
                .unwrap_or_else(|| Ok(RunnerConfig::default()))?,
            cleanup: ctx
                .cleanup
                .map(BackoffConfig::try_from)
                .unwrap_or_else(|| Ok(BackoffConfig::default()))?,
            kubernetes: ctx
                .kubernetes
                .map(KubernetesConfig::try_from)
                .unwrap_or_else(|| Ok(KubernetesConfig::default()))?,
            serving: ctx.serving.map(ServingConfig::try_from).transpose()?,
        })
    }
}

impl TryFrom<RunnerYaml> for RunnerConfig {
    type Error = InfravalError;
    fn try_from(runner: RunnerYaml) -> Result<Self, Self::Error> {
        let poll_interval = Duration::from_secs(
            runner
                .poll_interval_secs
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        );
        let request_timeout = Duration::from_secs(
            runner
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );

        if poll_interval.is_zero() {
            return Err(InfravalError::InvalidConfig(
                "poll_interval_secs should be > 0".to_string(),
            ));
        }
        if request_timeout.is_zero() || request_timeout >= poll_interval {
            return Err(InfravalError::InvalidConfig(format!(
                "request_timeout_secs should be in (0, {}). Got {}",
                poll_interval.as_secs(),
                request_timeout.as_secs()
            )));
        }

        Ok(RunnerConfig {
            poll_interval,
            request_timeout,
        })
    }
}

impl TryFrom<CleanupYaml> for BackoffConfig {
    type Error = InfravalError;
    fn try_from(cleanup: CleanupYaml) -> Result<Self, Self::Error> {
        let attempts = cleanup.attempts.unwrap_or(DEFAULT_CLEANUP_ATTEMPTS);
        if attempts == 0 {
            return Err(InfravalError::InvalidConfig(
                "cleanup attempts should be >= 1".to_string(),
            ));
        }

        let initial_delay = Duration::from_secs(
            cleanup
                .initial_backoff_secs
                .unwrap_or(DEFAULT_INITIAL_BACKOFF_SECS),
        );
        let max_delay = Duration::from_secs(
            cleanup
                .max_backoff_secs
                .unwrap_or(DEFAULT_MAX_BACKOFF_SECS),
        );
        let config = BackoffConfig {
            attempts,
            initial_delay,
            max_delay,
            ..BackoffConfig::default()
        };

        // Every delay must be longer than the previous one, so the cap may
        // only be reached by the last delay.
        if attempts > 1 && (initial_delay.is_zero() || config.last_delay() > max_delay) {
            return Err(InfravalError::InvalidConfig(format!(
                "max_backoff_secs ({}) should be >= {:?}, the last of {} delays from initial_backoff_secs ({})",
                max_delay.as_secs(),
                config.last_delay(),
                attempts - 1,
                initial_delay.as_secs()
            )));
        }

        Ok(config)
    }
}

impl BackoffConfig {
    /// The uncapped delay before the last attempt.
    pub fn last_delay(&self) -> Duration {
        let exponent = self.attempts.saturating_sub(2).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl TryFrom<KubernetesYaml> for KubernetesConfig {
    type Error = InfravalError;
    fn try_from(k8s: KubernetesYaml) -> Result<Self, Self::Error> {
        // Negative deadlines are rejected when the manifest is built.
        Ok(KubernetesConfig {
            service_account_name: k8s.service_account_name.filter(|s| !s.is_empty()),
            active_deadline_seconds: k8s.active_deadline_seconds,
        })
    }
}

impl TryFrom<ServingYaml> for ServingConfig {
    type Error = InfravalError;
    fn try_from(serving: ServingYaml) -> Result<Self, Self::Error> {
        if serving.model_name.is_empty() {
            return Err(InfravalError::InvalidConfig(
                "serving.model_name is empty".to_string(),
            ));
        }

        Ok(ServingConfig {
            kind: serving.kind.unwrap_or(DEFAULT_SERVING_KIND.to_string()),
            model_name: serving.model_name,
            tag: serving.tag.unwrap_or(DEFAULT_SERVING_TAG.to_string()),
        })
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        RunnerConfig {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            attempts: DEFAULT_CLEANUP_ATTEMPTS,
            initial_delay: Duration::from_secs(DEFAULT_INITIAL_BACKOFF_SECS),
            max_delay: Duration::from_secs(DEFAULT_MAX_BACKOFF_SECS),
            multiplier: 2.0,
        }
    }
}
