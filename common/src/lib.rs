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

pub mod apis;
pub mod ctx;
pub mod trace;

use thiserror::Error;
use time::macros::format_description;
use tracing_subscriber::filter::{FromEnvError, ParseError};
use tracing_subscriber::fmt::time::LocalTime;

use crate::apis::InstancePhase;

#[derive(Error, Debug)]
pub enum InfravalError {
    #[error("'{0}' not found")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    Network(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    InvalidConfig(String),

    #[error("'{0}' is not initialized")]
    Uninitialized(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0} is not implemented")]
    NotImplemented(String),

    #[error("not running under an expected controller: {0}")]
    OwnerUnavailable(String),

    #[error("job has been aborted (phase={0})")]
    JobAborted(InstancePhase),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
}

impl InfravalError {
    /// Errors that a later call against the orchestrator may not see again.
    pub fn is_transient(&self) -> bool {
        matches!(self, InfravalError::Network(_))
    }
}

impl From<kube::Error> for InfravalError {
    fn from(value: kube::Error) -> Self {
        match value {
            kube::Error::Api(resp) if resp.code == 404 => InfravalError::NotFound(resp.message),
            kube::Error::Api(resp) if resp.code == 401 || resp.code == 403 => {
                InfravalError::PermissionDenied(resp.message)
            }
            e => InfravalError::Network(e.to_string()),
        }
    }
}

impl From<ParseError> for InfravalError {
    fn from(value: ParseError) -> Self {
        InfravalError::InvalidConfig(value.to_string())
    }
}

impl From<FromEnvError> for InfravalError {
    fn from(value: FromEnvError) -> Self {
        InfravalError::InvalidConfig(value.to_string())
    }
}

impl From<serde_yaml::Error> for InfravalError {
    fn from(value: serde_yaml::Error) -> Self {
        InfravalError::InvalidConfig(value.to_string())
    }
}

pub fn init_logger() -> Result<(), InfravalError> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("h2=error".parse()?)
        .add_directive("hyper_util=error".parse()?)
        .add_directive("kube_client=warn".parse()?)
        .add_directive("tower=error".parse()?);

    let time_format = LocalTime::new(format_description!(
        "[hour repr:24]:[minute]:[second].[subsecond digits:3]"
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(time_format)
        .with_ansi(false)
        .with_target(true)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status {code}"),
            reason: "test".to_string(),
            code,
        })
    }

    #[test]
    fn test_from_kube_error() {
        let err = InfravalError::from(api_error(404));
        assert!(matches!(err, InfravalError::NotFound(ref s) if s == "status 404"));
        assert!(!err.is_transient());

        let err = InfravalError::from(api_error(500));
        assert!(matches!(err, InfravalError::Network(_)));
        assert!(err.is_transient());

        let err = InfravalError::from(api_error(403));
        assert!(matches!(err, InfravalError::PermissionDenied(ref s) if s == "status 403"));
        assert!(!err.is_transient());

        let err = InfravalError::from(api_error(401));
        assert!(matches!(err, InfravalError::PermissionDenied(_)));
    }

    #[test]
    fn test_init_logger() -> Result<(), InfravalError> {
        init_logger()?;
        tracing::info!("logger initialized");

        Ok(())
    }

    #[test]
    fn test_error_messages() {
        let err = InfravalError::JobAborted(InstancePhase::Failed);
        assert_eq!(err.to_string(), "job has been aborted (phase=Failed)");

        let err = InfravalError::Uninitialized("endpoint".to_string());
        assert_eq!(err.to_string(), "'endpoint' is not initialized");
    }
}
