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

use std::future::Future;
use std::time::Duration;

use common::ctx::BackoffConfig;
use common::InfravalError;

use crate::clock::Clock;

/// The delays between consecutive attempts: `attempts - 1` items.
pub struct Backoff {
    remaining: u32,
    delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            remaining: config.attempts.saturating_sub(1),
            delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let current = self.delay.min(self.max_delay);
        self.delay = Duration::from_secs_f64(
            (self.delay.as_secs_f64() * self.multiplier).min(self.max_delay.as_secs_f64()),
        );

        Some(current)
    }
}

/// Runs `operation` up to `config.attempts` times, sleeping on `clock` between
/// failures. Returns the last error once all attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T>(
    clock: &dyn Clock,
    config: &BackoffConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, InfravalError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InfravalError>>,
{
    let mut delays = Backoff::new(config);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let Some(delay) = delays.next() else {
                    tracing::debug!(
                        "{operation_name} failed after {attempt}/{} attempts: {e}",
                        config.attempts
                    );
                    return Err(e);
                };

                tracing::warn!(
                    "{operation_name} failed on attempt {attempt}/{}, retrying in {delay:?}: {e}",
                    config.attempts
                );
                clock.sleep(delay).await;
            }
        }
    }
}
