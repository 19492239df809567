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
#[cfg(any(feature = "test-util", test))]
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type ClockPtr = Arc<dyn Clock>;

/// The source of wall-clock time and suspension used by the runner.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new_ptr() -> ClockPtr {
        Arc::new(SystemClock)
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that only moves when someone sleeps on it; every sleep is recorded.
#[cfg(any(feature = "test-util", test))]
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<ManualClockInner>,
}

#[cfg(any(feature = "test-util", test))]
#[derive(Debug)]
struct ManualClockInner {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

#[cfg(any(feature = "test-util", test))]
impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(ManualClockInner {
                now,
                sleeps: vec![],
            }),
        }
    }

    pub fn new_ptr(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self::new(now))
    }

    pub fn advance(&self, duration: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.sleeps.clone()
    }
}

#[cfg(any(feature = "test-util", test))]
#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.now
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.sleeps.push(duration);
        }
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
