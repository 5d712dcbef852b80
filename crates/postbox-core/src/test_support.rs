//! Shared test doubles.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::Publishing;
use crate::error::{Error, Result};
use crate::ports::Publisher;

/// Poll `check` every 10ms for up to two seconds.
pub(crate) async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Publisher that fails the first `failures` attempts of every id.
pub(crate) struct ScriptedPublisher {
    failures: u32,
    attempts: Mutex<HashMap<String, u32>>,
    sent: Mutex<Vec<Publishing>>,
}

impl ScriptedPublisher {
    pub(crate) fn failing_times(failures: u32) -> Self {
        Self {
            failures,
            attempts: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn always_ok() -> Self {
        Self::failing_times(0)
    }

    pub(crate) fn always_failing() -> Self {
        Self::failing_times(u32::MAX)
    }

    pub(crate) fn attempts(&self, id: &str) -> u32 {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub(crate) fn sent(&self) -> Vec<Publishing> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn send(&self, publishing: &Publishing) -> Result<()> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(publishing.id().to_string()).or_insert(0);
            *n += 1;
            *n
        };
        if attempt <= self.failures {
            return Err(Error::message(format!("broker unavailable (attempt {attempt})")));
        }
        self.sent.lock().unwrap().push(publishing.clone());
        Ok(())
    }
}
