//! Fire-and-forget side effects.
//!
//! Work spawned here never blocks the request that triggered it and its
//! failure never reaches that request: errors are logged and dropped.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;

use crate::errors::AppError;

/// Handle for spawning background work on the tokio runtime.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` in the background. A failure is logged at warn under `label`.
    pub fn spawn<F>(&self, label: &'static str, fut: F)
    where
        F: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let Ok(mut set) = self.inner.lock() else {
            tracing::error!(task = label, "Background task registry poisoned");
            return;
        };

        // Reap finished tasks so the set stays bounded.
        while set.try_join_next().is_some() {}

        set.spawn(async move {
            if let Err(e) = fut.await {
                tracing::warn!(task = label, error = %e, "Background task failed");
            } else {
                tracing::debug!(task = label, "Background task finished");
            }
        });
    }

    /// Number of tasks not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().map(|set| set.len()).unwrap_or(0)
    }

    /// Wait for every spawned task, including tasks spawned while draining.
    pub async fn drain(&self) {
        loop {
            let mut batch = {
                let Ok(mut set) = self.inner.lock() else {
                    return;
                };
                std::mem::take(&mut *set)
            };
            if batch.is_empty() {
                return;
            }
            while let Some(result) = batch.join_next().await {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Background task panicked");
                }
            }
        }
    }
}
