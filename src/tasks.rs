use std::future::Future;

use tokio::task::{JoinHandle, JoinSet};
use tracing::warn;

type Labeled = (&'static str, anyhow::Result<()>);

/// Background work spawned by a single request.
///
/// Joined tasks are awaited by [`TaskSet::finish`] and their outcome is
/// reported. Detached tasks run to completion on their own; failures are only
/// logged. With `join_detached` set, `finish` also waits for detached tasks.
///
/// Dropping the set aborts joined async tasks that have not finished.
pub struct TaskSet {
    joined: JoinSet<Labeled>,
    detached: Vec<JoinHandle<()>>,
    join_detached: bool,
}

#[derive(Debug, Default)]
pub struct TaskReport {
    pub completed: Vec<&'static str>,
    pub failed: Vec<(&'static str, anyhow::Error)>,
}

impl TaskReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failure(&self, label: &str) -> Option<&anyhow::Error> {
        self.failed
            .iter()
            .find(|(l, _)| *l == label)
            .map(|(_, e)| e)
    }
}

impl TaskSet {
    pub fn new(join_detached: bool) -> Self {
        Self {
            joined: JoinSet::new(),
            detached: Vec::new(),
            join_detached,
        }
    }

    pub fn join<F>(&mut self, label: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.joined.spawn(async move { (label, task.await) });
    }

    pub fn join_blocking<F>(&mut self, label: &'static str, task: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.joined.spawn_blocking(move || (label, task()));
    }

    pub fn detach<F>(&mut self, label: &'static str, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.detached.push(tokio::spawn(async move {
            if let Err(e) = task.await {
                warn!(task = label, "Background task failed: {:#}", e);
            }
        }));
    }

    pub fn detach_blocking<F>(&mut self, label: &'static str, task: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.detached.push(tokio::task::spawn_blocking(move || {
            if let Err(e) = task() {
                warn!(task = label, "Background task failed: {:#}", e);
            }
        }));
    }

    /// Wait for every joined task and collect their outcomes.
    pub async fn finish(mut self) -> TaskReport {
        let mut report = TaskReport::default();
        while let Some(joined) = self.joined.join_next().await {
            match joined {
                Ok((label, Ok(()))) => report.completed.push(label),
                Ok((label, Err(e))) => report.failed.push((label, e)),
                Err(e) => report
                    .failed
                    .push(("panicked", anyhow::anyhow!("task did not complete: {}", e))),
            }
        }

        if self.join_detached {
            for handle in self.detached.drain(..) {
                if let Err(e) = handle.await {
                    warn!("Detached task did not complete: {}", e);
                }
            }
        }

        report
    }
}
