use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::models::job::{JobError, JobRecord, Partition, Phase};

/// In-memory store of job records for the lifetime of the process.
///
/// Records are only ever written through the [`JobHandle`] returned by
/// [`create`](Self::create); everyone else gets cloned snapshots.
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<Uuid, JobRecord>,
    /// Woken whenever some record reaches a terminal phase.
    settled: Notify,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `queued` record and hand out its write capability.
    pub fn create(self: &Arc<Self>) -> JobHandle {
        let id = Uuid::new_v4();
        self.jobs.insert(id, JobRecord::new(id));
        JobHandle {
            id,
            registry: Arc::clone(self),
            finished: false,
        }
    }

    /// Snapshot of a record.
    pub fn get(&self, id: &Uuid) -> Option<JobRecord> {
        self.jobs.get(id).map(|record| record.value().clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Wait until a job reaches `done` or `error` and return the final record.
    pub async fn wait(&self, id: &Uuid) -> Result<JobRecord, JobError> {
        loop {
            let settled = self.settled.notified();
            tokio::pin!(settled);
            // register before checking so a transition in between is not missed
            settled.as_mut().enable();

            let record = self.get(id).ok_or(JobError::NotFound(*id))?;
            if record.phase.is_terminal() {
                return Ok(record);
            }
            settled.await;
        }
    }

    fn update<F>(&self, id: &Uuid, f: F) -> Result<(), JobError>
    where
        F: FnOnce(&mut JobRecord) -> Result<(), JobError>,
    {
        let terminal = {
            let mut record = self.jobs.get_mut(id).ok_or(JobError::NotFound(*id))?;
            f(record.value_mut())?;
            record.phase.is_terminal()
        };
        if terminal {
            self.settled.notify_waiters();
        }
        Ok(())
    }
}

/// Exclusive write access to one job record, owned by the batch worker.
///
/// Dropping a handle before [`finish`](Self::finish) or [`fail`](Self::fail)
/// (for instance when the worker panics) marks the job as failed so pollers
/// never wait on a dead job.
pub struct JobHandle {
    id: Uuid,
    registry: Arc<JobRegistry>,
    finished: bool,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn enter(&self, phase: Phase, detail: impl Into<String>) -> Result<(), JobError> {
        let detail = detail.into();
        self.registry.update(&self.id, |r| r.transition(phase, detail))
    }

    pub fn set_detail(&self, detail: impl Into<String>) -> Result<(), JobError> {
        let detail = detail.into();
        self.registry.update(&self.id, |r| r.set_detail(detail))
    }

    pub fn set_total(&self, total: usize) -> Result<(), JobError> {
        self.registry.update(&self.id, |r| r.set_total(total))
    }

    pub fn record_image(&self, placed: Option<(Partition, String)>) -> Result<(), JobError> {
        self.registry.update(&self.id, |r| r.record_image(placed))
    }

    pub fn finish(mut self, detail: impl Into<String>) -> Result<(), JobError> {
        let detail = detail.into();
        let result = self.registry.update(&self.id, |r| r.complete(detail));
        if result.is_ok() {
            self.finished = true;
        }
        result
    }

    pub fn fail(mut self, detail: impl Into<String>) -> Result<(), JobError> {
        self.finished = true;
        let detail = detail.into();
        self.registry.update(&self.id, |r| r.fail(detail))
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let result = self
            .registry
            .update(&self.id, |r| r.fail("Batch worker stopped unexpectedly"));
        if result.is_ok() {
            tracing::error!(job_id = %self.id, "Job abandoned before completion");
        }
    }
}
