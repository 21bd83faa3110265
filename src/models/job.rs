use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle of a classification batch.
///
/// Phases only move forward along `queued → scraping → detecting → done`
/// (skipping is allowed). `error` can be entered from any non-terminal phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Queued,
    Scraping,
    Detecting,
    Done,
    Error,
}

impl Phase {
    fn rank(self) -> u8 {
        match self {
            Phase::Queued => 0,
            Phase::Scraping => 1,
            Phase::Detecting => 2,
            Phase::Done | Phase::Error => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Error)
    }

    pub fn can_transition_to(self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Phase::Error || next.rank() > self.rank()
    }
}

/// One of the two output buckets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Partition {
    DuraBulk,
    NonDuraBulk,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::DuraBulk, Partition::NonDuraBulk];

    pub fn for_verdict(is_match: bool) -> Self {
        if is_match {
            Partition::DuraBulk
        } else {
            Partition::NonDuraBulk
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Partitions {
    pub dura_bulk: Vec<String>,
    pub non_dura_bulk: Vec<String>,
}

impl Partitions {
    pub fn get(&self, partition: Partition) -> &[String] {
        match partition {
            Partition::DuraBulk => &self.dura_bulk,
            Partition::NonDuraBulk => &self.non_dura_bulk,
        }
    }

    fn push(&mut self, partition: Partition, name: String) {
        match partition {
            Partition::DuraBulk => self.dura_bulk.push(name),
            Partition::NonDuraBulk => self.non_dura_bulk.push(name),
        }
    }

    pub fn len(&self) -> usize {
        self.dura_bulk.len() + self.non_dura_bulk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    /// Images counted in `current` that could not be decoded.
    pub skipped: usize,
}

/// Live state of one submitted batch, as seen by pollers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    pub id: Uuid,
    pub phase: Phase,
    pub progress: Progress,
    pub detail: String,
    pub partial_results: Partitions,
    pub final_results: Option<Partitions>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            phase: Phase::Queued,
            progress: Progress::default(),
            detail: "Starting...".to_string(),
            partial_results: Partitions::default(),
            final_results: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn ensure_mutable(&self) -> Result<(), JobError> {
        if self.phase.is_terminal() {
            return Err(JobError::Terminal { phase: self.phase });
        }
        Ok(())
    }

    fn touch(&mut self, detail: impl Into<String>) {
        self.detail = detail.into();
        self.updated_at = Utc::now();
    }

    /// Move to a non-terminal phase. Use [`complete`](Self::complete) and
    /// [`fail`](Self::fail) for terminal phases.
    pub fn transition(&mut self, next: Phase, detail: impl Into<String>) -> Result<(), JobError> {
        if next.is_terminal() || !self.phase.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.touch(detail);
        Ok(())
    }

    pub fn set_detail(&mut self, detail: impl Into<String>) -> Result<(), JobError> {
        self.ensure_mutable()?;
        self.touch(detail);
        Ok(())
    }

    /// Fix the batch size. Only allowed before any image was accounted for.
    pub fn set_total(&mut self, total: usize) -> Result<(), JobError> {
        self.ensure_mutable()?;
        if self.progress.current > 0 {
            return Err(JobError::TotalAfterStart);
        }
        self.progress.total = total;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Account for one attempted image. `placed` is `None` for unreadable
    /// images, which advance progress without entering a partition.
    pub fn record_image(&mut self, placed: Option<(Partition, String)>) -> Result<(), JobError> {
        self.ensure_mutable()?;
        if self.progress.current >= self.progress.total {
            return Err(JobError::ProgressOverflow {
                total: self.progress.total,
            });
        }
        self.progress.current += 1;
        match placed {
            Some((partition, name)) => self.partial_results.push(partition, name),
            None => self.progress.skipped += 1,
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Terminal success: freezes the partitions into `final_results`.
    pub fn complete(&mut self, detail: impl Into<String>) -> Result<(), JobError> {
        if !self.phase.can_transition_to(Phase::Done) {
            return Err(JobError::InvalidTransition {
                from: self.phase,
                to: Phase::Done,
            });
        }
        if self.progress.current != self.progress.total {
            return Err(JobError::Incomplete {
                current: self.progress.current,
                total: self.progress.total,
            });
        }
        self.phase = Phase::Done;
        self.final_results = Some(self.partial_results.clone());
        self.touch(detail);
        Ok(())
    }

    /// Terminal failure. `partial_results` stay visible, `final_results` stays empty.
    pub fn fail(&mut self, detail: impl Into<String>) -> Result<(), JobError> {
        self.ensure_mutable()?;
        self.phase = Phase::Error;
        self.touch(detail);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("Job already finished with phase {phase}")]
    Terminal { phase: Phase },

    #[error("Batch size cannot change once images have been processed")]
    TotalAfterStart,

    #[error("All {total} images have already been accounted for")]
    ProgressOverflow { total: usize },

    #[error("Batch incomplete: {current} of {total} images processed")]
    Incomplete { current: usize, total: usize },
}
