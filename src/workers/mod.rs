//! Priority-tiered job scheduler.
//!
//! Tiers run strictly in ascending priority. Every applicable job of a tier runs concurrently
//! on its own task, and the next tier starts only after all of them have finished. A job that
//! errors or panics, in construction, `check` or `start`, is recorded as failed and never
//! affects its siblings.

mod registry;
pub use registry::{JobKind, Registry, RegistryBuilder};

use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;

use crate::catalog::ChangeEntry;
use crate::jobs::Job;

/// Include/exclude lists of job names. Exclude wins when a name is in both.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    include: Option<HashSet<String>>,
    exclude: HashSet<String>,
}

impl JobFilter {
    pub fn new<I, E>(include: Option<I>, exclude: E) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            include: include.map(|names| names.into_iter().map(Into::into).collect()),
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        !self.exclude.contains(name) && self.include.as_ref().map_or(true, |inc| inc.contains(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Removed by the include/exclude filter.
    Filtered,
    /// `check` returned false.
    Skipped,
    Completed,
    Failed(String),
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Filtered => f.write_str("filtered"),
            JobOutcome::Skipped => f.write_str("skipped"),
            JobOutcome::Completed => f.write_str("completed"),
            JobOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub name: String,
    pub priority: u32,
    pub outcome: JobOutcome,
}

/// Per-kind outcomes of one run, in tier then registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub jobs: Vec<JobReport>,
}

impl RunReport {
    pub fn outcome(&self, name: &str) -> Option<&JobOutcome> {
        self.jobs.iter().find(|j| j.name == name).map(|j| &j.outcome)
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|j| matches!(j.outcome, JobOutcome::Failed(_)))
    }

    pub fn completed(&self) -> usize {
        self.jobs.iter().filter(|j| j.outcome == JobOutcome::Completed).count()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

async fn drive(mut job: Box<dyn Job>, name: &str, changes: &[ChangeEntry]) -> JobOutcome {
    match job.check(changes) {
        Ok(false) => {
            tracing::info!(job = name, "skipping");
            return JobOutcome::Skipped;
        }
        Ok(true) => {}
        Err(e) => {
            tracing::error!(job = name, "check failed: {e}");
            return JobOutcome::Failed(e.to_string());
        }
    }

    tracing::info!(job = name, "starting");
    match job.start().await {
        Ok(()) => {
            tracing::info!(job = name, "finished");
            JobOutcome::Completed
        }
        Err(e) => {
            tracing::error!(job = name, "failed: {e}");
            JobOutcome::Failed(e.to_string())
        }
    }
}

pub struct Scheduler<C> {
    registry: Registry<C>,
}

impl<C> Scheduler<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(registry: Registry<C>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry<C> {
        &self.registry
    }

    /// Runs every tier against `changes`. Never fails: job failures land in the report.
    pub async fn run(&self, ctx: &C, changes: &[ChangeEntry], filter: &JobFilter) -> RunReport {
        let changes: Arc<[ChangeEntry]> = changes.into();
        let mut report = RunReport::default();

        for (priority, kinds) in self.registry.tiers() {
            tracing::info!(priority, kinds = kinds.len(), "checking tier");
            let mut slots: Vec<Option<JobOutcome>> = vec![None; kinds.len()];
            let mut set = JoinSet::new();

            for (slot, kind) in kinds.iter().enumerate() {
                if !filter.allows(&kind.name) {
                    tracing::debug!(job = %kind.name, "filtered out");
                    slots[slot] = Some(JobOutcome::Filtered);
                    continue;
                }

                let job = match std::panic::catch_unwind(AssertUnwindSafe(|| kind.instantiate(ctx))) {
                    Ok(Ok(job)) => job,
                    Ok(Err(e)) => {
                        tracing::error!(job = %kind.name, "construction failed: {e}");
                        slots[slot] = Some(JobOutcome::Failed(e.to_string()));
                        continue;
                    }
                    Err(payload) => {
                        let reason = panic_message(payload);
                        tracing::error!(job = %kind.name, "construction {reason}");
                        slots[slot] = Some(JobOutcome::Failed(reason));
                        continue;
                    }
                };

                let name = kind.name.clone();
                let changes = changes.clone();
                set.spawn(async move {
                    let outcome = match AssertUnwindSafe(drive(job, &name, &changes)).catch_unwind().await {
                        Ok(outcome) => outcome,
                        Err(payload) => {
                            let reason = panic_message(payload);
                            tracing::error!(job = %name, "{reason}");
                            JobOutcome::Failed(reason)
                        }
                    };
                    (slot, outcome)
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((slot, outcome)) => slots[slot] = Some(outcome),
                    // the task body catches panics; only runtime shutdown lands here
                    Err(e) => tracing::error!(priority, "job task aborted: {e}"),
                }
            }

            for (kind, outcome) in kinds.iter().zip(slots) {
                let outcome = outcome.unwrap_or_else(|| JobOutcome::Failed("aborted".to_string()));
                report.jobs.push(JobReport { name: kind.name.clone(), priority, outcome });
            }
        }

        report
    }
}
