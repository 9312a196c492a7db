//! Fan-out of partition tasks over a bounded pool of worker threads.
//!
//! Each task runs on its own thread from a scoped pool and writes only the
//! files of its partition. One task failing or panicking leaves every other
//! partition running; the report tells which partitions finished.

use crate::consolidate::partition::{PartitionKey, PartitionTask, StoreLayout, check_destinations};
use crate::consolidate::worker::{PartitionOutcome, run_partition};
use crate::error::{CorpusError, Result};
use crate::store::StoreBackend;
use crossbeam_channel::{Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::thread;

/// Result of one partition.
#[derive(Debug)]
pub struct PartitionReport {
    pub key: PartitionKey,
    pub records: usize,
    pub result: Result<PartitionOutcome>,
}

impl PartitionReport {
    /// The worker finished and every record is in place.
    pub fn is_complete(&self) -> bool {
        matches!(&self.result, Ok(outcome) if outcome.is_complete())
    }
}

/// Per-partition results of one consolidation run, in task order.
#[derive(Debug, Default)]
pub struct ConsolidationReport {
    pub partitions: Vec<PartitionReport>,
}

impl ConsolidationReport {
    pub fn completed(&self) -> impl Iterator<Item = &PartitionReport> {
        self.partitions.iter().filter(|p| p.is_complete())
    }

    /// Partitions whose worker failed or left records behind.
    pub fn incomplete(&self) -> impl Iterator<Item = &PartitionReport> {
        self.partitions.iter().filter(|p| !p.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        self.partitions.iter().all(PartitionReport::is_complete)
    }

    pub fn copied(&self) -> usize {
        self.outcomes().map(|o| o.copied).sum()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes().map(|o| o.skipped).sum()
    }

    pub fn missing(&self) -> usize {
        self.outcomes().map(|o| o.missing.len()).sum()
    }

    fn outcomes(&self) -> impl Iterator<Item = &PartitionOutcome> {
        self.partitions.iter().filter_map(|p| p.result.as_ref().ok())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs partition tasks concurrently, one worker per task at a time.
pub struct Consolidator<'a> {
    backend: &'a dyn StoreBackend,
    layout: StoreLayout,
    max_workers: usize,
}

impl<'a> Consolidator<'a> {
    pub fn new(backend: &'a dyn StoreBackend, layout: StoreLayout) -> Self {
        Self {
            backend,
            layout,
            max_workers: 0,
        }
    }

    /// Cap concurrent workers. `0` runs every task at once.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    fn worker_count(&self, tasks: usize) -> usize {
        if self.max_workers == 0 {
            tasks
        } else {
            self.max_workers.min(tasks)
        }
    }

    /// Run every task and wait for all of them.
    ///
    /// Fails before starting any worker when two tasks share a destination or
    /// a destination is also a source store.
    pub fn run(&self, tasks: Vec<PartitionTask>) -> Result<ConsolidationReport> {
        check_destinations(&tasks, &self.layout)?;
        if tasks.is_empty() {
            tracing::warn!("No partitions to consolidate");
            return Ok(ConsolidationReport::default());
        }

        let workers = self.worker_count(tasks.len());
        tracing::info!(
            "Consolidating {} partitions with {} workers",
            tasks.len(),
            workers
        );

        let (task_tx, task_rx) = crossbeam_channel::unbounded::<usize>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        for idx in 0..tasks.len() {
            if task_tx.send(idx).is_err() {
                return Err(CorpusError::Other("task queue closed".to_string()));
            }
        }
        drop(task_tx);

        let tasks_ref = &tasks;
        thread::scope(|scope| {
            for _ in 0..workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || self.worker_loop(tasks_ref, task_rx, result_tx));
            }
        });
        drop(result_tx);

        let mut results: Vec<Option<Result<PartitionOutcome>>> =
            tasks.iter().map(|_| None).collect();
        for (idx, result) in result_rx.iter() {
            results[idx] = Some(result);
        }

        let partitions = tasks
            .into_iter()
            .zip(results)
            .map(|(task, result)| PartitionReport {
                result: result.unwrap_or_else(|| {
                    Err(CorpusError::Other(format!("{} was never run", task.key)))
                }),
                records: task.records.len(),
                key: task.key,
            })
            .collect();

        let report = ConsolidationReport { partitions };
        for partition in report.incomplete() {
            match &partition.result {
                Ok(outcome) => tracing::warn!(
                    "{} is incomplete: {} records without payload",
                    partition.key,
                    outcome.missing.len()
                ),
                Err(e) => tracing::error!("{} failed: {}", partition.key, e),
            }
        }
        tracing::info!(
            "{} of {} partitions complete",
            report.completed().count(),
            report.partitions.len()
        );
        Ok(report)
    }

    fn worker_loop(
        &self,
        tasks: &[PartitionTask],
        task_rx: Receiver<usize>,
        result_tx: Sender<(usize, Result<PartitionOutcome>)>,
    ) {
        for idx in task_rx.iter() {
            let task = &tasks[idx];
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                run_partition(task, &self.layout, self.backend)
            }))
            .unwrap_or_else(|payload| {
                Err(CorpusError::Other(format!(
                    "worker for {} panicked: {}",
                    task.key,
                    panic_message(payload.as_ref())
                )))
            });

            if result_tx.send((idx, result)).is_err() {
                break;
            }
        }
    }
}
