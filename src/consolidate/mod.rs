//! Consolidation of samples from many corpus stores into partitioned stores.
//!
//! Records are routed to partitions (by dialect, or by duration-bounded
//! shard), each partition is copied by one worker that exclusively owns its
//! destination store and ledger, and the caller gets a per-partition report.

pub mod partition;
pub mod runner;
pub mod sharding;
pub mod worker;

pub use partition::{
    EligibilityFilter, PartitionKey, PartitionTask, StoreLayout, check_destinations,
    corpus_ledger_path, corpus_store_path, group_by_dialect, group_by_key, group_by_shard,
};
pub use runner::{ConsolidationReport, Consolidator, PartitionReport};
pub use sharding::ShardPlanner;
pub use worker::{PartitionOutcome, run_partition};

use crate::error::Result;
use crate::ledger::{self, LedgerSchema};
use crate::record::{PartitionRecord, SampleRecord};
use std::path::Path;

/// Load a corpus ledger as partition records tagged with the corpus name.
///
/// `schema` of `None` detects the ledger's schema. Reduced records are
/// re-tagged with `dataset`, since that names the store their payload is
/// read from.
pub fn load_corpus_records(
    source_dir: &Path,
    dataset: &str,
    schema: Option<LedgerSchema>,
) -> Result<Vec<PartitionRecord>> {
    let path = corpus_ledger_path(source_dir, dataset);
    let schema = match schema {
        Some(schema) => schema,
        None => LedgerSchema::detect(&path)?,
    };
    tracing::debug!("Reading {} as a {:?} ledger", path.display(), schema);

    match schema {
        LedgerSchema::Detailed => {
            let records: Vec<SampleRecord> = ledger::load(&path)?;
            Ok(records
                .iter()
                .map(|record| record.to_partition_record(dataset))
                .collect())
        }
        LedgerSchema::Reduced => {
            let mut records: Vec<PartitionRecord> = ledger::load(&path)?;
            let mut retagged = 0;
            for record in &mut records {
                if record.dataset_name != dataset {
                    record.dataset_name = dataset.to_string();
                    retagged += 1;
                }
            }
            if retagged > 0 {
                tracing::debug!(
                    "{}: {} records re-tagged as stored in {}",
                    path.display(),
                    retagged,
                    dataset
                );
            }
            Ok(records)
        }
    }
}

/// Move one corpus into per-dialect stores.
pub fn consolidate_by_dialect(
    consolidator: &Consolidator<'_>,
    dataset: &str,
    schema: Option<LedgerSchema>,
    filter: &EligibilityFilter,
) -> Result<ConsolidationReport> {
    let layout = consolidator.layout();
    let records = load_corpus_records(layout.source_dir(), dataset, schema)?;
    tracing::info!("Moving {} records of {} to dialect stores", records.len(), dataset);

    let (tasks, _skipped) = group_by_dialect(records, filter, layout);
    consolidator.run(tasks)
}

/// Shuffle eligible records of several corpora into duration-bounded shards.
///
/// `distributed`, when given, is spread over all shards by count instead of
/// being bucketed by duration. `schema` applies to every corpus; `None`
/// detects it per corpus, so detailed and reduced corpora can be mixed.
pub fn consolidate_into_shards(
    consolidator: &Consolidator<'_>,
    datasets: &[String],
    distributed: Option<&str>,
    schema: Option<LedgerSchema>,
    planner: &ShardPlanner,
    filter: &EligibilityFilter,
) -> Result<ConsolidationReport> {
    let layout = consolidator.layout();

    let mut records = Vec::new();
    for dataset in datasets {
        let (eligible, dropped) =
            filter.apply(load_corpus_records(layout.source_dir(), dataset, schema)?);
        if eligible.is_empty() {
            tracing::warn!("No eligible records in {}", dataset);
        }
        tracing::debug!("{}: {} eligible, {} filtered out", dataset, eligible.len(), dropped);
        records.extend(eligible);
    }

    let spread = match distributed {
        Some(dataset) => {
            filter
                .apply(load_corpus_records(layout.source_dir(), dataset, schema)?)
                .0
        }
        None => Vec::new(),
    };

    tracing::info!(
        "Collected {} records from {} corpora ({:.4}h)",
        records.len(),
        datasets.len(),
        records.iter().map(|r| r.duration).sum::<f64>() / 3600.0
    );

    let shards = planner.plan(records, spread);
    consolidator.run(group_by_shard(shards, layout))
}
