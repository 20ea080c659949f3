//! Batch ingestion of sources into the ledger
//!
//! Payloads are produced on a bounded worker pool, one chunk of `workers`
//! sources at a time, and each chunk is appended in source order. Every
//! source yields exactly one [`IngestOutcome`].

use crate::blockchain::{Block, Ledger};
use crate::crypto::PayloadProducer;
use crate::error::ChainError;
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub source: PathBuf,
    pub result: Result<Block, ChainError>,
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub outcomes: Vec<IngestOutcome>,
}

impl IngestReport {
    pub fn appended(&self) -> impl Iterator<Item = &Block> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &ChainError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.source, e)))
    }

    pub fn appended_count(&self) -> usize {
        self.appended().count()
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Produces and appends every source, reporting each outcome to
/// `on_outcome` as it lands.
pub fn ingest_sources<F>(
    ledger: &Ledger,
    producer: &dyn PayloadProducer,
    sources: &[PathBuf],
    workers: usize,
    mut on_outcome: F,
) -> Result<IngestReport, ChainError>
where
    F: FnMut(&IngestOutcome),
{
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("ingest-{}", i))
        .build()
        .map_err(|e| ChainError::ConfigError(format!("Failed to start ingest workers: {}", e)))?;

    let mut report = IngestReport {
        outcomes: Vec::with_capacity(sources.len()),
    };

    for chunk in sources.chunks(workers) {
        let payloads: Vec<Result<Vec<u8>, ChainError>> =
            pool.install(|| chunk.par_iter().map(|source| producer.produce(source)).collect());

        for (source, payload) in chunk.iter().zip(payloads) {
            let result = payload.and_then(|bytes| ledger.add_block(bytes));
            if let Err(e) = &result {
                warn!("Failed to ingest {:?}: {}", source, e);
            }
            let outcome = IngestOutcome {
                source: source.clone(),
                result,
            };
            on_outcome(&outcome);
            report.outcomes.push(outcome);
        }
    }

    info!(
        "Ingested {} of {} sources ({} failed)",
        report.appended_count(),
        sources.len(),
        report.failed_count()
    );
    Ok(report)
}
