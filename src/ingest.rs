//! Ingestion engine: station files -> parsed readings -> conditional upserts.
//!
//! Files are processed by a bounded pool of workers, one file per worker at a
//! time. A bad line is counted and skipped; an unreadable file fails only its
//! own station. Duplicate detection is left entirely to the store's atomic
//! upsert, so concurrent runs over the same files converge on the same rows.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{Error, Result, SourceError, StoreError};
use crate::parse::{parse_line, RecordLayout};
use crate::source::{discover, SourceConfig, StationFile, StationLines};
use crate::store::WeatherStore;
use crate::{IngestReport, Reading, SourceFailure, StationTally, UpsertOutcome};

// ---

/// Tuning knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    // ---
    pub layout: RecordLayout,
    /// Upper bound on files processed at once.
    pub concurrency: usize,
    /// Parsed readings buffered before they are written.
    pub batch_size: usize,
    /// Pause before the single retry of a conflicting write.
    pub conflict_retry_delay: Duration,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            layout: RecordLayout::default(),
            concurrency: 8,
            batch_size: 1000,
            conflict_retry_delay: Duration::from_millis(50),
        }
    }
}

/// Result of one worker's pass over one station file.
#[derive(Debug)]
struct StationOutcome {
    file: StationFile,
    tally: StationTally,
    source_error: Option<SourceError>,
    store_error: Option<StoreError>,
    cancelled: bool,
}

/// Ingest every station file under `source`.
///
/// Returns a report even when individual lines or files fail. Fails the whole
/// call only for an invalid source root or an unreachable store. Cancelling
/// `cancel` stops workers between records; the report is marked `cancelled`.
pub async fn ingest(
    store: Arc<dyn WeatherStore>,
    source: &SourceConfig,
    options: &IngestOptions,
    cancel: &CancellationToken,
) -> Result<IngestReport> {
    // ---
    let run_id = Uuid::new_v4();
    run(run_id, store, source, options, cancel)
        .instrument(info_span!("ingest", %run_id))
        .await
}

async fn run(
    run_id: Uuid,
    store: Arc<dyn WeatherStore>,
    source: &SourceConfig,
    options: &IngestOptions,
    cancel: &CancellationToken,
) -> Result<IngestReport> {
    // ---
    let mut report = IngestReport::new(run_id);
    info!("Starting ingestion from {}", source.data_dir.display());

    let files = discover(source).await?;
    let workers = files.len().min(options.concurrency.max(1));
    info!("Found {} files to process with {} workers", files.len(), workers);

    // Child token lets a fatal store error stop the other workers
    let run_cancel = cancel.child_token();
    let mut pending = files.into_iter();
    let mut join_set = JoinSet::new();
    let mut fatal: Option<StoreError> = None;

    for file in pending.by_ref().take(workers) {
        spawn_station(&mut join_set, store.clone(), file, options, &run_cancel);
    }

    while let Some(joined) = join_set.join_next().await {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                run_cancel.cancel();
                join_set.shutdown().await;
                return Err(Error::TaskJoin(e));
            }
        };

        report.files_processed += 1;
        report.absorb(outcome.tally);
        report.cancelled |= outcome.cancelled;

        if let Some(e) = outcome.source_error {
            error!("Station {} source unavailable: {}", outcome.file.station_id, e);
            report.failed_sources.push(SourceFailure {
                station_id: outcome.file.station_id.clone(),
                path: outcome.file.path.display().to_string(),
                message: e.to_string(),
            });
        }

        if let Some(e) = outcome.store_error {
            error!("Store unreachable while ingesting {}: {}", outcome.file.station_id, e);
            run_cancel.cancel();
            fatal.get_or_insert(e);
        }

        if run_cancel.is_cancelled() {
            continue;
        }
        if let Some(file) = pending.next() {
            spawn_station(&mut join_set, store.clone(), file, options, &run_cancel);
        }
    }

    if let Some(e) = fatal {
        return Err(Error::Store(e));
    }

    report.cancelled |= cancel.is_cancelled();
    report.end_time = Utc::now();
    info!(
        "Ingestion complete in {}ms: {} inserted, {} updated, {} unchanged, {} errored, {} failed sources{}",
        report.duration().num_milliseconds(),
        report.inserted,
        report.updated,
        report.skipped_duplicate_identical,
        report.errored,
        report.failed_sources.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    Ok(report)
}

fn spawn_station(
    join_set: &mut JoinSet<StationOutcome>,
    store: Arc<dyn WeatherStore>,
    file: StationFile,
    options: &IngestOptions,
    cancel: &CancellationToken,
) {
    let options = options.clone();
    let cancel = cancel.clone();
    let span = info_span!("station", station_id = %file.station_id);
    join_set.spawn(
        async move { ingest_station(store.as_ref(), file, &options, &cancel).await }
            .instrument(span),
    );
}

async fn ingest_station(
    store: &dyn WeatherStore,
    file: StationFile,
    options: &IngestOptions,
    cancel: &CancellationToken,
) -> StationOutcome {
    // ---
    let mut outcome = StationOutcome {
        file,
        tally: StationTally::default(),
        source_error: None,
        store_error: None,
        cancelled: false,
    };

    let mut lines = match StationLines::open(&outcome.file).await {
        Ok(lines) => lines,
        Err(e) => {
            outcome.source_error = Some(e);
            return outcome;
        }
    };

    let batch_size = options.batch_size.max(1);
    let mut batch: Vec<Reading> = Vec::with_capacity(batch_size);

    loop {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return outcome;
        }

        let next = match lines.next_line().await {
            Ok(next) => next,
            Err(e) => {
                outcome.source_error = Some(e);
                return outcome;
            }
        };
        let Some((line_number, raw)) = next else {
            break;
        };

        match parse_line(lines.station_id(), &raw, line_number, &options.layout) {
            Ok(reading) => batch.push(reading),
            Err(e) => {
                warn!("Skipping malformed line in {}: {}", outcome.file.path.display(), e);
                outcome.tally.errored += 1;
            }
        }

        if batch.len() >= batch_size {
            write_batch(store, &mut batch, &mut outcome, options, cancel).await;
            if outcome.cancelled || outcome.store_error.is_some() {
                return outcome;
            }
            debug!("Wrote {} records so far", outcome.tally.total());
        }
    }

    write_batch(store, &mut batch, &mut outcome, options, cancel).await;
    info!(
        "Completed {}: {} new, {} updated, {} unchanged, {} errored",
        outcome.file.station_id,
        outcome.tally.inserted,
        outcome.tally.updated,
        outcome.tally.skipped_duplicate_identical,
        outcome.tally.errored
    );
    outcome
}

/// Upsert each buffered reading, checking for cancellation between records.
async fn write_batch(
    store: &dyn WeatherStore,
    batch: &mut Vec<Reading>,
    outcome: &mut StationOutcome,
    options: &IngestOptions,
    cancel: &CancellationToken,
) {
    // ---
    for reading in batch.drain(..) {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return;
        }
        match upsert_with_retry(store, &reading, options.conflict_retry_delay).await {
            Ok(result) => outcome.tally.record(result),
            Err(e) if e.is_unreachable() => {
                outcome.store_error = Some(e);
                return;
            }
            Err(e) => {
                error!("Failed to store {} {}: {}", reading.station_id, reading.date, e);
                outcome.tally.errored += 1;
            }
        }
    }
}

/// A conflict surviving the atomic upsert is retried once after `delay`.
async fn upsert_with_retry(
    store: &dyn WeatherStore,
    reading: &Reading,
    delay: Duration,
) -> std::result::Result<UpsertOutcome, StoreError> {
    match store.upsert_reading(reading).await {
        Err(e) if e.is_conflict() => {
            warn!("Retrying conflicting write for {} {}: {}", reading.station_id, reading.date, e);
            tokio::time::sleep(delay).await;
            store.upsert_reading(reading).await
        }
        other => other,
    }
}
