//! Concurrent fan-out of entries and single-writer fan-in to the sink.

use std::{sync::Arc, time::Duration};

use bpindex_config::{config::Config, error::ConfigError};
use bpindex_oci::{
    reference::DEFAULT_REGISTRY, ArtifactFetcher, FetchError, FetchErrorKind, ImageConfig,
    OciReference,
};
use tokio::{
    sync::{mpsc, Semaphore},
    time::{self, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    entry::Entry,
    extract::{extract_metadata, validate_address, EntryResult, Failure, FailureKind},
    report::{Outcome, Report},
    sink::IndexSink,
};

/// Tuning for [`process_batch`].
///
/// The defaults never retry; [`IndexOptions::from_config`] applies the
/// configured retry counts.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Maximum number of fetches in flight.
    pub parallel_limit: usize,
    /// Limit for a single fetch attempt.
    pub fetch_timeout: Duration,
    /// Limit for the whole batch; entries without a result by then fail.
    pub batch_deadline: Duration,
    /// Extra attempts after a network failure or timeout.
    pub fetch_retries: u32,
    /// Extra attempts after a sink failure.
    pub sink_retries: u32,
    /// Delay before the first retry, doubled on each further retry.
    pub retry_backoff: Duration,
    pub default_registry: String,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            parallel_limit: 8,
            fetch_timeout: Duration::from_secs(30),
            batch_deadline: Duration::from_secs(600),
            fetch_retries: 0,
            sink_retries: 0,
            retry_backoff: Duration::from_millis(500),
            default_registry: DEFAULT_REGISTRY.to_string(),
        }
    }
}

impl IndexOptions {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            parallel_limit: config.get_parallel_limit(),
            fetch_timeout: config.get_fetch_timeout()?,
            batch_deadline: config.get_batch_deadline()?,
            fetch_retries: config.fetch_retries.unwrap_or(2),
            sink_retries: config.sink_retries.unwrap_or(1),
            retry_backoff: config.get_retry_backoff()?,
            default_registry: config.get_default_registry().to_string(),
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

/// Indexes every entry of `batch`, returning one outcome per entry.
///
/// Each entry is validated, fetched and checked on its own task, with at
/// most `parallel_limit` fetches in flight. A fetch that outlives its
/// timeout keeps its slot until it actually returns. Results are committed to `sink`
/// one at a time in the order they arrive. A failing entry never stops the
/// others; when the batch deadline passes, entries still outstanding are
/// reported as fetch timeouts.
pub async fn process_batch<S>(
    batch: Vec<Entry>,
    fetcher: Arc<dyn ArtifactFetcher>,
    sink: &mut S,
    options: &IndexOptions,
) -> Report
where
    S: IndexSink + ?Sized,
{
    let total = batch.len();
    debug!(count = total, "processing batch");

    let deadline = Instant::now() + options.batch_deadline;
    let semaphore = Arc::new(Semaphore::new(options.parallel_limit.max(1)));
    let (tx, mut rx) = mpsc::channel::<(usize, EntryResult)>(total.max(1));

    let mut handles = Vec::with_capacity(total);
    for (position, entry) in batch.iter().cloned().enumerate() {
        let semaphore = semaphore.clone();
        let fetcher = fetcher.clone();
        let options = options.clone();
        let tx = tx.clone();

        let handle = tokio::spawn(async move {
            let result = run_entry(entry, fetcher, &semaphore, &options).await;
            let _ = tx.send((position, result)).await;
        });
        handles.push(handle);
    }
    drop(tx);

    let mut outcomes = Vec::with_capacity(total);
    let mut drained = vec![false; total];
    let mut deadline_passed = false;

    while outcomes.len() < total {
        match time::timeout_at(deadline, rx.recv()).await {
            Ok(Some((position, result))) => {
                drained[position] = true;
                outcomes.push(commit(result, &mut *sink, options).await);
            }
            Ok(None) => break,
            Err(_) => {
                deadline_passed = true;
                break;
            }
        }
    }

    if deadline_passed {
        while let Ok((position, result)) = rx.try_recv() {
            drained[position] = true;
            outcomes.push(commit(result, &mut *sink, options).await);
        }
        warn!(
            "batch deadline of {:?} passed with {} entries outstanding",
            options.batch_deadline,
            total - outcomes.len()
        );
    }

    for handle in &handles {
        handle.abort();
    }

    for (entry, _) in batch
        .into_iter()
        .zip(drained)
        .filter(|(_, drained)| !drained)
    {
        let failure = if deadline_passed {
            Failure {
                kind: FailureKind::FetchFailed,
                cause: Some(FetchErrorKind::Timeout),
                detail: format!(
                    "timeout: batch deadline of {:?} passed before {} was fetched",
                    options.batch_deadline, entry.address
                ),
            }
        } else {
            Failure::new(
                FailureKind::FetchFailed,
                format!("worker for {} exited without a result", entry.address),
            )
        };
        let outcome = Outcome::Failed { entry, failure };
        log_outcome(&outcome);
        outcomes.push(outcome);
    }

    Report::new(outcomes)
}

async fn run_entry(
    entry: Entry,
    fetcher: Arc<dyn ArtifactFetcher>,
    semaphore: &Arc<Semaphore>,
    options: &IndexOptions,
) -> EntryResult {
    let reference = match validate_address(&entry, &options.default_registry) {
        Ok(reference) => reference,
        Err(failure) => return EntryResult::Failed { entry, failure },
    };

    let extracted = fetch_with_retry(&entry, &reference, &fetcher, semaphore, options)
        .await
        .and_then(|config| extract_metadata(&entry, &config));

    match extracted {
        Ok(metadata) => EntryResult::Extracted { entry, metadata },
        Err(failure) => EntryResult::Failed { entry, failure },
    }
}

async fn fetch_with_retry(
    entry: &Entry,
    reference: &OciReference,
    fetcher: &Arc<dyn ArtifactFetcher>,
    semaphore: &Arc<Semaphore>,
    options: &IndexOptions,
) -> Result<ImageConfig, Failure> {
    let mut attempt = 0;
    loop {
        match fetch_once(entry, reference, fetcher, semaphore, options.fetch_timeout).await {
            Err(failure) if failure.is_transient() && attempt < options.fetch_retries => {
                let delay = options.backoff(attempt);
                debug!(
                    "retrying {} in {:?} after: {}",
                    entry.identity(),
                    delay,
                    failure
                );
                time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

async fn fetch_once(
    entry: &Entry,
    reference: &OciReference,
    fetcher: &Arc<dyn ArtifactFetcher>,
    semaphore: &Arc<Semaphore>,
    timeout: Duration,
) -> Result<ImageConfig, Failure> {
    let permit = Arc::clone(semaphore).acquire_owned().await.map_err(|err| {
        Failure::new(
            FailureKind::FetchFailed,
            format!("no fetch slot for {}: {err}", entry.address),
        )
    })?;

    debug!("fetching config for {reference}");
    let fetcher = Arc::clone(fetcher);
    let reference = reference.clone();
    // The permit lives as long as the blocking fetch, even after a timeout.
    let task = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        fetcher.fetch_config(&reference)
    });

    match time::timeout(timeout, task).await {
        Ok(Ok(result)) => result.map_err(|err| Failure::fetch(&entry.address, &err)),
        Ok(Err(err)) => {
            Err(Failure::new(
                FailureKind::FetchFailed,
                format!("fetch task for {} failed: {err}", entry.address),
            ))
        }
        Err(_) => {
            Err(Failure::fetch(
                &entry.address,
                &FetchError::Timeout { after: timeout },
            ))
        }
    }
}

async fn commit<S>(result: EntryResult, sink: &mut S, options: &IndexOptions) -> Outcome
where
    S: IndexSink + ?Sized,
{
    let outcome = match result {
        EntryResult::Failed { entry, failure } => Outcome::Failed { entry, failure },
        EntryResult::Extracted { entry, metadata } => {
            let mut attempt = 0;
            loop {
                match sink.upsert(&entry, &metadata) {
                    Ok(()) => break Outcome::Committed { entry, metadata },
                    Err(err) if attempt < options.sink_retries => {
                        let delay = options.backoff(attempt);
                        debug!(
                            "retrying index update for {} in {:?} after: {}",
                            entry.identity(),
                            delay,
                            err
                        );
                        time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(err) => {
                        break Outcome::Failed {
                            failure: Failure::new(
                                FailureKind::SinkFailed,
                                format!("failed to update index for {}: {err}", entry.identity()),
                            ),
                            entry,
                        };
                    }
                }
            }
        }
    };

    log_outcome(&outcome);
    outcome
}

fn log_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Committed { entry, .. } => {
            info!("updated index for {}", entry.identity());
        }
        Outcome::Failed { entry, failure } => {
            warn!("{} [{}]: {}", entry.identity(), failure.kind, failure.detail);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let options = IndexOptions {
            retry_backoff: Duration::from_millis(100),
            ..Default::default()
        };
        assert_eq!(options.backoff(0), Duration::from_millis(100));
        assert_eq!(options.backoff(1), Duration::from_millis(200));
        assert_eq!(options.backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn test_default_options_never_retry() {
        let options = IndexOptions::default();
        assert_eq!(options.fetch_retries, 0);
        assert_eq!(options.sink_retries, 0);
        assert_eq!(options.default_registry, "index.docker.io");
    }

    #[test]
    fn test_options_from_default_config() {
        let mut config = Config::default_config();
        config.resolve().unwrap();

        let options = IndexOptions::from_config(&config).unwrap();
        assert_eq!(options.parallel_limit, 8);
        assert_eq!(options.fetch_timeout, Duration::from_secs(30));
        assert_eq!(options.batch_deadline, Duration::from_secs(600));
        assert_eq!(options.fetch_retries, 2);
        assert_eq!(options.sink_retries, 1);
        assert_eq!(options.retry_backoff, Duration::from_millis(500));
    }
}
