//! Bounded worker pool for bucket syncs

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, Instrument};

use super::BucketResult;
use crate::relay::{SyncRunner, SyncUnit};

/// Sync every unit with at most `concurrency` in flight
///
/// Failures are captured per bucket; results come back in input order.
/// Dropping the returned future aborts the workers, and with them any
/// relay process they started.
pub(crate) async fn sync_all(
    relay: Arc<dyn SyncRunner>,
    units: Vec<SyncUnit>,
    concurrency: usize,
) -> Vec<BucketResult> {
    let started = Instant::now();
    let semaphore = Arc::new(Semaphore::new(concurrency.clamp(1, Semaphore::MAX_PERMITS)));

    let mut results: Vec<BucketResult> = units
        .iter()
        .map(|unit| BucketResult {
            bucket: unit.bucket.clone(),
            error: Some("worker did not complete".to_string()),
            duration: Duration::ZERO,
        })
        .collect();

    let mut workers = JoinSet::new();
    for (index, unit) in units.into_iter().enumerate() {
        let relay = Arc::clone(&relay);
        let semaphore = Arc::clone(&semaphore);

        workers.spawn(
            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, Some("worker pool closed".to_string()), Duration::ZERO),
                };

                info!(bucket = %unit.bucket, source = %unit.source, dest = %unit.dest, "Syncing bucket");
                let start = Instant::now();
                let outcome = relay.sync_bucket(&unit).await;
                let duration = start.elapsed();

                match outcome {
                    Ok(()) => {
                        info!(
                            bucket = %unit.bucket,
                            duration_ms = duration.as_millis(),
                            "Bucket synced"
                        );
                        (index, None, duration)
                    }
                    Err(e) => {
                        error!(
                            bucket = %unit.bucket,
                            source = %unit.source,
                            dest = %unit.dest,
                            error = %e,
                            "Failed to sync bucket"
                        );
                        (index, Some(e.to_string()), duration)
                    }
                }
            }
            .in_current_span(),
        );
    }

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((index, error, duration)) => {
                if let Some(slot) = results.get_mut(index) {
                    slot.error = error;
                    slot.duration = duration;
                }
            }
            Err(e) => error!(error = %e, "Sync worker panicked"),
        }
    }

    let failed = results.iter().filter(|r| !r.is_success()).count();
    debug!(
        total = results.len(),
        failed,
        duration_ms = started.elapsed().as_millis(),
        "Sync batch finished"
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackupError, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRelay {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SyncRunner for CountingRelay {
        async fn sync_bucket(&self, unit: &SyncUnit) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.seen.lock().push(unit.bucket.clone());
            if unit.bucket.starts_with("bad") {
                return Err(BackupError::SyncFailed {
                    bucket: unit.bucket.clone(),
                    reason: "exit status 1".to_string(),
                });
            }
            Ok(())
        }

        async fn upload_file(&self, _: &Path, _: &str, _: &str) -> Result<()> {
            Ok(())
        }

        async fn download_file(&self, _: &str, name: &str, dir: &Path, _: Option<&str>) -> Result<PathBuf> {
            Ok(dir.join(name))
        }

        async fn list_buckets(&self, _: &str, _: Option<&str>) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn units(names: &[&str]) -> Vec<SyncUnit> {
        names.iter().map(|n| SyncUnit::new(*n, "source", "crypt")).collect()
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let relay = Arc::new(CountingRelay::default());
        let results = sync_all(relay.clone(), units(&["a", "b", "c", "d", "e", "f"]), 2).await;

        assert_eq!(results.len(), 6);
        assert!(relay.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(relay.seen.lock().len(), 6);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_batch() {
        let relay = Arc::new(CountingRelay::default());
        let results = sync_all(relay, units(&["a", "bad-b", "c"]), 1).await;

        let names: Vec<&str> = results.iter().map(|r| r.bucket.as_str()).collect();
        assert_eq!(names, vec!["a", "bad-b", "c"]);
        assert!(results[0].is_success());
        assert!(!results[1].is_success());
        assert!(results[2].is_success());
    }

    #[tokio::test]
    async fn test_oversized_concurrency_is_clamped() {
        let relay = Arc::new(CountingRelay::default());
        let results = sync_all(relay, units(&["a", "b"]), usize::MAX).await;
        assert!(results.iter().all(BucketResult::is_success));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let relay = Arc::new(CountingRelay::default());
        assert!(sync_all(relay, Vec::new(), 4).await.is_empty());
    }
}
