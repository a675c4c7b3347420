use crate::bundle::pipeline::{BuildError, StageStats};
use crate::model::Concurrency;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Future produced by a [`Job`] once it is started.
pub type JobFuture = Pin<Box<dyn Future<Output = Result<StageStats, BuildError>> + Send>>;

/// Deferred unit of work: nothing runs until the coordinator calls it.
pub type Job = Box<dyn FnOnce() -> JobFuture + Send>;

/// Wraps an async closure as a [`Job`].
pub fn job<F, Fut>(f: F) -> Job
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<StageStats, BuildError>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// Outcome of a batch in which every job succeeded.
#[derive(Debug, Default, Clone)]
pub struct BatchOutcome {
    /// Stats of each job, in completion order
    pub stages: Vec<StageStats>,

    pub duration_ms: u64,
}

type Running = JoinSet<(usize, Result<StageStats, BuildError>)>;

/// Settled flag plus the first error. Errors after settling are logged and counted.
struct Settle {
    settled: bool,
    first_error: Option<BuildError>,
    discarded: Arc<AtomicUsize>,
}

impl Settle {
    fn new(discarded: Arc<AtomicUsize>) -> Self {
        Self {
            settled: false,
            first_error: None,
            discarded,
        }
    }

    fn is_failed(&self) -> bool {
        self.settled
    }

    fn record(&mut self, err: BuildError) {
        if self.settled {
            warn!(error = %err, "Discarding error from job after batch failure");
            self.discarded.fetch_add(1, Ordering::SeqCst);
            return;
        }
        self.settled = true;
        self.first_error = Some(err);
    }
}

/// Observes jobs still running after the batch failed, until the last one ends.
async fn drain(mut running: Running, mut settle: Settle) {
    while let Some(joined) = running.join_next().await {
        match joined {
            Ok((index, Ok(_))) => debug!(job = index, "Discarding result of job after batch failure"),
            Ok((_, Err(err))) => settle.record(err),
            Err(e) => settle.record(BuildError::Join(e.to_string())),
        }
    }
}

/// Runs a list of jobs under a [`Concurrency`] policy and settles once.
///
/// Jobs are started in list order whenever a slot is free. After the first
/// failure no further job is started. Jobs already in flight keep running in
/// a background task that logs their errors at `warn` and otherwise drops them.
pub struct BatchCoordinator {
    concurrency: Concurrency,
    discarded: Arc<AtomicUsize>,
}

impl BatchCoordinator {
    pub fn new(concurrency: Concurrency) -> Self {
        Self {
            concurrency,
            discarded: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Errors seen so far from jobs that ended after their batch had failed.
    pub fn discarded_errors(&self) -> usize {
        self.discarded.load(Ordering::SeqCst)
    }

    #[instrument(skip(self, jobs), fields(jobs = jobs.len(), concurrency = ?self.concurrency))]
    pub async fn run(&self, jobs: Vec<Job>) -> Result<BatchOutcome, BuildError> {
        let start = Instant::now();
        let semaphore = self.concurrency.limit().map(|n| Arc::new(Semaphore::new(n)));

        let mut outcome = BatchOutcome::default();
        let mut settle = Settle::new(Arc::clone(&self.discarded));
        let mut running: Running = JoinSet::new();
        let mut pending = jobs.into_iter().enumerate();

        loop {
            // Start as many jobs as the policy allows.
            while !settle.is_failed() {
                let permit = match &semaphore {
                    Some(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                    None => None,
                };
                let Some((index, job)) = pending.next() else {
                    break;
                };

                debug!(job = index, "Starting job");
                running.spawn(async move {
                    let result = job().await;
                    drop(permit);
                    (index, result)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };

            match joined {
                Ok((index, Ok(stats))) => {
                    debug!(job = index, group = %stats.group, "Job finished");
                    outcome.stages.push(stats);
                }
                Ok((index, Err(err))) => {
                    debug!(job = index, error = %err, "Job failed");
                    settle.record(err);
                }
                Err(e) => settle.record(BuildError::Join(e.to_string())),
            }

            if settle.is_failed() {
                break;
            }
        }

        if let Some(err) = settle.first_error.take() {
            if !running.is_empty() {
                debug!(in_flight = running.len(), "Draining in-flight jobs in the background");
                tokio::spawn(drain(running, settle));
            }
            return Err(err);
        }

        outcome.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            jobs = outcome.stages.len(),
            duration_ms = outcome.duration_ms,
            "Batch completed"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    fn stats(group: &str) -> StageStats {
        StageStats {
            group: group.to_string(),
            ..StageStats::default()
        }
    }

    fn fail(name: &str) -> BuildError {
        BuildError::Sink {
            path: PathBuf::from(name),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        }
    }

    fn recorded(log: &Log, name: &'static str, delay_ms: u64, ok: bool) -> Job {
        let log = Arc::clone(log);
        job(move || async move {
            log.lock().unwrap().push(format!("{name}:start"));
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            log.lock().unwrap().push(format!("{name}:end"));
            if ok {
                Ok(stats(name))
            } else {
                Err(fail(name))
            }
        })
    }

    #[tokio::test]
    async fn test_empty_batch_succeeds() {
        let outcome = BatchCoordinator::new(Concurrency::Sequential)
            .run(Vec::new())
            .await
            .unwrap();
        assert!(outcome.stages.is_empty());
    }

    #[tokio::test]
    async fn test_sequential_order() {
        let log = Log::default();
        let jobs = vec![
            recorded(&log, "a", 30, true),
            recorded(&log, "b", 0, true),
            recorded(&log, "c", 10, true),
        ];

        let outcome = BatchCoordinator::new(Concurrency::Sequential)
            .run(jobs)
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:start", "a:end", "b:start", "b:end", "c:start", "c:end"]
        );
        let groups: Vec<_> = outcome.stages.iter().map(|s| s.group.as_str()).collect();
        assert_eq!(groups, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_sequential_failure_stops_scheduling() {
        let log = Log::default();
        let jobs = vec![
            recorded(&log, "a", 0, false),
            recorded(&log, "b", 0, true),
        ];

        let err = BatchCoordinator::new(Concurrency::Sequential)
            .run(jobs)
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::Sink { ref path, .. } if path == &PathBuf::from("a")));
        assert_eq!(*log.lock().unwrap(), vec!["a:start", "a:end"]);
    }

    #[tokio::test]
    async fn test_parallel_starts_everything() {
        let log = Log::default();
        let jobs = vec![
            recorded(&log, "a", 40, true),
            recorded(&log, "b", 40, true),
        ];

        BatchCoordinator::new(Concurrency::Parallel)
            .run(jobs)
            .await
            .unwrap();

        let log = log.lock().unwrap();
        let first_end = log.iter().position(|e| e.ends_with(":end")).unwrap();
        assert_eq!(first_end, 2, "both jobs should start before either ends: {log:?}");
    }

    #[tokio::test]
    async fn test_first_error_wins() {
        let log = Log::default();
        let jobs = vec![
            recorded(&log, "slow", 80, false),
            recorded(&log, "fast", 5, false),
            recorded(&log, "ok", 0, true),
        ];

        let err = BatchCoordinator::new(Concurrency::Parallel)
            .run(jobs)
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::Sink { ref path, .. } if path == &PathBuf::from("fast")));
    }

    #[tokio::test]
    async fn test_late_errors_are_observed_after_failure() {
        let log = Log::default();
        let jobs = vec![
            recorded(&log, "first", 0, false),
            recorded(&log, "late_ok", 10, true),
            recorded(&log, "late", 30, false),
        ];

        let coordinator = BatchCoordinator::new(Concurrency::Parallel);
        let err = coordinator.run(jobs).await.unwrap_err();

        assert!(matches!(err, BuildError::Sink { ref path, .. } if path == &PathBuf::from("first")));
        assert_eq!(coordinator.discarded_errors(), 0);

        tokio::time::sleep(Duration::from_millis(150)).await;

        let log = log.lock().unwrap();
        assert!(log.contains(&"late:end".to_string()), "late job should finish: {log:?}");
        assert_eq!(coordinator.discarded_errors(), 1);
    }

    #[tokio::test]
    async fn test_limited_concurrency_bound() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<Job> = (0..6)
            .map(|_| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                job(move || async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(stats("x"))
                })
            })
            .collect();

        let outcome = BatchCoordinator::new(Concurrency::Limited(2))
            .run(jobs)
            .await
            .unwrap();

        assert_eq!(outcome.stages.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_panicking_job_is_an_error() {
        let jobs = vec![job(|| async {
            if true {
                panic!("compiler crashed");
            }
            Ok(stats("unreachable"))
        })];

        let err = BatchCoordinator::new(Concurrency::Sequential)
            .run(jobs)
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::Join(_)));
    }
}
