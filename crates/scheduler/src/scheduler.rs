use anyhow::Result;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_trade_core::Clock;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Minimum period accepted for interval jobs.
pub const MIN_INTERVAL: Duration = Duration::from_secs(5);

/// How often the scheduling loop wakes to evaluate jobs.
const POLL_GRANULARITY: Duration = Duration::from_secs(5);

/// Bounded wait when joining the loop task on shutdown.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Boxed future returned by job closures.
pub type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type JobFn = Box<dyn Fn() -> JobFuture + Send + Sync>;

enum Cadence {
    Interval {
        period: chrono::Duration,
        next_run: DateTime<Utc>,
    },
    Daily {
        fire_at_secs: u32,
        done_today: bool,
        first_eval: bool,
        day: NaiveDate,
    },
}

struct Job {
    name: String,
    cadence: Cadence,
    run: JobFn,
}

/// Runs registered jobs on either a fixed interval or a once-daily
/// schedule. Knows nothing about trading; an instance is owned by
/// whoever needs background work, never shared globally.
///
/// Interval jobs first run one full period after registration and are
/// rescheduled after every run regardless of outcome. Daily jobs fire at
/// most once per calendar day, the first time the wall clock passes the
/// configured hour; a job registered after its hour has already passed
/// skips the registration day entirely and first fires the next day.
pub struct TaskScheduler {
    clock: Arc<dyn Clock>,
    jobs: Arc<Mutex<Vec<Job>>>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TaskScheduler {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            clock,
            jobs: Arc::new(Mutex::new(Vec::new())),
            running: AtomicBool::new(false),
            shutdown_tx,
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Registers a job that runs every `period`.
    ///
    /// # Errors
    /// Rejects periods shorter than [`MIN_INTERVAL`].
    pub async fn add_interval_job<F>(&self, name: &str, period: Duration, run: F) -> Result<()>
    where
        F: Fn() -> JobFuture + Send + Sync + 'static,
    {
        if period < MIN_INTERVAL {
            anyhow::bail!(
                "interval for job '{name}' must be at least {}s, got {}s",
                MIN_INTERVAL.as_secs(),
                period.as_secs()
            );
        }
        let period = chrono::Duration::from_std(period)?;
        let job = Job {
            name: name.to_string(),
            cadence: Cadence::Interval {
                period,
                next_run: self.clock.now() + period,
            },
            run: Box::new(run),
        };
        self.jobs.lock().await.push(job);
        info!("registered interval job '{name}'");
        Ok(())
    }

    /// Registers a job that runs once a day at `hour` o'clock.
    ///
    /// # Errors
    /// Rejects hours outside [0, 24).
    pub async fn add_daily_job<F>(&self, name: &str, hour: u32, run: F) -> Result<()>
    where
        F: Fn() -> JobFuture + Send + Sync + 'static,
    {
        if hour >= 24 {
            anyhow::bail!("daily hour for job '{name}' must be in [0, 24), got {hour}");
        }
        let now = self.clock.now();
        let job = Job {
            name: name.to_string(),
            cadence: Cadence::Daily {
                fire_at_secs: hour * 3600,
                done_today: false,
                first_eval: true,
                day: now.date_naive(),
            },
            run: Box::new(run),
        };
        self.jobs.lock().await.push(job);
        info!("registered daily job '{name}' at hour {hour}");
        Ok(())
    }

    /// Starts the scheduling loop. Returns false (with a warning) if the
    /// loop is already running; at most one loop task ever exists.
    pub fn start(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running, ignoring start");
            return false;
        }

        let jobs = Arc::clone(&self.jobs);
        let clock = Arc::clone(&self.clock);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                run_pending_jobs(&jobs, clock.now()).await;
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    () = tokio::time::sleep(POLL_GRANULARITY) => {}
                }
            }
            debug!("scheduler loop exited");
        });
        *self.handle.lock().unwrap() = Some(handle);
        info!("scheduler started");
        true
    }

    /// Stops the loop and joins it with a bounded wait.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        let handle = self.handle.lock().unwrap().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_TIMEOUT, handle).await.is_err() {
                warn!("scheduler loop did not stop within {STOP_TIMEOUT:?}");
            }
        }
        info!("scheduler stopped");
    }

    /// Evaluates every registered job against `now`, running the ones
    /// that are due. Public so tests and startup code can drive the
    /// schedule without the background loop.
    pub async fn run_pending(&self, now: DateTime<Utc>) {
        run_pending_jobs(&self.jobs, now).await;
    }
}

async fn run_pending_jobs(jobs: &Mutex<Vec<Job>>, now: DateTime<Utc>) {
    let mut jobs = jobs.lock().await;
    for job in jobs.iter_mut() {
        match &mut job.cadence {
            Cadence::Interval { period, next_run } => {
                if now >= *next_run {
                    run_isolated(&job.name, &job.run).await;
                    *next_run = now + *period;
                }
            }
            Cadence::Daily {
                fire_at_secs,
                done_today,
                first_eval,
                day,
            } => {
                let today = now.date_naive();
                let elapsed_secs = now.time().num_seconds_from_midnight();

                if *day != today {
                    *day = today;
                    *done_today = false;
                }

                // A job registered after its hour has passed sits out the
                // rest of the registration day; without this, a restart
                // shortly after the target hour would re-fire the job.
                if *first_eval {
                    *first_eval = false;
                    if elapsed_secs >= *fire_at_secs {
                        *done_today = true;
                        debug!(
                            "daily job '{}' registered past its hour, waiting for next day",
                            job.name
                        );
                        continue;
                    }
                }

                if !*done_today && elapsed_secs >= *fire_at_secs {
                    run_isolated(&job.name, &job.run).await;
                    *done_today = true;
                }
            }
        }
    }
}

/// Runs one job invocation; failures are logged with the job name and
/// never escape to the loop or the other jobs.
async fn run_isolated(name: &str, run: &JobFn) {
    match run().await {
        Ok(()) => debug!("job '{name}' completed"),
        Err(e) => error!("job '{name}' failed: {e:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;
    use surge_trade_core::ManualClock;

    fn clock_at(hour: u32, min: u32) -> Arc<ManualClock> {
        let start = Utc.with_ymd_and_hms(2024, 3, 7, hour, min, 0).unwrap();
        Arc::new(ManualClock::new(start))
    }

    fn counting_job(counter: Arc<AtomicUsize>) -> impl Fn() -> JobFuture + Send + Sync {
        move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn interval_below_minimum_is_rejected() {
        let clock = clock_at(9, 0);
        let scheduler = TaskScheduler::new(clock);
        let result = scheduler
            .add_interval_job("too-fast", Duration::from_secs(2), || {
                Box::pin(async { Ok(()) })
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn daily_hour_out_of_range_is_rejected() {
        let clock = clock_at(9, 0);
        let scheduler = TaskScheduler::new(clock);
        let result = scheduler
            .add_daily_job("late", 24, || Box::pin(async { Ok(()) }))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn interval_job_runs_one_period_after_registration() {
        let clock = clock_at(9, 0);
        let scheduler = TaskScheduler::new(Arc::clone(&clock) as Arc<dyn Clock>);
        let count = Arc::new(AtomicUsize::new(0));
        scheduler
            .add_interval_job("tick", Duration::from_secs(10), counting_job(count.clone()))
            .await
            .unwrap();

        scheduler.run_pending(clock.now()).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        clock.advance_secs(10);
        scheduler.run_pending(clock.now()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Not yet due again.
        clock.advance_secs(5);
        scheduler.run_pending(clock.now()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        clock.advance_secs(5);
        scheduler.run_pending(clock.now()).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn interval_job_reschedules_after_failure() {
        let clock = clock_at(9, 0);
        let scheduler = TaskScheduler::new(Arc::clone(&clock) as Arc<dyn Clock>);
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_in_job = Arc::clone(&attempts);
        scheduler
            .add_interval_job("flaky", Duration::from_secs(10), move || {
                let attempts = Arc::clone(&attempts_in_job);
                Box::pin(async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("boom")
                })
            })
            .await
            .unwrap();

        clock.advance_secs(10);
        scheduler.run_pending(clock.now()).await;
        clock.advance_secs(10);
        scheduler.run_pending(clock.now()).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_job_does_not_block_other_jobs() {
        let clock = clock_at(9, 0);
        let scheduler = TaskScheduler::new(Arc::clone(&clock) as Arc<dyn Clock>);
        scheduler
            .add_interval_job("broken", Duration::from_secs(10), || {
                Box::pin(async { anyhow::bail!("boom") })
            })
            .await
            .unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        scheduler
            .add_interval_job(
                "healthy",
                Duration::from_secs(10),
                counting_job(count.clone()),
            )
            .await
            .unwrap();

        clock.advance_secs(10);
        scheduler.run_pending(clock.now()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn daily_job_fires_once_when_hour_passes() {
        let clock = clock_at(7, 0);
        let scheduler = TaskScheduler::new(Arc::clone(&clock) as Arc<dyn Clock>);
        let count = Arc::new(AtomicUsize::new(0));
        scheduler
            .add_daily_job("refresh", 8, counting_job(count.clone()))
            .await
            .unwrap();

        scheduler.run_pending(clock.now()).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        clock.advance_secs(3600);
        scheduler.run_pending(clock.now()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Repeated evaluations the same day do not re-fire.
        clock.advance_secs(3600);
        scheduler.run_pending(clock.now()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn daily_job_registered_past_its_hour_waits_for_next_day() {
        // Hour-0 job registered at 01:00: no fire until the next day.
        let clock = clock_at(1, 0);
        let scheduler = TaskScheduler::new(Arc::clone(&clock) as Arc<dyn Clock>);
        let count = Arc::new(AtomicUsize::new(0));
        scheduler
            .add_daily_job("midnight", 0, counting_job(count.clone()))
            .await
            .unwrap();

        scheduler.run_pending(clock.now()).await;
        scheduler.run_pending(clock.now()).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Cross midnight into the next calendar day.
        clock.advance_secs(23 * 3600);
        scheduler.run_pending(clock.now()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn daily_job_fires_again_on_following_days() {
        let clock = clock_at(7, 0);
        let scheduler = TaskScheduler::new(Arc::clone(&clock) as Arc<dyn Clock>);
        let count = Arc::new(AtomicUsize::new(0));
        scheduler
            .add_daily_job("refresh", 8, counting_job(count.clone()))
            .await
            .unwrap();

        clock.advance_secs(3600);
        scheduler.run_pending(clock.now()).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        clock.advance_secs(24 * 3600);
        scheduler.run_pending(clock.now()).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let clock = clock_at(9, 0);
        let scheduler = TaskScheduler::new(Arc::clone(&clock) as Arc<dyn Clock>);
        assert!(scheduler.start());
        assert!(!scheduler.start());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_without_start_is_harmless() {
        let clock = clock_at(9, 0);
        let scheduler = TaskScheduler::new(Arc::clone(&clock) as Arc<dyn Clock>);
        scheduler.stop().await;
    }
}
