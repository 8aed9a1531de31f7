//! Daily job scheduling.
//!
//! Owns the recurring timer and the single in-flight guard. Both the timer
//! and the manual trigger funnel into the same guarded job; a trigger that
//! arrives while a run is in flight is dropped, not queued.

use crate::calculator::{generate_report, previous_month};
use crate::config::{DaemonConfig, ReportConfig};
use crate::error::{DaemonError, Result};
use crate::notifier::Notifier;
use crate::plaid::TransactionSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Interval between scheduler ticks (seconds).
const TICK_INTERVAL_SECS: u64 = 60;

/// When the daily job fires (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySchedule {
    /// Hour of day (0-23, UTC).
    pub hour: u8,
    /// Minute of hour (0-59).
    pub min: u8,
}

impl std::fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "daily at {:02}:{:02} UTC", self.hour, self.min)
    }
}

impl DailySchedule {
    /// Whether the job is due at `now` (epoch seconds) given the epoch
    /// seconds of the last fire. Fires at most once per scheduled slot; a
    /// daemon started after today's slot catches up immediately.
    pub fn is_due(&self, last_fired: Option<u64>, now: u64) -> bool {
        let day_secs = u64::from(self.hour) * 3600 + u64::from(self.min) * 60;
        let today_start = now - (now % 86400);
        let scheduled = today_start + day_secs;

        match last_fired {
            None => now >= scheduled,
            Some(last) => last < scheduled && now >= scheduled,
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failed,
}

/// Record of the most recent completed run. One slot, overwritten each run.
#[derive(Debug, Clone)]
pub struct JobRun {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run completed (success or failure).
    pub completed_at: DateTime<Utc>,
    /// How the run ended.
    pub outcome: RunOutcome,
    /// The failure reason, for failed runs.
    pub last_error: Option<String>,
}

/// Fires the fetch → calculate → notify pipeline once per day and exposes
/// liveness state.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    tick_handle: Mutex<Option<JoinHandle<()>>>,
}

struct SchedulerInner {
    schedule: DailySchedule,
    run_timeout: Duration,
    report: ReportConfig,
    source: Arc<dyn TransactionSource>,
    notifier: Arc<Notifier>,
    running: AtomicBool,
    job_in_flight: AtomicBool,
    last_fired: Mutex<Option<u64>>,
    last_completed: Mutex<Option<JobRun>>,
}

impl Scheduler {
    pub fn new(
        config: &DaemonConfig,
        source: Arc<dyn TransactionSource>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                schedule: DailySchedule {
                    hour: config.schedule.hour,
                    min: config.schedule.min,
                },
                run_timeout: Duration::from_secs(config.schedule.run_timeout_secs),
                report: config.report.clone(),
                source,
                notifier,
                running: AtomicBool::new(false),
                job_in_flight: AtomicBool::new(false),
                last_fired: Mutex::new(None),
                last_completed: Mutex::new(None),
            }),
            tick_handle: Mutex::new(None),
        }
    }

    /// Arm the recurring timer. Idempotent: calling `start` on a running
    /// scheduler is a no-op.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("scheduler already running");
            return;
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            info!(schedule = %inner.schedule, "scheduler started");
            let mut interval =
                tokio::time::interval(Duration::from_secs(TICK_INTERVAL_SECS));
            loop {
                interval.tick().await;
                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }
                SchedulerInner::tick(&inner, now_epoch_secs());
            }
        });

        if let Ok(mut slot) = self.tick_handle.lock() {
            *slot = Some(handle);
        }
    }

    /// Cancel the timer. Safe to call when idle; an in-flight run is left
    /// to finish on its own task (process termination is the deadline).
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.tick_handle.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        info!("scheduler stopped");
    }

    /// Trigger an immediate run, independent of the timer, subject to the
    /// same in-flight guard. Returns the spawned run's handle, or `None`
    /// when a run is already in flight (the trigger is dropped, not queued).
    pub fn run_now(&self) -> Option<JoinHandle<()>> {
        SchedulerInner::spawn_guarded(&self.inner, "manual")
    }

    /// Start time of the most recent completed run. A run still in flight
    /// is not reflected here.
    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.last_run().map(|run| run.started_at)
    }

    /// Full record of the most recent completed run.
    pub fn last_run(&self) -> Option<JobRun> {
        self.inner
            .last_completed
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
    }
}

impl SchedulerInner {
    /// One timer tick: fire the job when the daily slot is due.
    fn tick(inner: &Arc<Self>, now: u64) {
        let due = {
            let Ok(mut last) = inner.last_fired.lock() else {
                return;
            };
            if inner.schedule.is_due(*last, now) {
                *last = Some(now);
                true
            } else {
                false
            }
        };
        if due {
            Self::spawn_guarded(inner, "schedule");
        }
    }

    /// Acquire the in-flight guard and spawn the job on its own task, so a
    /// scheduler shutdown only cancels the timer, never the run.
    fn spawn_guarded(inner: &Arc<Self>, trigger: &str) -> Option<JoinHandle<()>> {
        if inner
            .job_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(trigger, "run already in flight, dropping trigger");
            return None;
        }

        info!(trigger, "starting daily job");
        let inner = Arc::clone(inner);
        Some(tokio::spawn(async move {
            inner.run_job_guarded().await;
        }))
    }

    /// Run the pipeline with the guard held, record the outcome, release
    /// the guard. Every error is caught here; nothing escapes to kill the
    /// scheduler.
    async fn run_job_guarded(&self) {
        let started_at = Utc::now();
        let result = match tokio::time::timeout(self.run_timeout, self.run_pipeline()).await {
            Ok(result) => result,
            Err(_) => Err(DaemonError::Delivery(format!(
                "run exceeded {}s deadline",
                self.run_timeout.as_secs()
            ))),
        };

        let completed_at = Utc::now();
        let run = match &result {
            Ok(()) => {
                info!("daily job completed");
                JobRun {
                    started_at,
                    completed_at,
                    outcome: RunOutcome::Success,
                    last_error: None,
                }
            }
            Err(err) => {
                error!(error = %err, "daily job failed");
                JobRun {
                    started_at,
                    completed_at,
                    outcome: RunOutcome::Failed,
                    last_error: Some(err.to_string()),
                }
            }
        };

        if let Ok(mut slot) = self.last_completed.lock() {
            *slot = Some(run);
        }
        self.job_in_flight.store(false, Ordering::SeqCst);
    }

    /// The full pipeline: fetch both months of transactions, compute the
    /// report, format and deliver it.
    async fn run_pipeline(&self) -> Result<()> {
        let today = Utc::now().date_naive();
        let start = previous_month(today);

        let transactions = self.source.transactions(start, today).await?;
        debug!(count = transactions.len(), "fetched transactions");

        let report = generate_report(&transactions, today, &self.report);
        info!(
            monthly_spent = report.monthly_spent,
            last_month_spent = report.last_month_spent,
            average_daily_last_month = report.average_daily_last_month,
            "spending report computed"
        );

        self.notifier.send_spending_update(&report).await?;
        Ok(())
    }
}

/// Current UTC seconds since epoch.
fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
