//! The daily trigger.

use crate::cancellation::CancellationToken;
use crate::pipeline::{Orchestrator, TriggerEvent};
use crate::workers::Worker;
use chrono::{DateTime, Days, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// A fixed time of day, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
}

impl DailySchedule {
    /// Creates a schedule firing at `at` every day.
    #[must_use]
    pub const fn new(at: NaiveTime) -> Self {
        Self { at }
    }

    /// Parses `HH:MM`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem for anything else.
    pub fn parse(raw: &str) -> Result<Self, String> {
        NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .map(Self::new)
            .map_err(|e| format!("expected HH:MM, got '{raw}': {e}"))
    }

    /// Returns the time of day.
    #[must_use]
    pub const fn time(&self) -> NaiveTime {
        self.at
    }

    /// Returns the first fire time strictly after `now`.
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.at).and_utc();
        if today > now {
            today
        } else {
            now.date_naive()
                .checked_add_days(Days::new(1))
                .map_or(today, |d| d.and_time(self.at).and_utc())
        }
    }

    /// Returns how long to wait from `now` until the next fire time.
    #[must_use]
    pub fn until_next(&self, now: DateTime<Utc>) -> Duration {
        (self.next_after(now) - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Fires one trigger per day until `shutdown` is cancelled.
///
/// Each run gets its own cancellation token, bounded by `budget` when set.
/// Shutdown cancels the in-flight run cooperatively and waits for it.
/// Returns the number of triggers fired.
pub async fn run_daily<W: Worker>(
    orchestrator: &Orchestrator<W>,
    schedule: DailySchedule,
    budget: Option<Duration>,
    shutdown: &CancellationToken,
) -> usize {
    let mut fired = 0;
    // Never fire the same slot twice, even if the wall clock steps back.
    let mut floor = Utc::now();

    loop {
        let next = schedule.next_after(Utc::now().max(floor));
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        info!(next = %next, "Waiting for next trigger");

        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            () = shutdown.cancelled() => break,
        }
        floor = next;

        let cancel = Arc::new(CancellationToken::new());
        let budget_guard = budget.map(|b| cancel.cancel_after(b));
        fired += 1;

        let run = orchestrator.trigger(TriggerEvent::scheduled(), &cancel);
        tokio::pin!(run);
        let outcome = tokio::select! {
            outcome = &mut run => outcome,
            () = shutdown.cancelled() => {
                cancel.cancel("Scheduler shutting down");
                run.await
            }
        };
        if let Some(guard) = budget_guard {
            guard.abort();
        }

        match outcome {
            Ok(result) if result.is_success() => {
                info!(run_id = %result.run_id, duration_ms = result.duration_ms, "Scheduled run succeeded");
            }
            Ok(result) => error!(
                run_id = %result.run_id,
                status = %result.status,
                failed_step = result.failed_step.as_deref().unwrap_or(""),
                "Scheduled run did not succeed"
            ),
            Err(rejected) => warn!(error = %rejected, "Scheduled trigger rejected"),
        }

        if shutdown.is_cancelled() {
            break;
        }
    }

    info!(fired, "Scheduler stopped");
    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::default_steps;
    use crate::testing::ScriptedWorker;
    use crate::workers::Capability;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, h, m, 0).unwrap()
    }

    #[test]
    fn test_parse() {
        let schedule = DailySchedule::parse("08:00").unwrap();
        assert_eq!(schedule.time(), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert!(DailySchedule::parse("8am").is_err());
        assert!(DailySchedule::parse("24:00").is_err());
    }

    #[test]
    fn test_next_after_later_today() {
        let schedule = DailySchedule::parse("08:00").unwrap();
        assert_eq!(schedule.next_after(at(7, 30)), at(8, 0));
        assert_eq!(schedule.until_next(at(7, 30)), Duration::from_secs(30 * 60));
    }

    #[test]
    fn test_next_after_rolls_to_tomorrow() {
        let schedule = DailySchedule::parse("08:00").unwrap();
        let tomorrow = Utc.with_ymd_and_hms(2024, 1, 3, 8, 0, 0).unwrap();

        assert_eq!(schedule.next_after(at(8, 0)), tomorrow);
        assert_eq!(schedule.next_after(at(23, 59)), tomorrow);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_daily_fires_once_per_day() {
        let orchestrator = Orchestrator::new("daily", default_steps(), ScriptedWorker::new());
        let schedule = DailySchedule::new((Utc::now() + chrono::Duration::hours(1)).time());
        let shutdown = Arc::new(CancellationToken::new());
        let _stop = shutdown.cancel_after(Duration::from_secs(24 * 3600 - 60));

        let fired = run_daily(&orchestrator, schedule, None, &shutdown).await;

        assert_eq!(fired, 1);
        assert_eq!(
            orchestrator.worker().calls(),
            vec![Capability::Fetch, Capability::Build, Capability::Ping]
        );
    }

    #[tokio::test]
    async fn test_run_daily_stops_on_shutdown() {
        let orchestrator = Orchestrator::new("daily", default_steps(), ScriptedWorker::new());
        let schedule = DailySchedule::parse("08:00").unwrap();
        let shutdown = CancellationToken::new();
        shutdown.cancel("stop");

        assert_eq!(run_daily(&orchestrator, schedule, None, &shutdown).await, 0);
        assert!(orchestrator.worker().calls().is_empty());
    }
}
