//! Recurring trigger for sync cycles
//!
//! Two modes: a fixed interval, or minute 0 of every hour inside a local
//! working-hours window. The next fire time is computed after each cycle
//! returns, so a long cycle delays the next one instead of overlapping it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Timelike};
use ivd_common::config::{ScheduleConfig, ScheduleMode};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::runner::{RunError, SyncRunner};

/// When cycles fire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    Interval(Duration),
    /// Inclusive hour window, local time
    Hourly { start_hour: u32, end_hour: u32 },
}

impl Schedule {
    pub fn from_config(config: &ScheduleConfig) -> Self {
        match config.mode {
            ScheduleMode::Interval => {
                Schedule::Interval(Duration::from_secs(config.interval_minutes.max(1) * 60))
            }
            ScheduleMode::Hourly => Schedule::Hourly {
                start_hour: config.start_hour.min(23),
                end_hour: config.end_hour.min(23),
            },
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Schedule::Interval(every) => format!("every {} minute(s)", every.as_secs() / 60),
            Schedule::Hourly {
                start_hour,
                end_hour,
            } => format!("hourly from {}:00 to {}:00", start_hour, end_hour),
        }
    }

    /// First fire time strictly after `now`
    pub fn next_fire_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        match self {
            Schedule::Interval(every) => {
                now.clone() + chrono::Duration::milliseconds(every.as_millis() as i64)
            }
            Schedule::Hourly {
                start_hour,
                end_hour,
            } => {
                let tz = now.timezone();
                let one_hour = chrono::Duration::hours(1);
                let mut candidate = truncate_to_hour(now.naive_local()) + one_hour;

                // Two days always contains a window hour
                for _ in 0..48 {
                    if (*start_hour..=*end_hour).contains(&candidate.hour()) {
                        // Skips local times that do not exist (DST gap)
                        if let Some(fire) = tz.from_local_datetime(&candidate).earliest() {
                            if fire > *now {
                                return fire;
                            }
                        }
                    }
                    candidate += one_hour;
                }

                now.clone() + one_hour
            }
        }
    }
}

fn truncate_to_hour(time: NaiveDateTime) -> NaiveDateTime {
    time.date().and_hms_opt(time.hour(), 0, 0).unwrap_or(time)
}

/// Fires the runner according to a schedule until cancelled
pub struct Scheduler {
    runner: Arc<SyncRunner>,
    schedule: Schedule,
}

impl Scheduler {
    pub fn new(runner: Arc<SyncRunner>, schedule: Schedule) -> Self {
        Self { runner, schedule }
    }

    /// Main loop
    ///
    /// Cancellation interrupts the wait between cycles only; a cycle in
    /// flight always runs to completion.
    pub async fn run(self, cancel: CancellationToken) {
        info!(schedule = %self.schedule.describe(), "Scheduler started");

        loop {
            let now = Local::now();
            let next = self.schedule.next_fire_after(&now);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %next.format("%Y-%m-%d %H:%M:%S"), "Next sync cycle scheduled");

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            // Busy means a manual run holds the slot; the runner logged it
            if let Err(RunError::Task(e)) = self.runner.try_run_cycle().await {
                error!(error = %e, "Sync cycle task ended abnormally");
            }
        }
    }
}
