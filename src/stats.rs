use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tracing::{debug, warn};

use crate::models::DashboardStats;
use crate::store::StateStore;

/// Wall-clock period between study-time ticks while a feature is open.
pub const STUDY_TICK_PERIOD: Duration = Duration::from_secs(60);

/// Update the streak counter for a qualifying activity on `today`.
///
/// The streak grows by one the first time activity lands on the calendar
/// date immediately after the last recorded one, resets to 1 after a gap,
/// and is untouched by repeated activity on the same date.
pub fn record_activity(
    stats: &mut DashboardStats,
    last_activity: &mut Option<NaiveDate>,
    today: NaiveDate,
) {
    match *last_activity {
        None => stats.streak_days = 1,
        Some(last) if today == last => return,
        Some(last) if today < last => {
            // Clock moved backwards; keep the recorded date and streak.
            debug!(%today, %last, "activity date earlier than last recorded, ignoring");
            return;
        }
        Some(last) if today == last + chrono::Duration::days(1) => {
            stats.streak_days += 1;
        }
        Some(_) => stats.streak_days = 1,
    }
    *last_activity = Some(today);
}

/// Scheduled study-time tick, running only while the owning feature is in
/// the foreground. Dropping or stopping the ticker cancels the task, so no
/// minutes accrue for a backgrounded feature.
pub struct StudyTicker {
    handle: tokio::task::JoinHandle<()>,
}

impl StudyTicker {
    pub fn start(store: Arc<StateStore>) -> Self {
        Self::start_with_period(store, STUDY_TICK_PERIOD)
    }

    pub fn start_with_period(store: Arc<StateStore>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick of a tokio interval fires immediately; a
            // minute counts only after it has elapsed.
            interval.tick().await;
            loop {
                interval.tick().await;
                let today = Local::now().date_naive();
                // A failed tick is dropped, not fatal; the ticker only ends
                // when it is stopped or dropped.
                if let Err(e) = store.increment_study_time(1, today) {
                    warn!(error = %e, "study tick not recorded");
                }
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for StudyTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
