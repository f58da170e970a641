use chrono::{Duration, NaiveDateTime};
use rand::Rng;

use crate::app_config::Settings;

/// Return-visit model driving the retention curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Retention {
    pub p_next_day: f64,
    pub p_week: f64,
    pub max_sessions: usize,
    pub lookback_days: u32,
}

impl From<&Settings> for Retention {
    fn from(settings: &Settings) -> Self {
        Self {
            p_next_day: settings.p_return_next_day,
            p_week: settings.p_return_week,
            max_sessions: settings.max_sessions_per_user,
            lookback_days: settings.max_days_ago_signup,
        }
    }
}

fn time_of_day<R: Rng + ?Sized>(rng: &mut R, max_hour: i64) -> Duration {
    Duration::hours(rng.gen_range(0..=max_hour)) + Duration::minutes(rng.gen_range(0..=59))
}

/// Session starts for one user, ascending, between 1 and `max_sessions` long.
///
/// The first session always happens within six hours of signup. A next-day
/// and a within-week return are each drawn independently, then up to the
/// remaining budget of long-tail sessions is spread over the lookback window.
/// Starts are not clipped to the current time here.
pub fn schedule_sessions<R: Rng + ?Sized>(
    rng: &mut R,
    created_at: NaiveDateTime,
    retention: &Retention,
) -> Vec<NaiveDateTime> {
    let mut starts = Vec::with_capacity(3);

    starts.push(created_at + Duration::minutes(rng.gen_range(5..=360)));

    if rng.gen_bool(retention.p_next_day) {
        starts.push(created_at + Duration::days(1) + time_of_day(rng, 3));
    }

    if rng.gen_bool(retention.p_week) {
        starts.push(created_at + Duration::days(rng.gen_range(2..=7)) + time_of_day(rng, 23));
    }

    // a lookback shorter than two days still leaves day 2 for the long tail
    let last_day = i64::from(retention.lookback_days).max(2);
    let extra = rng.gen_range(0..=retention.max_sessions.saturating_sub(starts.len()));
    starts.reserve(extra);
    for _ in 0..extra {
        starts.push(created_at + Duration::days(rng.gen_range(2..=last_day)) + time_of_day(rng, 23));
    }

    starts.sort();
    starts.truncate(retention.max_sessions);
    starts
}
