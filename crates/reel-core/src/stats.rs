//! Watch statistics derived from the session log.
//!
//! Everything here is recomputed on demand; only raw sessions are persisted.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, Utc};

use crate::config::{MOST_WATCHED_LIMIT, STREAK_CALENDAR_DAYS, WATCH_HISTORY_LIMIT};
use crate::error::ReelError;
use crate::storage::{HistoryRow, Storage};

/// Streak level thresholds (minutes) used before enough history exists.
pub const DEFAULT_STREAK_THRESHOLDS: [i64; 5] = [0, 15, 30, 60, 120];

/// Aggregated watch statistics.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub total_watch_secs: f64,
    /// (title, seconds) ranked by watch time.
    pub most_watched: Vec<(String, f64)>,
    /// Date string → minutes watched.
    pub streak_calendar: BTreeMap<String, i64>,
    pub weekly_watch_secs: f64,
    /// Average seconds per day with any activity.
    pub daily_average_secs: f64,
    /// Hour of day (0-23) → minutes watched.
    pub viewing_patterns: BTreeMap<u32, f64>,
    pub library_size: u32,
    pub recent: Vec<HistoryRow>,
    streak_thresholds: [i64; 5],
}

impl StatsSnapshot {
    /// Compute the full snapshot from storage.
    pub fn compute(storage: &Storage) -> Result<Self, ReelError> {
        let streak_calendar = storage.streak_calendar(STREAK_CALENDAR_DAYS)?;
        let today = Utc::now().date_naive();

        Ok(Self {
            total_watch_secs: storage.total_watch_secs()?,
            most_watched: storage.most_watched(MOST_WATCHED_LIMIT)?,
            weekly_watch_secs: weekly_total_minutes(&streak_calendar, today) as f64 * 60.0,
            daily_average_secs: daily_average_minutes(&streak_calendar) * 60.0,
            viewing_patterns: storage.viewing_patterns()?,
            library_size: storage.count_items()?,
            recent: storage.recent_sessions(WATCH_HISTORY_LIMIT)?,
            streak_thresholds: dynamic_thresholds(&streak_calendar),
            streak_calendar,
        })
    }

    /// Consecutive days with activity, counting back from today. Today is
    /// allowed to be empty so an evening-watcher's streak survives until
    /// midnight.
    pub fn current_streak(&self, today: NaiveDate) -> u32 {
        current_streak(&self.streak_calendar, today)
    }

    /// Map minutes watched to a heatmap level (0-4).
    pub fn streak_level(&self, minutes: i64) -> u8 {
        if minutes == 0 {
            0
        } else if minutes < self.streak_thresholds[2] {
            1
        } else if minutes < self.streak_thresholds[3] {
            2
        } else if minutes < self.streak_thresholds[4] {
            3
        } else {
            4
        }
    }
}

/// Streak thresholds from the user's own history: percentiles (25/50/75/90)
/// of non-zero daily watch minutes, or the defaults when history is thin.
pub fn dynamic_thresholds(calendar: &BTreeMap<String, i64>) -> [i64; 5] {
    let mut daily: Vec<i64> = calendar.values().copied().filter(|&m| m > 0).collect();
    if daily.len() < 5 {
        return DEFAULT_STREAK_THRESHOLDS;
    }
    daily.sort_unstable();

    let percentile = |p: usize| {
        let idx = daily.len() * p / 100;
        daily[idx.min(daily.len() - 1)]
    };

    [
        0,
        percentile(25).max(1),
        percentile(50),
        percentile(75),
        percentile(90),
    ]
}

fn current_streak(calendar: &BTreeMap<String, i64>, today: NaiveDate) -> u32 {
    let watched = |date: NaiveDate| {
        calendar
            .get(&date.format("%Y-%m-%d").to_string())
            .is_some_and(|&m| m > 0)
    };

    let mut day = if watched(today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut streak = 0;
    while watched(day) {
        streak += 1;
        day -= Duration::days(1);
    }
    streak
}

fn weekly_total_minutes(calendar: &BTreeMap<String, i64>, today: NaiveDate) -> i64 {
    (0..7)
        .map(|i| today - Duration::days(i))
        .filter_map(|d| calendar.get(&d.format("%Y-%m-%d").to_string()))
        .sum()
}

fn daily_average_minutes(calendar: &BTreeMap<String, i64>) -> f64 {
    let active: Vec<i64> = calendar.values().copied().filter(|&m| m > 0).collect();
    if active.is_empty() {
        return 0.0;
    }
    active.iter().sum::<i64>() as f64 / active.len() as f64
}

/// Format seconds as a compact human-readable duration.
pub fn format_watch_time(seconds: f64) -> String {
    let seconds = seconds.max(0.0) as u64;
    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn calendar(days: &[(&str, i64)]) -> BTreeMap<String, i64> {
        days.iter().map(|(d, m)| (d.to_string(), *m)).collect()
    }

    #[test]
    fn test_current_streak_counts_back() {
        let cal = calendar(&[
            ("2026-08-05", 30),
            ("2026-08-06", 45),
            ("2026-08-07", 20),
        ]);
        assert_eq!(current_streak(&cal, date("2026-08-07")), 3);
    }

    #[test]
    fn test_current_streak_allows_empty_today() {
        let cal = calendar(&[("2026-08-05", 30), ("2026-08-06", 45)]);
        // Nothing watched today yet; yesterday's streak still counts.
        assert_eq!(current_streak(&cal, date("2026-08-07")), 2);
    }

    #[test]
    fn test_current_streak_broken_by_gap() {
        let cal = calendar(&[("2026-08-03", 30), ("2026-08-06", 45), ("2026-08-07", 10)]);
        assert_eq!(current_streak(&cal, date("2026-08-07")), 2);
    }

    #[test]
    fn test_current_streak_empty_calendar() {
        assert_eq!(current_streak(&BTreeMap::new(), date("2026-08-07")), 0);
    }

    #[test]
    fn test_weekly_total_window() {
        let cal = calendar(&[
            ("2026-08-07", 10),
            ("2026-08-03", 20),
            ("2026-08-01", 40), // 6 days back, inside the window
            ("2026-07-30", 99), // outside
        ]);
        assert_eq!(weekly_total_minutes(&cal, date("2026-08-07")), 70);
    }

    #[test]
    fn test_daily_average_ignores_empty_days() {
        let cal = calendar(&[("2026-08-05", 30), ("2026-08-06", 0), ("2026-08-07", 60)]);
        assert!((daily_average_minutes(&cal) - 45.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_thresholds_default_with_thin_history() {
        let cal = calendar(&[("2026-08-06", 30), ("2026-08-07", 60)]);
        assert_eq!(dynamic_thresholds(&cal), DEFAULT_STREAK_THRESHOLDS);
    }

    #[test]
    fn test_thresholds_from_percentiles() {
        let cal = calendar(&[
            ("2026-08-01", 10),
            ("2026-08-02", 20),
            ("2026-08-03", 30),
            ("2026-08-04", 40),
            ("2026-08-05", 50),
            ("2026-08-06", 60),
            ("2026-08-07", 70),
            ("2026-08-08", 80),
        ]);
        let thresholds = dynamic_thresholds(&cal);
        assert_eq!(thresholds[0], 0);
        assert_eq!(thresholds[2], 50); // median of 8 values, upper-index pick
        assert!(thresholds[1] <= thresholds[2]);
        assert!(thresholds[3] <= thresholds[4]);
    }

    #[test]
    fn test_format_watch_time() {
        assert_eq!(format_watch_time(42.0), "42s");
        assert_eq!(format_watch_time(150.0), "2m");
        assert_eq!(format_watch_time(5400.0), "1h 30m");
        assert_eq!(format_watch_time(90000.0), "1d 1h");
    }
}
