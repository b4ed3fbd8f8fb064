//! Display formatting helpers.

use reel_core::models::ResumePoint;
use reel_core::stats;

/// Format a UTC timestamp as a human-readable relative time string.
pub fn relative_time(dt: &chrono::DateTime<chrono::Utc>) -> String {
    let now = chrono::Utc::now();
    let secs = (now - *dt).num_seconds().max(0);

    if secs < 60 {
        "just now".into()
    } else if secs < 3600 {
        let m = secs / 60;
        format!("{m}m ago")
    } else if secs < 86400 {
        let h = secs / 3600;
        format!("{h}h ago")
    } else {
        let d = secs / 86400;
        format!("{d}d ago")
    }
}

/// One-word progress label for a library listing.
pub fn progress(resume: &ResumePoint) -> String {
    if resume.finished {
        "finished".into()
    } else if resume.duration > 0.0 {
        format!("{:.0}%", resume.completion() * 100.0)
    } else if resume.position > 0.0 {
        format!("at {}", stats::format_watch_time(resume.position))
    } else {
        "unwatched".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_time() {
        let now = chrono::Utc::now();
        assert_eq!(relative_time(&now), "just now");
        assert_eq!(relative_time(&(now - chrono::Duration::minutes(5))), "5m ago");
        assert_eq!(relative_time(&(now - chrono::Duration::days(3))), "3d ago");
    }

    #[test]
    fn test_progress_labels() {
        let mut rp = ResumePoint::default();
        assert_eq!(progress(&rp), "unwatched");

        rp.position = 700.0;
        rp.duration = 1400.0;
        assert_eq!(progress(&rp), "50%");

        rp.finished = true;
        assert_eq!(progress(&rp), "finished");

        rp.finished = false;
        rp.duration = 0.0;
        rp.position = 90.0;
        assert_eq!(progress(&rp), "at 1m");
    }
}
