//! Resume target selection.
//!
//! Given an item's playlist (the sorted media files for a folder, or a single
//! file) and its stored resume point, decide which file to play and where to
//! start. A fully watched playlist is an error the front-end turns into a
//! "start from the beginning?" offer rather than a silent restart.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::{COMPLETION_THRESHOLD, RECAP_SUGGESTION_DAYS};
use crate::error::ReelError;
use crate::models::ResumePoint;

/// The file and offset a playback session should start from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeTarget {
    pub index: usize,
    pub file: PathBuf,
    pub start_seconds: f64,
}

/// How the front-end should frame the resume offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeAction {
    /// Normal resume from the stored offset.
    Resume,
    /// The pointed-at file is essentially done; offer next episode or restart.
    RestartOrNext,
    /// Long gap since the last session; suggest a recap first.
    ShowRecap,
}

/// Pick the file and offset to resume from.
///
/// The stored pointer is first re-anchored against the current playlist: if
/// `last_file` no longer names a member, the stored index is clamped into
/// range, so the selected file is always a member of the playlist. Returns
/// `NothingToResume` when the pointer sits on the last file and it is
/// finished.
pub fn select_target(
    item_path: &str,
    playlist: &[PathBuf],
    resume: &ResumePoint,
) -> Result<ResumeTarget, ReelError> {
    if playlist.is_empty() {
        return Err(ReelError::Config(format!(
            "no media files under {item_path}"
        )));
    }

    let index = resume
        .last_file
        .as_deref()
        .and_then(|f| match_playlist_index(f, playlist))
        .unwrap_or_else(|| (resume.last_index as usize).min(playlist.len() - 1));

    let finished = resume.finished || resume.completion() > COMPLETION_THRESHOLD;

    if !finished {
        return Ok(ResumeTarget {
            index,
            file: playlist[index].clone(),
            start_seconds: resume.position,
        });
    }

    let next = index + 1;
    if next < playlist.len() {
        debug!(index = next, "Current file finished, advancing to next");
        return Ok(ResumeTarget {
            index: next,
            file: playlist[next].clone(),
            start_seconds: 0.0,
        });
    }

    Err(ReelError::NothingToResume(item_path.to_string()))
}

/// Frame the resume offer based on completion and recency.
pub fn resume_action(resume: &ResumePoint, now: DateTime<Utc>) -> ResumeAction {
    if resume.completion() > COMPLETION_THRESHOLD {
        return ResumeAction::RestartOrNext;
    }
    let days_since = (now - resume.updated_at).num_days();
    if days_since > RECAP_SUGGESTION_DAYS {
        return ResumeAction::ShowRecap;
    }
    ResumeAction::Resume
}

/// Find the playlist entry matching a stored file path.
///
/// Matches on substring in either direction so that path representation
/// drift (relative vs absolute, symlinked prefixes) does not orphan the
/// pointer.
pub fn match_playlist_index(stored: &str, playlist: &[PathBuf]) -> Option<usize> {
    playlist.iter().position(|entry| {
        let entry = entry.to_string_lossy();
        entry.contains(stored) || stored.contains(entry.as_ref())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist() -> Vec<PathBuf> {
        vec![
            PathBuf::from("/media/show/e01.mkv"),
            PathBuf::from("/media/show/e02.mkv"),
            PathBuf::from("/media/show/e03.mkv"),
        ]
    }

    fn point(last_file: Option<&str>, index: u32, position: f64, duration: f64, finished: bool) -> ResumePoint {
        ResumePoint {
            last_file: last_file.map(String::from),
            last_index: index,
            position,
            duration,
            finished,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_resumes_unfinished_file_at_offset() {
        let target = select_target(
            "/media/show",
            &playlist(),
            &point(Some("/media/show/e02.mkv"), 1, 300.0, 1400.0, false),
        )
        .unwrap();
        assert_eq!(target.index, 1);
        assert_eq!(target.file, PathBuf::from("/media/show/e02.mkv"));
        assert!((target.start_seconds - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_finished_file_advances_to_next() {
        let target = select_target(
            "/media/show",
            &playlist(),
            &point(Some("/media/show/e01.mkv"), 0, 1395.0, 1400.0, true),
        )
        .unwrap();
        assert_eq!(target.index, 1);
        assert_eq!(target.start_seconds, 0.0);
    }

    #[test]
    fn test_completion_threshold_counts_as_finished() {
        // Not flagged finished, but watched past 95%.
        let target = select_target(
            "/media/show",
            &playlist(),
            &point(Some("/media/show/e01.mkv"), 0, 1370.0, 1400.0, false),
        )
        .unwrap();
        assert_eq!(target.index, 1);
    }

    #[test]
    fn test_last_file_finished_is_nothing_to_resume() {
        let err = select_target(
            "/media/show",
            &playlist(),
            &point(Some("/media/show/e03.mkv"), 2, 1400.0, 1400.0, true),
        )
        .unwrap_err();
        assert!(matches!(err, ReelError::NothingToResume(_)));
    }

    #[test]
    fn test_stale_pointer_clamps_into_playlist() {
        // Pointer names a file that is gone; index is out of range too.
        let target = select_target(
            "/media/show",
            &playlist(),
            &point(Some("/media/show/deleted.mkv"), 9, 100.0, 1400.0, false),
        )
        .unwrap();
        assert_eq!(target.index, 2);
        assert!(playlist().contains(&target.file));
    }

    #[test]
    fn test_fresh_point_starts_first_file() {
        let target = select_target("/media/show", &playlist(), &ResumePoint::default()).unwrap();
        assert_eq!(target.index, 0);
        assert_eq!(target.start_seconds, 0.0);
    }

    #[test]
    fn test_empty_playlist_is_config_error() {
        let err = select_target("/media/empty", &[], &ResumePoint::default()).unwrap_err();
        assert!(matches!(err, ReelError::Config(_)));
    }

    #[test]
    fn test_match_playlist_index_partial_paths() {
        let list = playlist();
        assert_eq!(match_playlist_index("/media/show/e02.mkv", &list), Some(1));
        // Stored path is a suffix of the playlist entry.
        assert_eq!(match_playlist_index("show/e03.mkv", &list), Some(2));
        assert_eq!(match_playlist_index("/elsewhere/e09.mkv", &list), None);
    }

    #[test]
    fn test_resume_action_thresholds() {
        let now = Utc::now();

        let fresh = point(None, 0, 100.0, 1400.0, false);
        assert_eq!(resume_action(&fresh, now), ResumeAction::Resume);

        let nearly_done = point(None, 0, 1390.0, 1400.0, false);
        assert_eq!(resume_action(&nearly_done, now), ResumeAction::RestartOrNext);

        let mut stale = point(None, 0, 100.0, 1400.0, false);
        stale.updated_at = now - chrono::Duration::days(10);
        assert_eq!(resume_action(&stale, now), ResumeAction::ShowRecap);
    }
}
