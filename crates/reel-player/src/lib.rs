//! External player drivers.
//!
//! A playback session spawns the configured player process and tracks its
//! position until it exits. Two tracking strategies exist: scraping mpv's
//! terminal status line, and querying the mpv JSON IPC socket (used for
//! Celluloid). The player window closing is a normal save point, never an
//! error; mid-session communication failures degrade to "stopped, keep the
//! last known offset".

pub mod driver;
pub mod ipc;
pub mod stdout;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use driver::{resolve_executable, select_driver, DriverKind, PlayerLaunch};

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("player configuration error: {0}")]
    Config(String),

    #[error("failed to launch player: {0}")]
    Launch(String),

    #[error("IPC communication error: {0}")]
    Ipc(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file is finished when playback stopped within this many seconds of the
/// known end.
pub const END_GRACE_SECS: f64 = 10.0;

/// What to play and where to start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackRequest {
    pub playlist: Vec<PathBuf>,
    pub start_index: usize,
    pub start_seconds: f64,
}

/// Final playback state reported by a driver when the player exits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackOutcome {
    /// File the player was last observed on.
    pub last_file: Option<String>,
    pub last_index: usize,
    /// Last offset read from the player; `None` if no offset was ever read.
    pub position: Option<f64>,
    pub duration: f64,
    pub finished: bool,
}

/// Launch the player and block until it exits, polling for position.
pub fn run_playback(
    launch: &PlayerLaunch,
    request: &PlaybackRequest,
    poll_interval: Duration,
) -> Result<PlaybackOutcome, PlayerError> {
    if request.playlist.is_empty() {
        return Err(PlayerError::Config("empty playlist".into()));
    }
    if request.start_index >= request.playlist.len() {
        return Err(PlayerError::Config(format!(
            "start index {} out of range for {} files",
            request.start_index,
            request.playlist.len()
        )));
    }

    match launch.driver {
        DriverKind::Stdout => stdout::run(launch, request),
        DriverKind::Ipc => ipc::run(launch, request, poll_interval),
    }
}

/// Whether an observed position counts as having finished the file.
pub(crate) fn is_finished(position: Option<f64>, duration: f64) -> bool {
    matches!(position, Some(p) if duration > 0.0 && duration - p < END_GRACE_SECS)
}

/// Find the playlist entry matching a path reported by the player, tolerating
/// representation drift (relative vs absolute paths) via substring matching
/// in either direction.
pub(crate) fn match_playlist_entry(reported: &str, playlist: &[PathBuf]) -> Option<usize> {
    playlist.iter().position(|entry| {
        let entry = entry.to_string_lossy();
        entry.contains(reported) || reported.contains(entry.as_ref())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_finished_within_grace() {
        assert!(is_finished(Some(1395.0), 1400.0));
        assert!(!is_finished(Some(1000.0), 1400.0));
        // Unknown duration can never be finished.
        assert!(!is_finished(Some(1395.0), 0.0));
        assert!(!is_finished(None, 1400.0));
    }

    #[test]
    fn test_match_playlist_entry() {
        let playlist = vec![
            PathBuf::from("/media/show/e01.mkv"),
            PathBuf::from("/media/show/e02.mkv"),
        ];
        assert_eq!(match_playlist_entry("/media/show/e02.mkv", &playlist), Some(1));
        assert_eq!(match_playlist_entry("e01.mkv", &playlist), Some(0));
        assert_eq!(match_playlist_entry("/other/file.mkv", &playlist), None);
    }

    #[test]
    fn test_empty_playlist_rejected() {
        let launch = PlayerLaunch {
            driver: DriverKind::Stdout,
            executable: PathBuf::from("/usr/bin/mpv"),
            player: "mpv".into(),
        };
        let request = PlaybackRequest {
            playlist: vec![],
            start_index: 0,
            start_seconds: 0.0,
        };
        let err = run_playback(&launch, &request, Duration::from_millis(250)).unwrap_err();
        assert!(matches!(err, PlayerError::Config(_)));
    }
}
