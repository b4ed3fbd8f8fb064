//! mpv status-line driver.
//!
//! Launches mpv in terminal mode with a custom status message and scrapes
//! playlist index, position, and duration from it. mpv writes terminal
//! output to stderr and rewrites the status line with carriage returns, so
//! updates are split on both CR and LF.

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::{is_finished, PlaybackOutcome, PlaybackRequest, PlayerError, PlayerLaunch};

/// Status template handed to mpv; `${=...}` expands to raw property values.
const STATUS_MSG: &str = "reel-status ${=playlist-pos} ${=time-pos} ${=duration}";

static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^reel-status (\d+) ([0-9]+(?:\.[0-9]+)?) ([0-9]+(?:\.[0-9]+)?)")
        .expect("valid regex")
});

/// One parsed status update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StatusUpdate {
    pub index: usize,
    pub position: f64,
    pub duration: f64,
}

/// Parse a single status segment. Non-status output yields `None`.
pub(crate) fn parse_status_line(line: &str) -> Option<StatusUpdate> {
    let caps = STATUS_LINE.captures(line.trim())?;
    Some(StatusUpdate {
        index: caps[1].parse().ok()?,
        position: caps[2].parse().ok()?,
        duration: caps[3].parse().ok()?,
    })
}

/// Read the status stream to EOF, returning the last update seen.
pub(crate) fn scrape_status<R: BufRead>(mut reader: R) -> Option<StatusUpdate> {
    let mut last = None;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                // mpv refreshes the status line with CR; each refresh is
                // a complete update.
                for segment in text.split('\r') {
                    if let Some(update) = parse_status_line(segment) {
                        last = Some(update);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Status stream read failed");
                break;
            }
        }
    }
    last
}

/// Run a playback session, blocking until the player exits.
pub fn run(launch: &PlayerLaunch, request: &PlaybackRequest) -> Result<PlaybackOutcome, PlayerError> {
    let mut cmd = Command::new(&launch.executable);
    cmd.arg(format!("--playlist-start={}", request.start_index))
        .arg(format!("--start={}", request.start_seconds))
        // --start would otherwise apply to every playlist entry.
        .arg("--reset-on-next-file=start")
        .arg(format!("--term-status-msg={STATUS_MSG}"))
        .args(&request.playlist)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    info!(player = %launch.executable.display(), files = request.playlist.len(), "Launching player");
    let mut child = cmd
        .spawn()
        .map_err(|e| PlayerError::Launch(format!("{}: {e}", launch.executable.display())))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| PlayerError::Launch("player stderr not captured".into()))?;

    // Blocks until the player closes its terminal output, i.e. exits.
    let last = scrape_status(BufReader::new(stderr));

    let status = child.wait()?;
    debug!(code = ?status.code(), "Player exited");

    let (last_index, position, duration) = match last {
        Some(update) => (update.index, Some(update.position), update.duration),
        None => (request.start_index, None, 0.0),
    };
    let last_file = request
        .playlist
        .get(last_index)
        .map(|p| p.to_string_lossy().to_string());

    Ok(PlaybackOutcome {
        last_file,
        last_index,
        position,
        finished: is_finished(position, duration),
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_status_line() {
        let update = parse_status_line("reel-status 2 431.250000 1402.000000").unwrap();
        assert_eq!(update.index, 2);
        assert!((update.position - 431.25).abs() < 0.001);
        assert!((update.duration - 1402.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_rejects_noise() {
        assert!(parse_status_line("").is_none());
        assert!(parse_status_line("Playing: /media/show/e01.mkv").is_none());
        assert!(parse_status_line("reel-status a b c").is_none());
        // Property not yet available expands to an empty field.
        assert!(parse_status_line("reel-status 0  ").is_none());
    }

    #[test]
    fn test_scrape_keeps_last_update() {
        let stream = "Playing: e01.mkv\nreel-status 0 10.0 600.0\rreel-status 0 11.5 600.0\nreel-status 0 12.0 600.0\n";
        let last = scrape_status(Cursor::new(stream)).unwrap();
        assert!((last.position - 12.0).abs() < 0.001);
    }

    #[test]
    fn test_scrape_cr_only_stream() {
        // A stream that never emits LF still parses at EOF.
        let stream = "reel-status 1 5.0 60.0\rreel-status 1 7.5 60.0\r";
        let last = scrape_status(Cursor::new(stream)).unwrap();
        assert_eq!(last.index, 1);
        assert!((last.position - 7.5).abs() < 0.001);
    }

    #[test]
    fn test_scrape_no_updates() {
        assert!(scrape_status(Cursor::new("just noise\n")).is_none());
    }
}
