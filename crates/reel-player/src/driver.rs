//! Driver selection and player binary resolution.

use std::path::PathBuf;

use crate::PlayerError;

/// Supported playback tracking strategies.
///
/// A closed set: only terminal players (status-line scraping) and mpv-IPC
/// wrappers exist, so this stays a plain enum dispatched with `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    /// Scrape the player's terminal status line.
    Stdout,
    /// Query the mpv JSON IPC socket.
    Ipc,
}

/// Everything needed to start a playback session.
#[derive(Debug, Clone)]
pub struct PlayerLaunch {
    pub driver: DriverKind,
    pub executable: PathBuf,
    /// Configured player name ("mpv", "celluloid"); decides CLI flag shape.
    pub player: String,
}

/// Map (operating system, configured player) to a tracking driver.
///
/// Pure function over the supported pairs; anything else is a configuration
/// error surfaced before a process is spawned.
pub fn select_driver(os: &str, player: &str) -> Result<DriverKind, PlayerError> {
    match (os, player) {
        ("windows", "mpv") => Ok(DriverKind::Stdout),
        ("linux", "mpv") => Ok(DriverKind::Stdout),
        ("linux", "celluloid") => Ok(DriverKind::Ipc),
        _ => Err(PlayerError::Config(format!(
            "no driver for player {player:?} on {os}"
        ))),
    }
}

/// Resolve the player binary, preferring an explicit override path.
pub fn resolve_executable(
    player: &str,
    override_path: Option<&str>,
) -> Result<PathBuf, PlayerError> {
    if let Some(p) = override_path {
        let path = PathBuf::from(p);
        if path.is_file() {
            return Ok(path);
        }
        return Err(PlayerError::Config(format!(
            "configured player executable {p} does not exist"
        )));
    }

    find_in_path(player).ok_or_else(|| {
        PlayerError::Config(format!("player binary {player:?} not found on PATH"))
    })
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(windows)]
        {
            let candidate = dir.join(format!("{binary}.exe"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_driver_pairs() {
        assert_eq!(select_driver("windows", "mpv").unwrap(), DriverKind::Stdout);
        assert_eq!(select_driver("linux", "mpv").unwrap(), DriverKind::Stdout);
        assert_eq!(select_driver("linux", "celluloid").unwrap(), DriverKind::Ipc);
    }

    #[test]
    fn test_unknown_pairs_are_config_errors() {
        for (os, player) in [
            ("windows", "celluloid"),
            ("macos", "mpv"),
            ("linux", "vlc"),
            ("linux", ""),
        ] {
            let err = select_driver(os, player).unwrap_err();
            assert!(matches!(err, PlayerError::Config(_)), "{os}/{player}");
        }
    }

    #[test]
    fn test_resolve_executable_override() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let resolved =
            resolve_executable("mpv", Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(resolved, file.path());
    }

    #[test]
    fn test_resolve_executable_bad_override() {
        let err = resolve_executable("mpv", Some("/no/such/binary")).unwrap_err();
        assert!(matches!(err, PlayerError::Config(_)));
    }

    #[test]
    fn test_resolve_executable_missing_from_path() {
        let err = resolve_executable("definitely-not-a-real-player", None).unwrap_err();
        assert!(matches!(err, PlayerError::Config(_)));
    }
}
