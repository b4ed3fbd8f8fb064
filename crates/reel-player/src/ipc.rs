//! mpv JSON IPC driver, used for Celluloid (and mpv itself when configured).
//!
//! The wire protocol belongs to mpv: newline-delimited JSON frames of
//! `{"command": [...], "request_id": n}` answered by frames carrying the same
//! `request_id` and `"error": "success"`. Event frames without a request id
//! are interleaved and skipped. Only Unix domain sockets are supported; the
//! driver is only ever selected on Linux.

use serde_json::{json, Value};

/// Encode one command frame.
pub(crate) fn encode_command(args: &[Value], request_id: u64) -> String {
    let mut frame = json!({ "command": args, "request_id": request_id }).to_string();
    frame.push('\n');
    frame
}

/// Classification of one received line against an outstanding request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    /// Our reply, successful; `Value::Null` when the command carries no data.
    Data(Value),
    /// Our reply, but the player reported an error.
    Failed(String),
    /// An event or a reply to some other request; keep reading.
    Unrelated,
}

pub(crate) fn classify_reply(line: &str, request_id: u64) -> Reply {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return Reply::Unrelated;
    };
    if value.get("request_id").and_then(Value::as_u64) != Some(request_id) {
        return Reply::Unrelated;
    }
    match value.get("error").and_then(Value::as_str) {
        Some("success") => Reply::Data(value.get("data").cloned().unwrap_or(Value::Null)),
        Some(error) => Reply::Failed(error.to_string()),
        None => Reply::Failed("missing error field".into()),
    }
}

#[cfg(unix)]
pub use unix::run;

#[cfg(unix)]
mod unix {
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::net::UnixStream;
    use std::path::{Path, PathBuf};
    use std::process::{Child, Command, Stdio};
    use std::time::{Duration, Instant};

    use serde_json::{json, Value};
    use tracing::{debug, info, warn};

    use super::{classify_reply, encode_command, Reply};
    use crate::{
        is_finished, match_playlist_entry, PlaybackOutcome, PlaybackRequest, PlayerError,
        PlayerLaunch,
    };

    /// How long to wait for the player to create and accept its socket.
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

    /// How long the whole startup sequence may take before force-unpausing.
    const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);

    /// Per-command reply deadline.
    const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

    pub struct IpcClient {
        stream: UnixStream,
        reader: BufReader<UnixStream>,
        next_request_id: u64,
    }

    impl IpcClient {
        /// Wait for the socket to appear and connect, or give up after
        /// `timeout`.
        pub fn connect(path: &Path, timeout: Duration) -> Result<Self, PlayerError> {
            let deadline = Instant::now() + timeout;
            loop {
                if path.exists() {
                    match UnixStream::connect(path) {
                        Ok(stream) => {
                            stream
                                .set_read_timeout(Some(REPLY_TIMEOUT))
                                .map_err(|e| PlayerError::Ipc(e.to_string()))?;
                            let reader = BufReader::new(
                                stream.try_clone().map_err(|e| PlayerError::Ipc(e.to_string()))?,
                            );
                            return Ok(Self {
                                stream,
                                reader,
                                next_request_id: 0,
                            });
                        }
                        // The player may not be accepting yet; keep retrying.
                        Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {}
                        Err(e) => {
                            return Err(PlayerError::Ipc(format!(
                                "connect {}: {e}",
                                path.display()
                            )))
                        }
                    }
                }
                if Instant::now() >= deadline {
                    return Err(PlayerError::Ipc(format!(
                        "socket {} did not come up",
                        path.display()
                    )));
                }
                std::thread::sleep(Duration::from_millis(200));
            }
        }

        /// Send a command and wait for its reply. Any failure (broken pipe,
        /// timeout, player-side error) yields `None`; the session loop treats
        /// that as "no reading this tick".
        fn send(&mut self, args: &[Value]) -> Option<Value> {
            self.next_request_id += 1;
            let id = self.next_request_id;
            let frame = encode_command(args, id);
            if self.stream.write_all(frame.as_bytes()).is_err() {
                return None;
            }

            let deadline = Instant::now() + REPLY_TIMEOUT;
            let mut line = String::new();
            while Instant::now() < deadline {
                line.clear();
                match self.reader.read_line(&mut line) {
                    Ok(0) => return None, // player closed the socket
                    Ok(_) => match classify_reply(line.trim_end(), id) {
                        Reply::Data(data) => return Some(data),
                        Reply::Failed(error) => {
                            debug!(%error, command = ?args.first(), "IPC command failed");
                            return None;
                        }
                        Reply::Unrelated => continue,
                    },
                    Err(_) => return None,
                }
            }
            None
        }

        pub fn get_property(&mut self, name: &str) -> Option<Value> {
            self.send(&[json!("get_property"), json!(name)])
        }

        pub fn get_f64(&mut self, name: &str) -> Option<f64> {
            self.get_property(name)?.as_f64()
        }

        pub fn get_u64(&mut self, name: &str) -> Option<u64> {
            self.get_property(name)?.as_u64()
        }

        pub fn get_string(&mut self, name: &str) -> Option<String> {
            Some(self.get_property(name)?.as_str()?.to_string())
        }

        pub fn set_property(&mut self, name: &str, value: Value) -> Option<Value> {
            self.send(&[json!("set_property"), json!(name), value])
        }

        pub fn seek_absolute(&mut self, seconds: f64) -> Option<Value> {
            self.send(&[json!("seek"), json!(seconds), json!("absolute")])
        }
    }

    /// Startup sequence: the player begins paused on playlist entry 0 and is
    /// steered to the requested index and offset before being unpaused.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum StartupPhase {
        WaitPlaylist,
        ForceIndex,
        WaitDuration,
        SeekAndPlay,
        Done,
    }

    fn socket_path() -> PathBuf {
        std::env::temp_dir().join(format!("reel-mpv-{}.sock", std::process::id()))
    }

    fn spawn_player(
        launch: &PlayerLaunch,
        request: &PlaybackRequest,
        socket: &Path,
    ) -> Result<Child, PlayerError> {
        let mpv_flags = [
            format!("--input-ipc-server={}", socket.display()),
            "--idle=yes".to_string(),
            // Start paused so entry 0 stays silent until the index switch
            // and seek have landed.
            "--pause".to_string(),
        ];

        let mut cmd = Command::new(&launch.executable);
        if launch.player.contains("celluloid") {
            cmd.arg("--new-window")
                .arg(format!("--mpv-options={}", mpv_flags.join(" ")));
        } else {
            cmd.arg("--no-terminal").args(&mpv_flags);
        }
        cmd.args(&request.playlist)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        info!(player = %launch.executable.display(), files = request.playlist.len(), "Launching player");
        cmd.spawn()
            .map_err(|e| PlayerError::Launch(format!("{}: {e}", launch.executable.display())))
    }

    /// Run a playback session, blocking until the player exits.
    pub fn run(
        launch: &PlayerLaunch,
        request: &PlaybackRequest,
        poll_interval: Duration,
    ) -> Result<PlaybackOutcome, PlayerError> {
        let socket = socket_path();
        // A stale socket from a crashed session would break the connect.
        let _ = std::fs::remove_file(&socket);

        let mut child = spawn_player(launch, request, &socket)?;

        let mut last_index = request.start_index;
        let mut last_file = request
            .playlist
            .get(request.start_index)
            .map(|p| p.to_string_lossy().to_string());
        let mut position: Option<f64> = None;
        let mut duration = 0.0_f64;

        let mut client = match IpcClient::connect(&socket, CONNECT_TIMEOUT) {
            Ok(client) => client,
            Err(e) => {
                // Degrade: no tracking this session, keep the prior offset.
                warn!(error = %e, "IPC unavailable; waiting for player exit without tracking");
                let _ = child.wait();
                let _ = std::fs::remove_file(&socket);
                return Ok(PlaybackOutcome {
                    last_file,
                    last_index,
                    position: None,
                    duration: 0.0,
                    finished: false,
                });
            }
        };

        let mut phase = StartupPhase::WaitPlaylist;
        let startup_deadline = Instant::now() + STARTUP_TIMEOUT;

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(code = ?status.code(), "Player exited");
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Lost track of player process");
                    break;
                }
            }

            // Vitals first, so an abrupt window close still leaves usable
            // state behind.
            if let Some(path) = client.get_string("path") {
                match match_playlist_entry(&path, &request.playlist) {
                    Some(idx) => {
                        last_index = idx;
                        last_file = Some(request.playlist[idx].to_string_lossy().to_string());
                    }
                    None => last_file = Some(path),
                }
            }
            if let Some(pos) = client.get_f64("time-pos") {
                position = Some(pos);
            }

            match phase {
                StartupPhase::WaitPlaylist => {
                    if let Some(count) = client.get_u64("playlist-count") {
                        if count as usize > request.start_index {
                            debug!(count, "Playlist loaded");
                            phase = StartupPhase::ForceIndex;
                        }
                    }
                }
                StartupPhase::ForceIndex => {
                    if let Some(pos) = client.get_u64("playlist-pos") {
                        if pos as usize == request.start_index {
                            phase = StartupPhase::WaitDuration;
                        } else {
                            debug!(from = pos, to = request.start_index, "Switching playlist index");
                            client.set_property("playlist-pos", json!(request.start_index));
                        }
                    }
                }
                StartupPhase::WaitDuration => {
                    if let Some(d) = client.get_f64("duration") {
                        if d > 0.0 {
                            duration = d;
                            phase = StartupPhase::SeekAndPlay;
                        }
                    }
                }
                StartupPhase::SeekAndPlay => {
                    if request.start_seconds > 0.0 {
                        debug!(seconds = request.start_seconds, "Seeking to resume point");
                        client.seek_absolute(request.start_seconds);
                    }
                    client.set_property("pause", json!(false));
                    info!("Playback started");
                    phase = StartupPhase::Done;
                }
                StartupPhase::Done => {
                    // Track duration across playlist advances.
                    if let Some(d) = client.get_f64("duration") {
                        if d > 0.0 {
                            duration = d;
                        }
                    }
                }
            }

            if phase != StartupPhase::Done && Instant::now() >= startup_deadline {
                warn!("Startup sequence timed out; force unpausing");
                client.set_property("pause", json!(false));
                phase = StartupPhase::Done;
            }

            std::thread::sleep(poll_interval);
        }

        // Reap if the loop broke without an exit status, then clean up.
        let _ = child.kill();
        let _ = child.wait();
        let _ = std::fs::remove_file(&socket);

        Ok(PlaybackOutcome {
            last_file,
            last_index,
            position,
            finished: is_finished(position, duration),
            duration,
        })
    }
}

#[cfg(not(unix))]
pub fn run(
    _launch: &crate::PlayerLaunch,
    _request: &crate::PlaybackRequest,
    _poll_interval: std::time::Duration,
) -> Result<crate::PlaybackOutcome, crate::PlayerError> {
    Err(crate::PlayerError::Config(
        "the IPC driver requires Unix domain sockets".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command_frame() {
        let frame = encode_command(&[json!("get_property"), json!("time-pos")], 7);
        assert!(frame.ends_with('\n'));
        let value: Value = serde_json::from_str(frame.trim_end()).unwrap();
        assert_eq!(value["request_id"], 7);
        assert_eq!(value["command"][0], "get_property");
        assert_eq!(value["command"][1], "time-pos");
    }

    #[test]
    fn test_classify_matching_success() {
        let reply = classify_reply(r#"{"request_id":3,"error":"success","data":431.25}"#, 3);
        assert_eq!(reply, Reply::Data(json!(431.25)));
    }

    #[test]
    fn test_classify_success_without_data() {
        let reply = classify_reply(r#"{"request_id":3,"error":"success"}"#, 3);
        assert_eq!(reply, Reply::Data(Value::Null));
    }

    #[test]
    fn test_classify_player_error() {
        let reply = classify_reply(
            r#"{"request_id":3,"error":"property unavailable"}"#,
            3,
        );
        assert!(matches!(reply, Reply::Failed(_)));
    }

    #[test]
    fn test_classify_skips_events_and_other_ids() {
        assert_eq!(
            classify_reply(r#"{"event":"playback-restart"}"#, 3),
            Reply::Unrelated
        );
        assert_eq!(
            classify_reply(r#"{"request_id":2,"error":"success","data":1}"#, 3),
            Reply::Unrelated
        );
    }

    #[test]
    fn test_classify_malformed_line() {
        assert_eq!(classify_reply("not json at all", 3), Reply::Unrelated);
        assert_eq!(classify_reply("", 3), Reply::Unrelated);
    }
}
