//! Command handlers: wiring between storage, the player drivers, and the
//! remote enrichment clients.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use reel_api::opensubtitles::OpenSubtitlesClient;
use reel_api::tmdb::{MediaInfo, MediaType, TmdbClient, TmdbError};
use reel_core::config::{self, AppConfig};
use reel_core::models::{FetchedMetadata, MediaItem, ResumePoint, WatchSession};
use reel_core::storage::Storage;
use reel_core::{guess, moviehash, resume, scanner, stats, ReelError};
use reel_player::{PlaybackRequest, PlayerLaunch};

use crate::format;
use crate::Command;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] ReelError),

    #[error(transparent)]
    Player(#[from] reel_player::PlayerError),

    #[error("metadata error: {0}")]
    Tmdb(#[from] TmdbError),

    #[error("subtitle error: {0}")]
    Subtitles(#[from] reel_api::opensubtitles::OpenSubtitlesError),
}

pub async fn run(command: Command) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let storage = Storage::open(&AppConfig::ensure_db_path()?)?;

    match command {
        Command::Scan => scan(&storage, &config),
        Command::List { all, query } => list(&storage, all, query.as_deref()),
        Command::Play { path, restart } => play(&storage, &config, &path, restart).await,
        Command::Stats => show_stats(&storage),
        Command::Refresh { path } => refresh(&storage, &config, &path).await,
        Command::Archive { path } => set_archived(&storage, &path, true),
        Command::Unarchive { path } => set_archived(&storage, &path, false),
        Command::Subs {
            path,
            lang,
            download,
        } => subs(&config, &path, lang.as_deref(), download).await,
    }
}

// ── Library ─────────────────────────────────────────────────────

fn scan(storage: &Storage, config: &AppConfig) -> Result<(), AppError> {
    if config.library.folders.is_empty() {
        println!(
            "No library folders configured. Add them under [library] in {}.",
            AppConfig::config_path().display()
        );
        return Ok(());
    }

    let result = scanner::scan_library_folders(storage, &config.library.folders)?;
    println!(
        "Scanned {} entries: {} added, {} already known.",
        result.entries_seen, result.items_added, result.items_known
    );
    Ok(())
}

fn list(storage: &Storage, all: bool, query: Option<&str>) -> Result<(), AppError> {
    let mut rows = storage.all_items(all)?;
    if let Some(query) = query {
        let needle = query.to_lowercase();
        rows.retain(|r| r.item.title.to_lowercase().contains(&needle));
    }

    if rows.is_empty() {
        println!("Library is empty. Run `reel scan` or `reel play <path>`.");
        return Ok(());
    }

    for row in rows {
        let year = row
            .item
            .year
            .map(|y| format!(" ({y})"))
            .unwrap_or_default();
        let marker = if row.item.archived { " [archived]" } else { "" };
        println!(
            "{:<42} {:>10}   {}{}",
            format!("{}{year}", row.item.title),
            format::progress(&row.resume),
            format::relative_time(&row.resume.updated_at),
            marker
        );
    }
    Ok(())
}

fn get_or_create_item(storage: &Storage, path: &Path) -> Result<MediaItem, ReelError> {
    let path_str = path.to_string_lossy().to_string();
    if let Some(item) = storage.get_item_by_path(&path_str)? {
        return Ok(item);
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&path_str);
    let guessed = guess::guess_name(name);

    let mut item = MediaItem::new(path_str, guessed.title);
    item.season = guessed.season;
    item.year = guessed.year;
    item.id = storage.insert_item(&item)?;
    info!(title = %item.title, "Added to library");
    Ok(item)
}

fn lookup_item(storage: &Storage, path: &Path) -> Result<MediaItem, AppError> {
    let canonical = std::fs::canonicalize(path).map_err(ReelError::from)?;
    storage
        .get_item_by_path(&canonical.to_string_lossy())?
        .ok_or_else(|| {
            ReelError::Config(format!("{} is not in the library", path.display())).into()
        })
}

fn set_archived(storage: &Storage, path: &Path, archived: bool) -> Result<(), AppError> {
    let item = lookup_item(storage, path)?;
    storage.set_archived(item.id, archived)?;
    println!(
        "{} {}.",
        if archived { "Archived" } else { "Restored" },
        item.title
    );
    Ok(())
}

// ── Playback ────────────────────────────────────────────────────

async fn play(
    storage: &Storage,
    config: &AppConfig,
    path: &Path,
    restart: bool,
) -> Result<(), AppError> {
    let path = std::fs::canonicalize(path).map_err(ReelError::from)?;
    let item = get_or_create_item(storage, &path)?;

    // Enrichment runs alongside playback and never blocks it.
    let metadata_task = if item.metadata_fetched {
        None
    } else {
        spawn_metadata_fetch(config, &item)
    };

    let playlist = scanner::media_files(&path);
    let resume_point = storage.get_resume_point(item.id)?.unwrap_or_default();

    let target = if restart {
        resume::select_target(&item.path, &playlist, &ResumePoint::default())?
    } else {
        match resume::select_target(&item.path, &playlist, &resume_point) {
            Ok(target) => target,
            Err(ReelError::NothingToResume(path)) => {
                println!("Everything in {path} is watched. Re-run with --restart to start over.");
                finish_metadata_task(storage, item.id, metadata_task).await;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    };

    if !restart && resume::resume_action(&resume_point, Utc::now()) == resume::ResumeAction::ShowRecap
    {
        println!(
            "Last watched {}. A recap might help.",
            format::relative_time(&resume_point.updated_at)
        );
    }

    let driver = reel_player::select_driver(std::env::consts::OS, &config.player.kind)?;
    let executable =
        reel_player::resolve_executable(&config.player.kind, config.player.executable.as_deref())?;
    let launch = PlayerLaunch {
        driver,
        executable,
        player: config.player.kind.clone(),
    };
    let request = PlaybackRequest {
        playlist: playlist.clone(),
        start_index: target.index,
        start_seconds: target.start_seconds,
    };
    let poll_interval = Duration::from_millis(config.general.poll_interval_ms);

    println!(
        "Playing {} (file {} of {}).",
        item.title,
        target.index + 1,
        playlist.len()
    );

    let started_at = Utc::now();
    let outcome =
        tokio::task::spawn_blocking(move || reel_player::run_playback(&launch, &request, poll_interval))
            .await
            .map_err(|e| reel_player::PlayerError::Launch(format!("playback task failed: {e}")))??;
    let ended_at = Utc::now();

    let wall_secs = (ended_at - started_at).num_milliseconds() as f64 / 1000.0;
    if wall_secs > config::MIN_WATCH_SECS {
        storage.record_session(&WatchSession {
            id: 0,
            item_id: item.id,
            started_at,
            ended_at,
            position_start: target.start_seconds,
            position_end: outcome.position.unwrap_or(target.start_seconds),
            file_index: outcome.last_index as u32,
        })?;
    } else {
        debug!(wall_secs, "Session too short to record");
    }

    match updated_resume_point(&outcome, &playlist, ended_at) {
        Some(point) => {
            storage.save_resume_point(item.id, &point)?;
            if point.finished {
                println!("Finished. The next play advances to the following file.");
            } else {
                println!(
                    "Saved resume point at {}.",
                    stats::format_watch_time(point.position)
                );
            }
        }
        None => {
            info!("No playback offset was read; resume point unchanged");
        }
    }

    finish_metadata_task(storage, item.id, metadata_task).await;
    Ok(())
}

/// Turn a playback outcome into the resume point to store. `None` means the
/// session produced no readable offset and the stored point must stay as-is.
fn updated_resume_point(
    outcome: &reel_player::PlaybackOutcome,
    playlist: &[PathBuf],
    ended_at: chrono::DateTime<Utc>,
) -> Option<ResumePoint> {
    let position = outcome.position?;
    let last_index = outcome
        .last_file
        .as_deref()
        .and_then(|f| resume::match_playlist_index(f, playlist))
        .unwrap_or(outcome.last_index) as u32;
    Some(ResumePoint {
        last_file: outcome.last_file.clone(),
        last_index,
        position,
        duration: outcome.duration,
        finished: outcome.finished,
        updated_at: ended_at,
    })
}

// ── Metadata ────────────────────────────────────────────────────

fn spawn_metadata_fetch(
    config: &AppConfig,
    item: &MediaItem,
) -> Option<JoinHandle<Result<Option<FetchedMetadata>, TmdbError>>> {
    let api_key = config.metadata.tmdb_api_key.clone()?;
    let title = item.title.clone();
    let path = PathBuf::from(&item.path);
    let season = item.season;
    Some(tokio::spawn(async move {
        fetch_metadata(api_key, title, &path, season).await
    }))
}

async fn fetch_metadata(
    api_key: String,
    title: String,
    path: &Path,
    season: Option<u32>,
) -> Result<Option<FetchedMetadata>, TmdbError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let guessed = guess::guess_name(name);

    // Folders hold series; episode markers in the name mean the same.
    let hint = if path.is_dir() || season.is_some() || guessed.looks_like_tv() {
        MediaType::Tv
    } else {
        MediaType::Movie
    };

    let client = TmdbClient::new(api_key);
    let info = client.search(&title, guessed.year, Some(hint)).await?;
    Ok(info.map(to_fetched))
}

fn to_fetched(info: MediaInfo) -> FetchedMetadata {
    FetchedMetadata {
        year: info.year,
        tmdb_id: Some(info.tmdb_id),
        synopsis: info.overview,
        poster_url: info.poster_path.as_deref().map(TmdbClient::poster_url),
        backdrop_url: info.backdrop_path.as_deref().map(TmdbClient::backdrop_url),
        genres: info.genres,
        vote_average: info.vote_average,
        vote_count: info.vote_count,
        runtime_minutes: info.runtime_minutes,
    }
}

/// Join the background fetch and store its result. A transport error leaves
/// the item unfetched so the next launch retries; an empty search result
/// still marks it fetched.
async fn finish_metadata_task(
    storage: &Storage,
    item_id: i64,
    task: Option<JoinHandle<Result<Option<FetchedMetadata>, TmdbError>>>,
) {
    let Some(task) = task else { return };
    match task.await {
        Ok(Ok(metadata)) => {
            if let Err(e) = storage.apply_metadata(item_id, metadata.as_ref()) {
                warn!(error = %e, "Failed to store fetched metadata");
            }
        }
        Ok(Err(e)) => warn!(error = %e, "Metadata fetch failed; will retry on next launch"),
        Err(e) => warn!(error = %e, "Metadata task did not complete"),
    }
}

async fn refresh(storage: &Storage, config: &AppConfig, path: &Path) -> Result<(), AppError> {
    let item = lookup_item(storage, path)?;
    let api_key = config
        .metadata
        .tmdb_api_key
        .clone()
        .ok_or_else(|| ReelError::Config("TMDB_API_KEY is not configured".into()))?;

    storage.clear_metadata_fetched(item.id)?;
    let metadata = fetch_metadata(api_key, item.title.clone(), Path::new(&item.path), item.season)
        .await?;
    let found = metadata.is_some();
    storage.apply_metadata(item.id, metadata.as_ref())?;

    if found {
        println!("Refreshed metadata for {}.", item.title);
    } else {
        println!("No TMDB match for {}.", item.title);
    }
    Ok(())
}

// ── Subtitles ───────────────────────────────────────────────────

async fn subs(
    config: &AppConfig,
    path: &Path,
    lang: Option<&str>,
    download: Option<u64>,
) -> Result<(), AppError> {
    let path = std::fs::canonicalize(path).map_err(ReelError::from)?;
    if !path.is_file() {
        return Err(ReelError::Config("subtitles need a single media file".into()).into());
    }

    let api_key = config
        .metadata
        .opensubtitles_api_key
        .clone()
        .ok_or_else(|| ReelError::Config("OPENSUBTITLES_API_KEY is not configured".into()))?;
    let language = lang.unwrap_or(config.metadata.subtitle_language.as_str());
    let client = OpenSubtitlesClient::new(api_key);

    if let Some(file_id) = download {
        let link = client.download_link(file_id).await?;
        let content = client.fetch(&link).await?;
        let out = path.with_extension(format!("{language}.srt"));
        std::fs::write(&out, content).map_err(ReelError::from)?;
        println!("Saved {}.", out.display());
        return Ok(());
    }

    let hash = moviehash::moviehash(&path)?;
    if hash.is_none() {
        warn!("File too small for a moviehash; searching by name only");
    }
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let results = client.search(filename, hash.as_deref(), language).await?;
    if results.is_empty() {
        println!("No subtitles found for {filename}.");
        return Ok(());
    }

    for sub in results {
        let marker = if sub.hash_match { " [hash match]" } else { "" };
        println!(
            "{:>10}  {:<6} {:>7}↓  {}{}",
            sub.file_id, sub.language, sub.download_count, sub.filename, marker
        );
    }
    println!("Download one with: reel subs <path> --download <file_id>");
    Ok(())
}

// ── Stats ───────────────────────────────────────────────────────

fn show_stats(storage: &Storage) -> Result<(), AppError> {
    let snapshot = stats::StatsSnapshot::compute(storage)?;
    let today = Utc::now().date_naive();

    println!("Library         {} items", snapshot.library_size);
    println!(
        "Total watched   {}",
        stats::format_watch_time(snapshot.total_watch_secs)
    );
    println!(
        "Last 7 days     {}",
        stats::format_watch_time(snapshot.weekly_watch_secs)
    );
    println!(
        "Daily average   {}",
        stats::format_watch_time(snapshot.daily_average_secs)
    );
    println!("Current streak  {} days", snapshot.current_streak(today));

    let watched: Vec<_> = snapshot
        .most_watched
        .iter()
        .filter(|(_, secs)| *secs > 0.0)
        .collect();
    if !watched.is_empty() {
        println!("\nMost watched:");
        for (title, secs) in watched {
            println!("  {:<42} {}", title, stats::format_watch_time(*secs));
        }
    }

    if !snapshot.recent.is_empty() {
        println!("\nRecent sessions:");
        for row in snapshot.recent.iter().take(10) {
            println!(
                "  {:<42} {:>8}   {}",
                row.title,
                stats::format_watch_time(row.session.wall_clock_secs()),
                format::relative_time(&row.session.started_at)
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_player::PlaybackOutcome;

    fn playlist() -> Vec<PathBuf> {
        vec![
            PathBuf::from("/media/show/e01.mkv"),
            PathBuf::from("/media/show/e02.mkv"),
        ]
    }

    #[test]
    fn test_no_offset_leaves_resume_point_alone() {
        let outcome = PlaybackOutcome {
            last_file: Some("/media/show/e01.mkv".into()),
            last_index: 0,
            position: None,
            duration: 0.0,
            finished: false,
        };
        assert!(updated_resume_point(&outcome, &playlist(), Utc::now()).is_none());
    }

    #[test]
    fn test_offset_produces_resume_point() {
        let outcome = PlaybackOutcome {
            last_file: Some("/media/show/e02.mkv".into()),
            last_index: 0, // driver's index is stale; the file wins
            position: Some(431.5),
            duration: 1400.0,
            finished: false,
        };
        let point = updated_resume_point(&outcome, &playlist(), Utc::now()).unwrap();
        assert_eq!(point.last_index, 1);
        assert!((point.position - 431.5).abs() < 0.001);
        assert!(!point.finished);
    }

    #[test]
    fn test_unmatched_file_keeps_driver_index() {
        let outcome = PlaybackOutcome {
            last_file: Some("/elsewhere/other.mkv".into()),
            last_index: 1,
            position: Some(10.0),
            duration: 1400.0,
            finished: false,
        };
        let point = updated_resume_point(&outcome, &playlist(), Utc::now()).unwrap();
        assert_eq!(point.last_index, 1);
    }
}
