use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A library entry: a single media file or a folder of episodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: i64,
    pub path: String,
    pub title: String,
    pub season: Option<u32>,
    /// When set, the title was chosen by the user and is never re-guessed.
    pub title_locked: bool,
    pub archived: bool,
    pub year: Option<u32>,
    pub tmdb_id: Option<u64>,
    pub synopsis: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub genres: Vec<String>,
    pub vote_average: Option<f32>,
    pub vote_count: Option<u32>,
    pub runtime_minutes: Option<u32>,
    pub metadata_fetched: bool,
}

impl MediaItem {
    /// A fresh, unenriched item.
    pub fn new(path: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: 0,
            path: path.into(),
            title: title.into(),
            season: None,
            title_locked: false,
            archived: false,
            year: None,
            tmdb_id: None,
            synopsis: None,
            poster_url: None,
            backdrop_url: None,
            genres: Vec::new(),
            vote_average: None,
            vote_count: None,
            runtime_minutes: None,
            metadata_fetched: false,
        }
    }
}

/// Metadata produced by a remote lookup, applied to an item.
#[derive(Debug, Clone, Default)]
pub struct FetchedMetadata {
    pub year: Option<u32>,
    pub tmdb_id: Option<u64>,
    pub synopsis: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub genres: Vec<String>,
    pub vote_average: Option<f32>,
    pub vote_count: Option<u32>,
    pub runtime_minutes: Option<u32>,
}

/// Last saved playback offset for an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePoint {
    /// File the player was last observed on (member of the item for folders).
    pub last_file: Option<String>,
    pub last_index: u32,
    pub position: f64,
    pub duration: f64,
    pub finished: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for ResumePoint {
    fn default() -> Self {
        Self {
            last_file: None,
            last_index: 0,
            position: 0.0,
            duration: 0.0,
            finished: false,
            updated_at: Utc::now(),
        }
    }
}

impl ResumePoint {
    /// Fraction watched; 0 when the duration is unknown.
    pub fn completion(&self) -> f64 {
        if self.duration > 0.0 {
            self.position / self.duration
        } else {
            0.0
        }
    }
}

/// One recorded viewing session, used for statistics.
#[derive(Debug, Clone)]
pub struct WatchSession {
    pub id: i64,
    pub item_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub position_start: f64,
    pub position_end: f64,
    pub file_index: u32,
}

impl WatchSession {
    /// Wall-clock length of the session.
    pub fn wall_clock_secs(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_fraction() {
        let mut rp = ResumePoint {
            position: 30.0,
            duration: 120.0,
            ..Default::default()
        };
        assert!((rp.completion() - 0.25).abs() < f64::EPSILON);

        rp.duration = 0.0;
        assert_eq!(rp.completion(), 0.0);
    }

    #[test]
    fn test_wall_clock_secs() {
        let started = Utc::now();
        let session = WatchSession {
            id: 0,
            item_id: 1,
            started_at: started,
            ended_at: started + chrono::Duration::seconds(90),
            position_start: 0.0,
            position_end: 85.0,
            file_index: 0,
        };
        assert!((session.wall_clock_secs() - 90.0).abs() < 0.001);
    }
}
