use serde::Deserialize;

/// Which TMDB catalogue an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Movie,
    Tv,
}

impl MediaType {
    pub(crate) fn endpoint(self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }
}

/// Normalized metadata for a search hit.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub title: String,
    pub year: Option<u32>,
    pub tmdb_id: u64,
    pub media_type: MediaType,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub genres: Vec<String>,
    pub vote_average: Option<f32>,
    pub vote_count: Option<u32>,
    pub runtime_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchItem {
    pub id: u64,
    /// Movies carry `title`, TV carries `name`.
    pub title: Option<String>,
    pub name: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<u64>,
    pub vote_average: Option<f32>,
    pub vote_count: Option<u32>,
    pub release_date: Option<String>,
    pub first_air_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenreListResponse {
    #[serde(default)]
    pub genres: Vec<Genre>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Genre {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DetailsResponse {
    pub runtime: Option<u32>,
    #[serde(default)]
    pub episode_run_time: Vec<u32>,
}

/// Extract the year from a TMDB date string like "1999-03-31".
pub(crate) fn parse_year(date: Option<&str>) -> Option<u32> {
    date?.split('-').next()?.parse().ok()
}
