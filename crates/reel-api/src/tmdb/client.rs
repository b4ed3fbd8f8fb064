use std::collections::HashMap;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::error::TmdbError;
use super::types::{
    parse_year, DetailsResponse, GenreListResponse, MediaInfo, MediaType, SearchItem,
    SearchResponse,
};

const BASE_URL: &str = "https://api.themoviedb.org/3";
const IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p/";

/// TMDB (The Movie Database) metadata client.
pub struct TmdbClient {
    api_key: String,
    http: Client,
    genre_cache: Mutex<HashMap<&'static str, HashMap<u64, String>>>,
}

impl TmdbClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: Client::new(),
            genre_cache: Mutex::new(HashMap::new()),
        }
    }

    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, TmdbError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(TmdbError::Api {
                status,
                message: body,
            })
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, TmdbError> {
        let resp = self
            .http
            .get(format!("{BASE_URL}/{endpoint}"))
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;

        let resp = Self::check_response(resp).await?;
        resp.json().await.map_err(|e| TmdbError::Parse(e.to_string()))
    }

    /// Genre id → name map for a catalogue, fetched once and cached.
    async fn genre_map(&self, media_type: MediaType) -> HashMap<u64, String> {
        let key = media_type.endpoint();
        {
            let cache = self.genre_cache.lock().await;
            if let Some(map) = cache.get(key) {
                return map.clone();
            }
        }

        match self
            .get::<GenreListResponse>(&format!("genre/{key}/list"), &[])
            .await
        {
            Ok(list) => {
                let map: HashMap<u64, String> =
                    list.genres.into_iter().map(|g| (g.id, g.name)).collect();
                self.genre_cache.lock().await.insert(key, map.clone());
                map
            }
            Err(e) => {
                // Failures are not cached; the next lookup retries.
                debug!(error = %e, "Genre list fetch failed");
                HashMap::new()
            }
        }
    }

    /// Search movies and TV and return the best-scoring hit.
    ///
    /// With no `hint`, both catalogues are searched and the results compete
    /// on year match and popularity.
    pub async fn search(
        &self,
        title: &str,
        year: Option<u32>,
        hint: Option<MediaType>,
    ) -> Result<Option<MediaInfo>, TmdbError> {
        let kinds = match hint {
            Some(kind) => vec![kind],
            None => vec![MediaType::Movie, MediaType::Tv],
        };

        let mut best: Option<(f64, MediaInfo)> = None;
        for kind in kinds {
            if let Some(info) = self.search_kind(title, year, kind).await? {
                let candidate_score = score(&info, year);
                if best.as_ref().map_or(true, |(s, _)| candidate_score > *s) {
                    best = Some((candidate_score, info));
                }
            }
        }

        debug!(
            title,
            found = best.as_ref().map(|(_, i)| i.title.as_str()),
            "TMDB search complete"
        );
        Ok(best.map(|(_, info)| info))
    }

    async fn search_kind(
        &self,
        title: &str,
        year: Option<u32>,
        kind: MediaType,
    ) -> Result<Option<MediaInfo>, TmdbError> {
        let mut params = vec![("query", title.to_string())];
        if let Some(y) = year {
            let param = match kind {
                MediaType::Movie => "year",
                MediaType::Tv => "first_air_date_year",
            };
            params.push((param, y.to_string()));
        }

        let page: SearchResponse = self
            .get(&format!("search/{}", kind.endpoint()), &params)
            .await?;
        let Some(item) = page.results.into_iter().next() else {
            return Ok(None);
        };

        let genre_map = self.genre_map(kind).await;
        let genres = item
            .genre_ids
            .iter()
            .filter_map(|id| genre_map.get(id).cloned())
            .collect();
        let runtime_minutes = self.fetch_runtime(kind, item.id).await;

        Ok(Some(build_info(item, kind, genres, runtime_minutes)))
    }

    /// Runtime lives on the details endpoint; a miss is not an error.
    async fn fetch_runtime(&self, kind: MediaType, id: u64) -> Option<u32> {
        match self
            .get::<DetailsResponse>(&format!("{}/{id}", kind.endpoint()), &[])
            .await
        {
            Ok(details) => match kind {
                MediaType::Movie => details.runtime,
                MediaType::Tv => details.episode_run_time.first().copied(),
            },
            Err(e) => {
                warn!(error = %e, id, "Details fetch failed");
                None
            }
        }
    }

    /// Full URL for a poster path.
    pub fn poster_url(path: &str) -> String {
        format!("{IMAGE_BASE_URL}w500{path}")
    }

    /// Full URL for a backdrop path.
    pub fn backdrop_url(path: &str) -> String {
        format!("{IMAGE_BASE_URL}w1280{path}")
    }
}

fn build_info(
    item: SearchItem,
    kind: MediaType,
    genres: Vec<String>,
    runtime_minutes: Option<u32>,
) -> MediaInfo {
    let date = match kind {
        MediaType::Movie => item.release_date.as_deref(),
        MediaType::Tv => item.first_air_date.as_deref(),
    };
    MediaInfo {
        year: parse_year(date),
        title: item.title.or(item.name).unwrap_or_default(),
        tmdb_id: item.id,
        media_type: kind,
        overview: item.overview,
        poster_path: item.poster_path,
        backdrop_path: item.backdrop_path,
        genres,
        vote_average: item.vote_average,
        vote_count: item.vote_count,
        runtime_minutes,
    }
}

/// Rank a hit: an exact year match dominates, vote count breaks ties.
fn score(info: &MediaInfo, year_hint: Option<u32>) -> f64 {
    let mut score = 1.0;
    if let (Some(hint), Some(year)) = (year_hint, info.year) {
        if hint == year {
            score += 10.0;
        }
    }
    if let Some(votes) = info.vote_count {
        score += (votes as f64 / 1000.0).min(5.0);
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(year: Option<u32>, vote_count: Option<u32>) -> MediaInfo {
        MediaInfo {
            title: "X".into(),
            year,
            tmdb_id: 1,
            media_type: MediaType::Movie,
            overview: None,
            poster_path: None,
            backdrop_path: None,
            genres: vec![],
            vote_average: None,
            vote_count,
            runtime_minutes: None,
        }
    }

    #[test]
    fn test_year_match_beats_popularity() {
        let matching = score(&info(Some(1999), Some(100)), Some(1999));
        let popular = score(&info(Some(2003), Some(900_000)), Some(1999));
        assert!(matching > popular);
    }

    #[test]
    fn test_popularity_boost_is_capped() {
        let a = score(&info(None, Some(5_000)), None);
        let b = score(&info(None, Some(5_000_000)), None);
        assert!((a - b).abs() < f64::EPSILON);
    }

    #[test]
    fn test_image_urls() {
        assert_eq!(
            TmdbClient::poster_url("/abc.jpg"),
            "https://image.tmdb.org/t/p/w500/abc.jpg"
        );
        assert_eq!(
            TmdbClient::backdrop_url("/abc.jpg"),
            "https://image.tmdb.org/t/p/w1280/abc.jpg"
        );
    }

    #[test]
    fn test_build_info_prefers_movie_fields() {
        let item: SearchItem = serde_json::from_str(
            r#"{"id":603,"title":"The Matrix","release_date":"1999-03-31"}"#,
        )
        .unwrap();
        let info = build_info(item, MediaType::Movie, vec![], Some(136));
        assert_eq!(info.title, "The Matrix");
        assert_eq!(info.year, Some(1999));
        assert_eq!(info.runtime_minutes, Some(136));
    }
}
