use reqwest::Client;
use serde_json::json;
use tracing::debug;

use super::error::OpenSubtitlesError;
use super::types::{DownloadResponse, SearchEntry, SearchResponse, SubtitleInfo};

const BASE_URL: &str = "https://api.opensubtitles.com/api/v1";
const USER_AGENT: &str = concat!("reel v", env!("CARGO_PKG_VERSION"));

/// OpenSubtitles.com REST client.
pub struct OpenSubtitlesClient {
    api_key: String,
    http: Client,
}

impl OpenSubtitlesClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: Client::new(),
        }
    }

    async fn check_response(
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, OpenSubtitlesError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(OpenSubtitlesError::Api {
                status,
                message: body,
            })
        }
    }

    /// Search subtitles by moviehash and filename, hash matches ranked first.
    pub async fn search(
        &self,
        filename: &str,
        moviehash: Option<&str>,
        language: &str,
    ) -> Result<Vec<SubtitleInfo>, OpenSubtitlesError> {
        let mut params = vec![
            ("languages", language.to_string()),
            // Filename query doubles as a fallback when the hash is unknown.
            ("query", filename.to_string()),
        ];
        if let Some(hash) = moviehash {
            params.push(("moviehash", hash.to_string()));
        }

        let resp = self
            .http
            .get(format!("{BASE_URL}/subtitles"))
            .header("Api-Key", &self.api_key)
            .header("User-Agent", USER_AGENT)
            .query(&params)
            .send()
            .await?;

        let resp = Self::check_response(resp).await?;
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| OpenSubtitlesError::Parse(e.to_string()))?;

        let mut results: Vec<SubtitleInfo> = body
            .data
            .into_iter()
            .filter_map(|entry| map_entry(entry, language))
            .collect();
        rank_results(&mut results);

        debug!(filename, count = results.len(), "Subtitle search complete");
        Ok(results)
    }

    /// Request the temporary download link for a subtitle file.
    pub async fn download_link(&self, file_id: u64) -> Result<String, OpenSubtitlesError> {
        let resp = self
            .http
            .post(format!("{BASE_URL}/download"))
            .header("Api-Key", &self.api_key)
            .header("User-Agent", USER_AGENT)
            .json(&json!({ "file_id": file_id }))
            .send()
            .await?;

        let resp = Self::check_response(resp).await?;
        let body: DownloadResponse = resp
            .json()
            .await
            .map_err(|e| OpenSubtitlesError::Parse(e.to_string()))?;

        body.link
            .ok_or_else(|| OpenSubtitlesError::Parse("download response carried no link".into()))
    }

    /// Fetch a download link's content.
    pub async fn fetch(&self, link: &str) -> Result<Vec<u8>, OpenSubtitlesError> {
        let resp = self.http.get(link).send().await?;
        let resp = Self::check_response(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

fn map_entry(entry: SearchEntry, fallback_language: &str) -> Option<SubtitleInfo> {
    let attrs = entry.attributes;
    let file = attrs.files.first()?;
    Some(SubtitleInfo {
        file_id: file.file_id?,
        language: attrs
            .language
            .unwrap_or_else(|| fallback_language.to_string()),
        download_count: attrs.download_count.unwrap_or(0),
        filename: file.file_name.clone().unwrap_or_default(),
        hash_match: attrs.moviehash_match.unwrap_or(false),
    })
}

/// Hash matches first, then by download count.
fn rank_results(results: &mut [SubtitleInfo]) {
    results.sort_by(|a, b| {
        b.hash_match
            .cmp(&a.hash_match)
            .then(b.download_count.cmp(&a.download_count))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(file_id: u64, hash_match: bool, download_count: u64) -> SubtitleInfo {
        SubtitleInfo {
            file_id,
            language: "en".into(),
            download_count,
            filename: format!("{file_id}.srt"),
            hash_match,
        }
    }

    #[test]
    fn test_rank_hash_matches_first() {
        let mut results = vec![sub(1, false, 9000), sub(2, true, 5), sub(3, false, 100)];
        rank_results(&mut results);
        assert_eq!(results[0].file_id, 2);
        assert_eq!(results[1].file_id, 1);
        assert_eq!(results[2].file_id, 3);
    }

    #[test]
    fn test_map_entry() {
        let entry: SearchEntry = serde_json::from_str(
            r#"{
                "attributes": {
                    "language": "en",
                    "download_count": 4821,
                    "moviehash_match": true,
                    "files": [{"file_id": 123, "file_name": "movie.srt"}]
                }
            }"#,
        )
        .unwrap();
        let info = map_entry(entry, "en").unwrap();
        assert_eq!(info.file_id, 123);
        assert_eq!(info.filename, "movie.srt");
        assert!(info.hash_match);
    }

    #[test]
    fn test_map_entry_without_files_is_dropped() {
        let entry: SearchEntry =
            serde_json::from_str(r#"{"attributes": {"language": "en", "files": []}}"#).unwrap();
        assert!(map_entry(entry, "en").is_none());
    }
}
