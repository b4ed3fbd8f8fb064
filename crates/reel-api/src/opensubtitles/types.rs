use serde::Deserialize;

/// Normalized subtitle search hit.
#[derive(Debug, Clone)]
pub struct SubtitleInfo {
    /// File id used by the download endpoint.
    pub file_id: u64,
    pub language: String,
    pub download_count: u64,
    pub filename: String,
    /// Matched by moviehash rather than filename query.
    pub hash_match: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub data: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchEntry {
    pub attributes: SubtitleAttributes,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubtitleAttributes {
    pub language: Option<String>,
    pub download_count: Option<u64>,
    pub moviehash_match: Option<bool>,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileRef {
    pub file_id: Option<u64>,
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DownloadResponse {
    pub link: Option<String>,
}
