pub mod client;
pub mod error;
pub mod types;

pub use client::OpenSubtitlesClient;
pub use error::OpenSubtitlesError;
pub use types::SubtitleInfo;
