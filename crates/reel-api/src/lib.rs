//! HTTP clients for remote enrichment services.
//!
//! Everything here is best-effort: a failed lookup leaves the library item
//! unenriched and must never block playback or resume.

pub mod opensubtitles;
pub mod tmdb;
