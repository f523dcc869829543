use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("listing request failed: {0}")]
    ListingHttp(String),

    #[error("listing service returned status {status}: {message}")]
    ListingStatus { status: u16, message: String },

    #[error("malformed listing response: {0}")]
    ListingParse(String),

    #[error("download request failed: {0}")]
    DownloadHttp(String),

    #[error("download returned status {status}: {message}")]
    DownloadStatus { status: u16, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to parse release catalog: {0}")]
    CatalogParse(String),

    #[error("release catalog not found at {0} (run `buildstock-fetch catalog` first)")]
    MissingCatalog(PathBuf),

    #[error("invalid catalog key: {0}")]
    InvalidCatalogKey(String),

    #[error("release not found in catalog: {0}")]
    ReleaseNotFound(String),

    #[error("upgrade {upgrade} is not available for release {release}")]
    UpgradeNotAvailable { release: String, upgrade: u32 },

    #[error("invalid state code: {0}")]
    InvalidStateCode(String),

    #[error("state {0} not supported")]
    UnsupportedState(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("parquet error: {0}")]
    Parquet(String),
}
