use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmenterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Page render failed for page {page_index}: {reason}")]
    PageRender { page_index: usize, reason: String },

    #[error("API key missing: pass --api-key or set OPENAI_API_KEY")]
    MissingApiKey,

    #[error("Output directory error: {reason}")]
    OutputDirectory { reason: String },

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SegmenterError>;
