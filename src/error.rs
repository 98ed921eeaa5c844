use thiserror::Error;

/// Failure to fetch a manifest or preload a slide image.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The slide has no `src`, or the reference could not be resolved.
    #[error("invalid resource url: {0}")]
    InvalidUrl(String),

    #[error("unsupported url scheme `{0}`")]
    UnsupportedScheme(String),

    /// The server answered with anything other than `200 OK`.
    #[error("unexpected status {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("undecodable image: {0}")]
    Decode(#[from] image::ImageError),

    /// The decode worker panicked or was cancelled.
    #[error("decode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
