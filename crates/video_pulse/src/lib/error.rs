#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid YouTube URL: {0}")]
    InvalidUrl(String),
}
