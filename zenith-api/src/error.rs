use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to bind API server to {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("API server error: {0}")]
    Server(String),
}
