use thiserror::Error;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Error building the HTTP client")]
    BuildClient { source: reqwest::Error },

    #[error("Error sending request to '{url}'")]
    Send { url: String, source: reqwest::Error },

    #[error("Error reading the response from '{url}'")]
    ReadBody { url: String, source: reqwest::Error },
}
