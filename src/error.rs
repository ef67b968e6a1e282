/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum LivyHttpError {
    /// Every attempt failed at the network layer and the retry policy gave up.
    #[error("error sending http request to {url} and maximum retry encountered after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        url: String,
        /// Total number of attempts made, including the first one.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: reqwest::Error,
    },
    /// The endpoint answered with a status outside the accepted set.
    #[error("invalid status code '{status}' from {url} with error payload: {body}")]
    InvalidStatus {
        status: u16,
        url: String,
        body: String,
    },
    /// Authentication kind the client does not know how to speak.
    #[error("unsupported authentication type {0}")]
    UnsupportedAuth(String),
    /// Credentials for a known authentication kind could not be produced.
    #[error("authentication resolution failed: {0}")]
    Auth(String),
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    /// The underlying `reqwest` client could not be constructed.
    #[error("failed to build http client: {0}")]
    Build(reqwest::Error),
    #[error("failed to encode request body: {0}")]
    Encode(serde_json::Error),
    /// Response body did not match the requested shape.
    #[error("decode error: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl LivyHttpError {
    /// Returns `true` for failures raised by the retry loop itself: exhausted
    /// network retries or an unacceptable status code.
    pub fn is_http_client_failure(&self) -> bool {
        matches!(
            self,
            Self::RetriesExhausted { .. } | Self::InvalidStatus { .. }
        )
    }

    /// HTTP status of the final response, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::InvalidStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
