use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

use crate::{LivyHttpError, Result};

/// Response accepted by the client: its status was in the accepted set.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|err| {
            LivyHttpError::Decode(format!(
                "invalid JSON response body: {err}; body: {}",
                self.body
            ))
        })
    }
}
