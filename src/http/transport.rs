//! Blocking HTTP transport used for every outbound API call.

use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// Per-request timeout. Calls are never retried.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that prevent a response from being produced at all.
///
/// Non-2xx statuses are not errors; they come back as a [`Response`].
#[derive(Error, Debug)]
pub enum HttpError {
    /// DNS, connect, TLS or timeout failure.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    /// The response body could not be read.
    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// A fully read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Issues a single GET. Implementations must bound each call with a timeout.
pub trait Transport: Send + Sync {
    /// `token` is sent as an OAuth `Authorization` header when present.
    fn get(&self, url: &str, token: Option<&str>) -> Result<Response, HttpError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn get(&self, url: &str, token: Option<&str>) -> Result<Response, HttpError> {
        (**self).get(url, token)
    }
}

/// [`Transport`] backed by a shared `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::builder()
            .timeout(timeout)
            .user_agent(concat!("refmirror/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str, token: Option<&str>) -> Result<Response, HttpError> {
        let mut request = self.agent.get(url).set("Accept", "application/json");
        if let Some(token) = token {
            request = request.set("Authorization", &format!("token {}", token));
        }

        let response = match request.call() {
            Ok(response) => response,
            // ureq reports 4xx/5xx as errors; callers interpret statuses themselves.
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(e)) => {
                return Err(HttpError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let status = response.status();
        let body = response.into_string().map_err(|source| HttpError::Body {
            url: url.to_string(),
            source,
        })?;

        Ok(Response::new(status, body))
    }
}
