//! Fetching JSON documents from probe targets.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Url;
use tracing::debug;

use crate::probe::ProbeError;

/// HTTP client shared by all probes.
#[derive(Debug, Clone, Default)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    /// Create a fetcher with a fresh connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// GET `target` and return the response body.
    ///
    /// `headers` are sent with the request. A non-2xx status, a transport
    /// error or an expired `timeout` is reported as
    /// [`ProbeError::FetchFailed`].
    pub async fn fetch(
        &self,
        target: &str,
        headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Bytes, ProbeError> {
        let url = Url::parse(target).map_err(|e| ProbeError::InvalidTarget {
            target: target.to_string(),
            message: e.to_string(),
        })?;

        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let failed = |message: String| ProbeError::FetchFailed {
            target: target.to_string(),
            message,
        };

        let response = request.send().await.map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("unexpected status {}", status)));
        }

        let body = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        debug!(url = target, status = status.as_u16(), bytes = body.len(), "Fetched target");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_target() {
        let fetcher = Fetcher::new();
        let err = fetcher
            .fetch("not a url", &HashMap::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::InvalidTarget { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_target() {
        // Bind and drop a listener to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = Fetcher::new();
        let err = fetcher
            .fetch(
                &format!("http://{}/data", addr),
                &HashMap::new(),
                Duration::from_secs(2),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::FetchFailed { .. }));
    }
}
