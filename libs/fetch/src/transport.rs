//! Network transport seam.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::TransportError;
use crate::policy::RetryPolicy;

/// Fetches a URL body in one attempt. Retrying is the caller's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Bytes, TransportError>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a client honouring the policy's connect and total timeouts.
    pub fn new(policy: &RetryPolicy) -> reqwest::Result<Self> {
        let client = Client::builder()
            .connect_timeout(policy.connect_timeout)
            .timeout(policy.timeout)
            .user_agent(concat!("loadprep/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Bytes, TransportError> {
        debug!(url = %url, "GET");

        let response = self.client.get(url).send().await.map_err(classify_error)?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        response.bytes().await.map_err(classify_error)
    }
}

/// Map a response status to a transport error, or `None` for success.
pub fn classify_status(status: StatusCode) -> Option<TransportError> {
    if status.is_success() {
        return None;
    }

    let retryable = status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_EARLY | StatusCode::TOO_MANY_REQUESTS
        );

    if retryable {
        Some(TransportError::Transient(format!("status {}", status.as_u16())))
    } else {
        Some(TransportError::Rejected {
            status: status.as_u16(),
        })
    }
}

fn classify_error(err: reqwest::Error) -> TransportError {
    if err.is_builder() || err.is_redirect() {
        TransportError::Fatal(err.to_string())
    } else {
        TransportError::Transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        assert_eq!(classify_status(StatusCode::OK), None);
        assert_eq!(classify_status(StatusCode::NO_CONTENT), None);
    }

    #[test]
    fn test_classify_retryable() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
        ] {
            assert!(
                matches!(classify_status(status), Some(TransportError::Transient(_))),
                "{status} should be transient"
            );
        }
    }

    #[test]
    fn test_classify_rejected() {
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            Some(TransportError::Rejected { status: 404 })
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            Some(TransportError::Rejected { status: 403 })
        );
    }
}
