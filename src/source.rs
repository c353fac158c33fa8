//! Remote image source abstraction.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, CONNECTION};
use reqwest::{Client, StatusCode};
use tracing::{debug, trace};

use crate::error::FetchError;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Where page images and tiles come from.
///
/// Implementations classify responses: 401/403 must surface as
/// [`FetchError::Auth`] so callers can stop the run instead of retrying.
pub trait ImageSource: Send + Sync {
    /// Fetches the body at `url`.
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;

    /// Checks that `url` resolves, without using the body.
    fn probe(&self, url: &str) -> impl Future<Output = Result<(), FetchError>> + Send {
        async move { self.fetch(url).await.map(|_| ()) }
    }
}

/// reqwest-backed source with a cookie store that lives as long as the session.
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    /// Builds a client around `jar`. A zero `timeout` keeps the transport default.
    pub fn new(jar: Arc<Jar>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("image/*, */*"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        let mut builder = Client::builder()
            .default_headers(headers)
            .user_agent(DEFAULT_USER_AGENT)
            .cookie_provider(jar);
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        trace!(url, "GET");
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|source| FetchError::Transport {
                    url: url.to_string(),
                    source,
                })?;

        classify_status(url, response.status())?;
        Ok(response)
    }
}

fn classify_status(url: &str, status: StatusCode) -> Result<(), FetchError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchError::Auth {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}

impl ImageSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.send(url).await?;
        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        debug!(url, bytes = body.len(), "Fetched");
        Ok(body.to_vec())
    }

    async fn probe(&self, url: &str) -> Result<(), FetchError> {
        self.send(url).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status("u", StatusCode::OK).is_ok());
        assert!(classify_status("u", StatusCode::UNAUTHORIZED)
            .unwrap_err()
            .is_auth());
        assert!(classify_status("u", StatusCode::FORBIDDEN)
            .unwrap_err()
            .is_auth());

        match classify_status("http://x/1", StatusCode::NOT_FOUND) {
            Err(FetchError::Status { url, status }) => {
                assert_eq!(url, "http://x/1");
                assert_eq!(status, 404);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_http_source_builds_with_and_without_timeout() {
        let jar = Arc::new(Jar::default());
        assert!(HttpSource::new(jar.clone(), Duration::ZERO).is_ok());
        assert!(HttpSource::new(jar, Duration::from_secs(5)).is_ok());
    }
}
