//! File payload transport
//!
//! The legacy system serves attachment bytes over HTTP. The storage route
//! recorded on each source file row is encoded (URL-safe base64, reversible)
//! and appended to the configured endpoint to form the download locator.
//! Fetching is behind a trait so the file migrator can be exercised without
//! a live endpoint.

use std::future::Future;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::error::MigrateError;

/// Build the download locator for a legacy storage route.
pub fn download_locator(endpoint: &str, route: &str) -> String {
    format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        URL_SAFE_NO_PAD.encode(route.as_bytes())
    )
}

/// Recover the legacy route from an encoded locator segment. The transform
/// is deterministic and reversible by construction.
pub fn decode_route(segment: &str) -> Result<String, MigrateError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| MigrateError::InvalidPath(format!("bad route segment: {e}")))?;
    String::from_utf8(bytes).map_err(|e| MigrateError::InvalidPath(format!("bad route bytes: {e}")))
}

/// Capability to fetch a file payload by locator.
pub trait PayloadFetcher {
    fn fetch(
        &self,
        locator: &str,
    ) -> impl Future<Output = Result<Vec<u8>, MigrateError>> + Send;
}

/// Production fetcher: HTTP GET with a bounded timeout. The timeout is the
/// only engine-imposed cancellation; there are no internal retries — a
/// `TransferFailure` is retryable by the caller.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, MigrateError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MigrateError::Config(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

impl PayloadFetcher for HttpFetcher {
    fn fetch(
        &self,
        locator: &str,
    ) -> impl Future<Output = Result<Vec<u8>, MigrateError>> + Send {
        let request = self.client.get(locator);
        let locator = locator.to_string();
        async move {
            let response = request.send().await.map_err(|e| {
                let reason = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                };
                MigrateError::TransferFailure {
                    locator: locator.clone(),
                    reason,
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(MigrateError::TransferFailure {
                    locator,
                    reason: format!("HTTP {status}"),
                });
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| MigrateError::TransferFailure {
                    locator,
                    reason: e.to_string(),
                })?;
            Ok(bytes.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_is_deterministic() {
        let a = download_locator("http://legacy:8080/files", "docs/2019/informe.pdf");
        let b = download_locator("http://legacy:8080/files/", "docs/2019/informe.pdf");
        assert_eq!(a, b);
    }

    #[test]
    fn test_locator_round_trips_route() {
        let route = "docs/año 2019/informe final.pdf";
        let locator = download_locator("http://legacy/files", route);
        let segment = locator.rsplit('/').next().unwrap();
        assert_eq!(decode_route(segment).unwrap(), route);
    }

    #[test]
    fn test_encoded_segment_is_transport_safe() {
        let locator = download_locator("http://legacy/files", "a/b c?d=e&f");
        let segment = locator.rsplit('/').next().unwrap();
        assert!(segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_route("not base64 !!!").is_err());
    }
}
