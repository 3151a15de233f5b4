mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use crate::error::{Error, Result};
use bytes::Bytes;
use tracing::debug;

/// GETs `url` and returns the body. Transport failures and non-success
/// statuses are reported as distinct errors.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Bytes> {
    let parsed = reqwest::Url::parse(url).map_err(|e| Error::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    let resp = client.execute(req).await.map_err(|source| Error::Fetch {
        url: url.to_string(),
        source,
    })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::UpstreamStatus {
            url: url.to_string(),
            status,
        });
    }

    let body = resp.bytes().await.map_err(|source| Error::Fetch {
        url: url.to_string(),
        source,
    })?;
    debug!(url, bytes = body.len(), "Upstream body received");
    Ok(body)
}
