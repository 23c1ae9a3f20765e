//! reqwest-backed implementations of the client traits.

mod indexer;
mod node;
mod notifier;

pub use indexer::TzktClient;
pub use node::NodeClient;
pub use notifier::WebhookNotifier;

use anyhow::{anyhow, Context, Result};
use reqwest::Response;
use url::Url;

/// Parses `base` so that relative paths join under it instead of replacing
/// its last segment.
pub(crate) fn base_url(base: &str) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("invalid base url {base}"))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base.join(path.trim_start_matches('/'))
        .with_context(|| format!("invalid endpoint path {path}"))
}

/// Turns a non-success response into an error carrying the body.
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!("{url} returned {status}: {body}"))
}
