use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::ensure_success;
use crate::clients::Notifier;
use crate::models::payout::PayoutReport;

/// Posts each finished payout report as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: Url) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, report: &PayoutReport) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(report)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
