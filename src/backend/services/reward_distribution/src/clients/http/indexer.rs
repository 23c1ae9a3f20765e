use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{base_url, endpoint, ensure_success};
use crate::clients::IndexerClient;
use crate::models::{
    chain::{CycleInfo, Transaction, TransactionFilter},
    reward::RewardSnapshot,
};

const SPLIT_DELEGATOR_LIMIT: usize = 10_000;
const DEFAULT_PAGE_SIZE: usize = 1_000;

/// Client for a TzKT-compatible indexer API.
#[derive(Debug, Clone)]
pub struct TzktClient {
    client: Client,
    base: Url,
    page_size: usize,
}

#[derive(Debug, Deserialize)]
struct Alias {
    address: String,
}

#[derive(Debug, Deserialize)]
struct Parameter {
    entrypoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TransactionRow {
    hash: String,
    level: u64,
    sender: Alias,
    target: Option<Alias>,
    parameter: Option<Parameter>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Self {
            hash: row.hash,
            level: row.level,
            sender: row.sender.address,
            target: row.target.map(|t| t.address).unwrap_or_default(),
            entrypoint: row.parameter.and_then(|p| p.entrypoint),
        }
    }
}

impl TzktClient {
    pub fn new(base: &str) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            base: base_url(base)?,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn transactions_url(&self, filter: &TransactionFilter, offset: usize) -> Result<Url> {
        let mut url = endpoint(&self.base, "v1/operations/transactions")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("target", &filter.target);
            if let Some(entrypoint) = &filter.entrypoint {
                query.append_pair("entrypoint", entrypoint);
            }
            if let Some(level) = filter.max_level {
                query.append_pair("level.le", &level.to_string());
            }
            query
                .append_pair("status", "applied")
                .append_pair("sort.asc", "id")
                .append_pair("limit", &self.page_size.to_string())
                .append_pair("offset", &offset.to_string());
        }
        Ok(url)
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(%url, "indexer request");
        let response = self.client.get(url).send().await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

#[async_trait]
impl IndexerClient for TzktClient {
    async fn reward_split(&self, baker: &str, cycle: u32) -> Result<RewardSnapshot> {
        let mut url = endpoint(&self.base, &format!("v1/rewards/split/{baker}/{cycle}"))?;
        url.query_pairs_mut()
            .append_pair("limit", &SPLIT_DELEGATOR_LIMIT.to_string());
        self.fetch(url).await
    }

    async fn cycle_info(&self, cycle: u32) -> Result<CycleInfo> {
        self.fetch(endpoint(&self.base, &format!("v1/cycles/{cycle}"))?)
            .await
    }

    async fn search_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let mut transactions = Vec::new();
        let mut offset = 0;

        loop {
            let page: Vec<TransactionRow> = self.fetch(self.transactions_url(filter, offset)?).await?;
            let fetched = page.len();
            transactions.extend(page.into_iter().map(Transaction::from));

            if fetched < self.page_size {
                break;
            }
            offset += fetched;
        }

        debug!(contract = %filter.target, count = transactions.len(), "transaction search finished");
        Ok(transactions)
    }
}
