use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{base_url, endpoint, ensure_success};
use crate::clients::ChainClient;
use crate::models::{chain::BlockHeader, payout::TransferInstruction, reward::Mutez};

/// Watermark prepended to generic operations before signing.
const GENERIC_OPERATION_WATERMARK: &str = "03";
/// Ed25519/secp256k1/p256 signatures are all 64 bytes once the prefix is dropped.
const SIGNATURE_LEN: usize = 64;

/// Node RPC client; forging happens on the node and signing on a remote signer.
#[derive(Debug, Clone)]
pub struct NodeClient {
    client: Client,
    node: Url,
    signer: Url,
}

#[derive(Debug, Deserialize)]
struct HeaderResponse {
    hash: String,
    level: u64,
}

#[derive(Debug, Deserialize)]
struct LevelResponse {
    level: u64,
    cycle: u32,
}

#[derive(Debug, Serialize)]
struct ForgeRequest<'a> {
    branch: &'a str,
    contents: Vec<TransactionContent<'a>>,
}

/// Node RPCs take every numeric field of an operation as a decimal string.
#[derive(Debug, Serialize)]
struct TransactionContent<'a> {
    kind: &'static str,
    source: &'a str,
    fee: String,
    counter: String,
    gas_limit: String,
    storage_limit: String,
    amount: String,
    destination: &'a str,
}

impl<'a> From<&'a TransferInstruction> for TransactionContent<'a> {
    fn from(instruction: &'a TransferInstruction) -> Self {
        Self {
            kind: "transaction",
            source: &instruction.source,
            fee: instruction.fee.to_string(),
            counter: instruction.counter.to_string(),
            gas_limit: instruction.gas_limit.to_string(),
            storage_limit: instruction.storage_limit.to_string(),
            amount: instruction.amount.to_string(),
            destination: &instruction.destination,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignatureResponse {
    signature: String,
}

impl NodeClient {
    pub fn new(node_url: &str, signer_url: &str) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            node: base_url(node_url)?,
            signer: base_url(signer_url)?,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = endpoint(&self.node, path)?;
        debug!(%url, "node request");
        let response = self.client.get(url).send().await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn post<B: Serialize + ?Sized, T: serde::de::DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = endpoint(&self.node, path)?;
        debug!(%url, "node request");
        let response = self.client.post(url).json(body).send().await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn get_number(&self, path: &str) -> Result<u64> {
        let raw: String = self.get(path).await?;
        raw.parse()
            .with_context(|| format!("node returned a non-numeric value {raw:?}"))
    }
}

/// Appends the raw signature bytes of a base58 signature to the unsigned hex.
fn attach_signature(unsigned: &str, signature: &str) -> Result<String> {
    let decoded = bs58::decode(signature)
        .with_check(None)
        .into_vec()
        .with_context(|| format!("invalid signature {signature}"))?;
    if decoded.len() < SIGNATURE_LEN {
        bail!("signature {signature} is too short");
    }

    let raw = &decoded[decoded.len() - SIGNATURE_LEN..];
    Ok(format!("{unsigned}{}", hex::encode(raw)))
}

#[async_trait]
impl ChainClient for NodeClient {
    async fn current_block_header(&self) -> Result<BlockHeader> {
        let header: HeaderResponse = self.get("chains/main/blocks/head/header").await?;
        let level: LevelResponse = self
            .get(&format!("chains/main/blocks/{}/helpers/current_level", header.hash))
            .await?;
        if level.level != header.level {
            return Err(anyhow!(
                "level mismatch for block {}: header {} vs {}",
                header.hash,
                header.level,
                level.level
            ));
        }

        Ok(BlockHeader {
            hash: header.hash,
            level: header.level,
            cycle: level.cycle,
        })
    }

    async fn account_counter(&self, block: &str, address: &str) -> Result<u64> {
        self.get_number(&format!("chains/main/blocks/{block}/context/contracts/{address}/counter"))
            .await
    }

    async fn account_balance(&self, block: &str, address: &str) -> Result<Mutez> {
        self.get_number(&format!("chains/main/blocks/{block}/context/contracts/{address}/balance"))
            .await
    }

    async fn forge_operation(&self, branch: &str, contents: &[TransferInstruction]) -> Result<String> {
        let request = ForgeRequest {
            branch,
            contents: contents.iter().map(TransactionContent::from).collect(),
        };
        self.post("chains/main/blocks/head/helpers/forge/operations", &request)
            .await
    }

    async fn sign(&self, unsigned: &str, key: &str) -> Result<String> {
        let url = endpoint(&self.signer, &format!("keys/{key}"))?;
        let payload = format!("{GENERIC_OPERATION_WATERMARK}{unsigned}");
        let response = self.client.post(url).json(&payload).send().await?;
        let signed: SignatureResponse = ensure_success(response).await?.json().await?;

        attach_signature(unsigned, &signed.signature)
    }

    async fn inject_operation(&self, signed: &str) -> Result<String> {
        self.post("injection/operation?chain=main", signed).await
    }

    async fn included_operation_hashes(&self, block: &str) -> Result<Vec<Vec<String>>> {
        self.get(&format!("chains/main/blocks/{block}/operation_hashes"))
            .await
    }

    async fn contract_storage(&self, block: &str, address: &str) -> Result<Value> {
        self.get(&format!("chains/main/blocks/{block}/context/contracts/{address}/storage"))
            .await
    }

    async fn big_map_entry(&self, block: &str, map_id: u64, key: &str) -> Result<Option<Value>> {
        let url = endpoint(&self.node, &format!("chains/main/blocks/{block}/context/big_maps/{map_id}/{key}"))?;
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Ok(Some(ensure_success(response).await?.json().await?))
    }
}
