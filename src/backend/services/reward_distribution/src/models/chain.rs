use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub hash: String,
    pub level: u64,
    pub cycle: u32,
}

/// Cycle boundaries as reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleInfo {
    pub index: u32,
    pub first_level: u64,
    pub last_level: u64,
    pub snapshot_level: u64,
}

/// Historical transaction returned by an indexer search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub level: u64,
    pub sender: String,
    pub target: String,
    #[serde(default)]
    pub entrypoint: Option<String>,
}

/// Predicates for an indexer transaction search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionFilter {
    pub target: String,
    pub entrypoint: Option<String>,
    pub max_level: Option<u64>,
}

impl TransactionFilter {
    pub fn calls_to(target: impl Into<String>, entrypoint: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            entrypoint: Some(entrypoint.into()),
            max_level: None,
        }
    }

    pub fn up_to_level(mut self, level: u64) -> Self {
        self.max_level = Some(level);
        self
    }
}
