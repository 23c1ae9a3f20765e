use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

use crate::clients::ChainClient;
use crate::models::{
    payout::{Batch, TransferInstruction},
    reward::Mutez,
};

/// Per-transfer limits attached to every instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub fee: Mutez,
    pub gas_limit: u64,
    pub storage_limit: u64,
}

/// Unsigned operation for one batch, ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgedOperation {
    pub branch: String,
    pub instructions: Vec<TransferInstruction>,
    pub unsigned: String,
    /// Counter consumed by the last instruction; the next batch starts after it.
    pub last_counter: u64,
}

impl ForgedOperation {
    pub fn first_counter(&self) -> Option<u64> {
        self.instructions.first().map(|i| i.counter)
    }
}

pub struct OperationBuilder {
    chain: Arc<dyn ChainClient>,
    source: String,
    limits: TransferLimits,
}

impl OperationBuilder {
    pub fn new(chain: Arc<dyn ChainClient>, source: impl Into<String>, limits: TransferLimits) -> Self {
        Self {
            chain,
            source: source.into(),
            limits,
        }
    }

    /// One transfer per payment, with counters `counter + 1 ..= counter + n`.
    ///
    /// Returns the instructions and the last counter used.
    pub fn instructions(&self, counter: u64, batch: &Batch) -> (Vec<TransferInstruction>, u64) {
        let instructions: Vec<_> = batch
            .payments
            .iter()
            .zip(counter + 1..)
            .map(|(payment, counter)| TransferInstruction {
                source: self.source.clone(),
                destination: payment.destination.clone(),
                amount: payment.amount,
                fee: self.limits.fee,
                gas_limit: self.limits.gas_limit,
                storage_limit: self.limits.storage_limit,
                counter,
            })
            .collect();

        let last = counter + instructions.len() as u64;
        (instructions, last)
    }

    /// Forges the batch against `branch`. Returns `None` for an empty batch.
    pub async fn build(&self, branch: &str, counter: u64, batch: &Batch) -> Result<Option<ForgedOperation>> {
        if batch.is_empty() {
            return Ok(None);
        }

        let (instructions, last_counter) = self.instructions(counter, batch);
        let unsigned = self
            .chain
            .forge_operation(branch, &instructions)
            .await
            .with_context(|| format!("failed to forge batch {}", batch.index))?;

        debug!(
            batch = batch.index,
            transfers = instructions.len(),
            first_counter = counter + 1,
            last_counter,
            "forged batch operation"
        );

        Ok(Some(ForgedOperation {
            branch: branch.to_string(),
            instructions,
            unsigned,
            last_counter,
        }))
    }

    /// Total amount plus fees the batch will debit from the source account.
    pub fn cost(&self, batch: &Batch) -> Mutez {
        batch
            .total()
            .saturating_add(self.limits.fee.saturating_mul(batch.len() as u64))
    }
}
