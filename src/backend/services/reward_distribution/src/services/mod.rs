pub mod batcher;
pub mod calculator;
pub mod engine;
pub mod liquidity;
pub mod operation;
pub mod queue;
pub mod scheduler;
pub mod submitter;

pub use batcher::{batch_payments, flatten_payments};
pub use calculator::RewardCalculator;
pub use engine::PayoutEngine;
pub use liquidity::LiquidityResolver;
pub use operation::{ForgedOperation, OperationBuilder, TransferLimits};
pub use queue::{JobOutcome, PayoutJob, PayoutQueue};
pub use scheduler::CycleWatcher;
pub use submitter::Submitter;
