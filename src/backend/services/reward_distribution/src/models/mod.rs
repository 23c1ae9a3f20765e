pub mod chain;
pub mod payout;
pub mod reward;

pub use chain::{BlockHeader, CycleInfo, Transaction, TransactionFilter};
pub use payout::{Batch, BatchReport, BatchStatus, Payment, PayoutReport, ResumePoint, TransferInstruction};
pub use reward::{Earnings, LiquidityProvider, Mutez, Recipient, RewardSnapshot};
