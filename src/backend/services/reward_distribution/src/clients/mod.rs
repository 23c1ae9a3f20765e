pub mod http;
pub mod traits;

pub use traits::{ChainClient, CyclePayout, IndexerClient, Notifier};
