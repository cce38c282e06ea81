pub mod comments;
pub mod counters;
pub mod ledger;
pub mod posts;
pub mod supervisor;

pub use comments::CommentService;
pub use counters::{CounterSynchronizer, Delta};
pub use ledger::EngagementLedger;
pub use posts::PostService;
pub use supervisor::{ConsistencySupervisor, TxFuture};
