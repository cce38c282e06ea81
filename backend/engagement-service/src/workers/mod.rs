pub mod retention_sweeper;
pub mod sweep_scheduler;

pub use retention_sweeper::{RetentionSweeper, SweepReport};
pub use sweep_scheduler::SweepScheduler;
