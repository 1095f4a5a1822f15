//! Engine services: posting, reversal, approval, aggregation, recompute.

pub mod approval;
pub mod collaborators;
pub mod hierarchy;
pub mod metrics;
pub mod posting;
pub mod recompute;
pub mod reversal;

pub use approval::ApprovalStateMachine;
pub use hierarchy::BalanceAggregator;
pub use posting::PostingEngine;
pub use recompute::Rebalancer;
pub use reversal::ReversalEngine;
