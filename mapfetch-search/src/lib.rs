//! Mapfetch Search - Generation-tracked catalog search
//!
//! A search fans out one count probe and one detail probe per listed map.
//! Every probe carries the epoch it was issued under; results from an epoch
//! that has since been superseded are dropped instead of leaking into the
//! newer search.

pub mod aggregator;
pub mod coordinator;
pub mod errors;
pub mod generation;

// Re-export main types
pub use aggregator::{CommitOutcome, ResultAggregator, SearchProgress, WaitOutcome};
pub use coordinator::SearchCoordinator;
pub use errors::SearchError;
pub use generation::{Epoch, GenerationTracker};

/// Convenience type alias for Results with SearchError.
pub type Result<T> = std::result::Result<T, SearchError>;
