//! Error types for catalog search.

use thiserror::Error;

/// Errors that reject a search before any probe is issued.
///
/// Probe failures, an unreachable catalog and an expired barrier are not
/// errors: they degrade to fewer (or zero) results.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Query was empty or only whitespace.
    #[error("Invalid search query '{query}': {reason}")]
    InvalidQuery {
        /// The rejected query
        query: String,
        /// Why it was rejected
        reason: String,
    },
}
