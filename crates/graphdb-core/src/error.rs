use thiserror::Error;

/// Failures reported by the graph store.
///
/// Lookups of unknown items, deletes of absent relations and expansions with
/// no matches are not errors: they produce empty results.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A relation referenced a value that was never stored while `autostore`
    /// is disabled.
    #[error("unknown item {0}; store it first or enable autostore")]
    UnknownItem(String),

    /// Malformed request (empty predicate name, bad path, merging two items).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Forward and reverse indexes disagree. Never expected at runtime.
    #[error("relation index consistency violation: {0}")]
    Consistency(String),

    /// The persistent backend failed; the in-memory mutation was rolled back.
    #[error("storage backend failure: {0}")]
    Storage(#[from] std::io::Error),
}

pub type Result<T, E = GraphError> = std::result::Result<T, E>;
