//! Index errors

use thiserror::Error;

/// Errors surfaced by the index lifecycle
#[derive(Debug, Error)]
pub enum IndexError {
    /// The initial LIST for a kind failed. Typically an RBAC problem; the
    /// service cannot start without a complete cache.
    #[error("initial {kind} list failed: {source}")]
    InitialList {
        kind: String,
        #[source]
        source: kube::Error,
    },
}
