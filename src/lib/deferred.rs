//! Lazily executed backend operations.
//!
//! Every I/O-bearing operation in this crate checks its arguments when it is
//! called and hands back a [`Deferred`]. Nothing reaches the backend until the
//! future is awaited, so callers can build several operations, reorder them or
//! drop them before committing to any I/O.

use futures_util::future::BoxFuture;

use crate::error::Result;

pub type Deferred<'a, T> = BoxFuture<'a, Result<T>>;

/// Fails with `InvalidArgument` when `value` is empty or only whitespace.
pub(crate) fn require(value: &str, message: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(crate::error::ReconcileError::InvalidArgument(
            message.to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_rejects_blank_values() {
        assert!(require("cluster-a", "cluster required").is_ok());
        let err = require("  ", "cluster required").unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(err.to_string(), "invalid argument: cluster required");
    }
}
