//! Caller identity for connection affinity.
//!
//! The pool hands the same connection back to a caller that already holds
//! one, which is what keeps every statement of a transaction on a single
//! session. A caller is the logical task that runs a transaction block,
//! a `with_connection` closure or a worker; its id lives in a task-local
//! scope so nested calls inside that task find it again.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CALLER: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT: CallerId;
}

/// Identifies the logical task that owns a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerId(u64);

impl CallerId {
    /// Allocates a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CALLER.fetch_add(1, Ordering::Relaxed))
    }

    /// The id of the enclosing scope, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        CURRENT.try_with(|id| *id).ok()
    }

    /// The id of the enclosing scope, or a fresh one.
    #[must_use]
    pub fn current_or_next() -> Self {
        Self::current().unwrap_or_else(Self::next)
    }

    /// Runs `fut` with `self` as the current caller.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caller-{}", self.0)
    }
}

/// Runs `fut` inside the current caller scope, opening a new one when there
/// is none.
pub async fn in_caller_scope<F: Future>(fut: F) -> F::Output {
    match CallerId::current() {
        Some(_) => fut.await,
        None => CallerId::next().scope(fut).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_is_visible_to_nested_futures() {
        assert!(CallerId::current().is_none());
        let id = CallerId::next();
        let seen = id
            .scope(async { in_caller_scope(async { CallerId::current() }).await })
            .await;
        assert_eq!(seen, Some(id));
        assert!(CallerId::current().is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = CallerId::next();
        let b = CallerId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("caller-"));
    }
}
