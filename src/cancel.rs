//! Cooperative cancellation for long-running scans.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::Error;

/// A clone-able cancellation handle.
///
/// The collector checks the token once per tag ref and once per scoped
/// commit; callers writing tags check it before each write. A default token
/// is never cancelled.
///
/// ```rust
/// use tagreg::cancel::Token;
///
/// let token = Token::new();
/// assert!(token.check().is_ok());
/// token.cancel();
/// assert!(token.check().is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Token {
    flag: Arc<AtomicBool>,
}

impl Token {
    /// Create a fresh, uncancelled token.
    pub fn new() -> Self {
        Token::default()
    }

    /// Request cancellation. All clones observe the request.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Return `Error::Cancelled` if cancellation has been requested.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}
