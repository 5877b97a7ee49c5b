//! Cooperative cancellation checked between pipeline stages

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag
///
/// Cloning shares the flag. The pipeline only polls it between stages, so a
/// cancel lands at the next stage boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] if the flag is set
    pub fn checkpoint(&self, next_stage: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled {
                stage: next_stage.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint() {
        let flag = CancelFlag::new();
        let shared = flag.clone();
        assert!(flag.checkpoint("paste").is_ok());
        shared.cancel();
        let err = flag.checkpoint("mesh").unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("mesh"));
    }
}
