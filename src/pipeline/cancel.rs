use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ReconstructionError, Result};

/// Loops poll the token every this many iterations.
pub const CHECK_INTERVAL: usize = 4096;

/// Shared deadline / cancellation flag.
///
/// Cloning is cheap and every clone observes the same flag, so a caller can keep
/// one handle and cancel a run that is executing on other threads.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Option<Duration>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: deadline.map(|d| Instant::now() + d),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::Relaxed) {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.flag.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    /// Returns `Cancelled` naming the stage that observed it.
    pub fn check(&self, stage: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(ReconstructionError::Cancelled(format!(
                "stopped during {}",
                stage
            )))
        } else {
            Ok(())
        }
    }

    /// Cheap variant for hot loops: only polls every `CHECK_INTERVAL` iterations.
    #[inline]
    pub fn check_every(&self, iteration: usize, stage: &str) -> Result<()> {
        if iteration % CHECK_INTERVAL == 0 {
            self.check(stage)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(token.check("test").is_ok());
        other.cancel();
        assert!(matches!(
            token.check("smoothing"),
            Err(ReconstructionError::Cancelled(msg)) if msg.contains("smoothing")
        ));
    }

    #[test]
    fn test_elapsed_deadline_cancels() {
        let token = CancellationToken::with_deadline(Some(Duration::ZERO));
        assert!(token.is_cancelled());
        let relaxed = CancellationToken::with_deadline(Some(Duration::from_secs(3600)));
        assert!(!relaxed.is_cancelled());
    }

    #[test]
    fn test_check_every_skips_between_intervals() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.check_every(1, "loop").is_ok());
        assert!(token.check_every(CHECK_INTERVAL, "loop").is_err());
    }
}
