//! Cooperative cancellation (specification §5, §9).
//!
//! "model the cancel+deadline checker as a tiny object with two atomic
//! flags and a counter; cheap fast path (`counter++`; `if counter %
//! interval == 0 then deep-check`). Workers call `check()` rather than
//! yielding." This is that object.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct CancellationToken {
    /// Shared via `Arc` so a per-page token produced by `fork` observes the
    /// same external cancel signal as its parent (specification §5:
    /// cancellation and the per-page deadline are independent, but both
    /// must see one external "stop everything" flag).
    cancelled: Arc<AtomicBool>,
    /// Epoch milliseconds; 0 means "no deadline".
    deadline_millis: AtomicU64,
    counter: AtomicUsize,
    check_interval: usize,
}

impl CancellationToken {
    pub fn new(check_interval: usize) -> Self {
        CancellationToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline_millis: AtomicU64::new(0),
            counter: AtomicUsize::new(0),
            check_interval: check_interval.max(1),
        }
    }

    pub fn with_deadline(check_interval: usize, deadline: std::time::Duration) -> Self {
        let token = Self::new(check_interval);
        let target = now_millis() + deadline.as_millis() as u64;
        token.deadline_millis.store(target, Ordering::Relaxed);
        token
    }

    /// External signal: cancel unconditionally, checked at the next poll.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Derive a child token for one page's worth of work (specification
    /// §5: "a per-page deadline bounds total work on one page. Independent
    /// from the cancellation signal"). The child shares this token's
    /// external cancel flag but gets its own counter and deadline, so one
    /// page timing out never marks sibling pages as timed out.
    pub fn fork(&self, check_interval: usize, deadline: Option<Duration>) -> CancellationToken {
        let child = CancellationToken {
            cancelled: Arc::clone(&self.cancelled),
            deadline_millis: AtomicU64::new(0),
            counter: AtomicUsize::new(0),
            check_interval: check_interval.max(1),
        };
        if let Some(d) = deadline {
            let target = now_millis() + d.as_millis() as u64;
            child.deadline_millis.store(target, Ordering::Relaxed);
        }
        child
    }

    /// Cheap fast path on every call; only every `check_interval`-th call
    /// does the deeper clock/flag inspection.
    pub fn check(&self) -> Result<()> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.check_interval != 0 {
            return Ok(());
        }
        self.deep_check()
    }

    fn deep_check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }
        let deadline = self.deadline_millis.load(Ordering::Relaxed);
        if deadline != 0 && now_millis() >= deadline {
            return Err(Error::Timeout);
        }
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
