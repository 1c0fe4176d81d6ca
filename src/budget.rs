use std::sync::atomic::{AtomicUsize, Ordering};

/// Caps how many calls a paid recognition engine may receive in one run.
///
/// Shared by every worker; `try_consume` is a single atomic check-and-take,
/// so concurrent photos never overspend.
#[derive(Debug)]
pub struct RecognitionBudget {
    limit: Option<usize>,
    used: AtomicUsize,
}

impl RecognitionBudget {
    /// `None` means unbounded.
    pub fn new(limit: Option<usize>) -> Self {
        RecognitionBudget {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Reserves one call. Returns false once the limit is reached.
    pub fn try_consume(&self) -> bool {
        match self.limit {
            None => {
                self.used.fetch_add(1, Ordering::SeqCst);
                true
            }
            Some(limit) => self
                .used
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                    (used < limit).then_some(used + 1)
                })
                .is_ok(),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> Option<usize> {
        self.limit.map(|limit| limit.saturating_sub(self.used()))
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }
}

impl Default for RecognitionBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}
