use std::collections::VecDeque;
use std::fmt;

use crate::stat_addressing::StatId;
use crate::stat_error::Diagnostic;

/// Emitted when a recompute produces a value different from the cached one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatChanged {
    pub stat: StatId,
    pub old: f64,
    pub new: f64,
}

/// Returned by [`Scope::subscribe`](crate::stats::Scope::subscribe); pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

pub(crate) struct Subscriber {
    pub id: SubscriptionId,
    pub on_change: Box<dyn FnMut(f64, f64)>,
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Bounded history of recoverable problems. The oldest entries fall off first.
#[derive(Debug, Clone)]
pub(crate) struct DiagnosticLog {
    entries: VecDeque<Diagnostic>,
    capacity: usize,
    log: bool,
}

impl DiagnosticLog {
    pub fn new(capacity: usize, log: bool) -> Self {
        Self { entries: VecDeque::with_capacity(capacity.min(64)), capacity, log }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.log {
            log::warn!("{}", diagnostic);
        }
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        self.entries.drain(..).collect()
    }
}
