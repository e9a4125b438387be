use std::time::{Duration, Instant};

/// Deterministic trailing-edge debouncer.
///
/// The debouncer never reads a clock; every call takes `now` explicitly so the
/// same sequence of calls always produces the same firings. Async drivers own
/// the timer and call [`Debouncer::poll`] once the deadline has passed.
///
/// Ordering contract:
/// - A burst of `notify` calls spaced closer than `quiet` fires once.
/// - The fired value is always the one passed to the last `notify` of the burst.
#[derive(Debug)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<Pending<T>>,
    coalesced: u64,
}

#[derive(Debug)]
struct Pending<T> {
    value: T,
    deadline: Instant,
}

impl<T> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
            coalesced: 0,
        }
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    /// Number of values replaced by a newer `notify` before they could fire.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    /// Records `value` as the latest of the current burst and restarts the
    /// quiet window. Returns the new deadline.
    pub fn notify(&mut self, value: T, now: Instant) -> Instant {
        let deadline = now + self.quiet;
        if self.pending.replace(Pending { value, deadline }).is_some() {
            self.coalesced += 1;
        }
        deadline
    }

    /// Fires the pending value if its quiet window has elapsed at `now`.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some(p) if now >= p.deadline => self.pending.take().map(|p| p.value),
            _ => None,
        }
    }

    /// Drops the pending value without firing it.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.value)
    }
}
