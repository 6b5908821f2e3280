//! Deferred task scheduler.
//!
//! # Responsibilities
//! - Run a task once after a delay, on the reactor thread
//! - Cancel pending events by id
//! - Forget every pending event on reset
//!
//! # Design Decisions
//! - Timers are reactor handlers; the scheduler only tracks which events are still owed
//! - Event ids are never reused, so a timer surviving a reset can never fire

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::observability::targets;
use crate::runtime::reactor::Reactor;

/// Identifier of a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "event-{}", self.0)
    }
}

/// Process-wide scheduler for deferred tasks.
pub struct Scheduler {
    reactor: Arc<Reactor>,
    events: Arc<DashMap<EventId, CancellationToken>>,
    next_id: AtomicU64,
    resets: AtomicU64,
}

impl Scheduler {
    pub fn new(reactor: Arc<Reactor>) -> Self {
        Self {
            reactor,
            events: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            resets: AtomicU64::new(0),
        }
    }

    /// Run `task` on the reactor thread after `delay`.
    pub fn schedule<F>(&self, delay: Duration, task: F) -> EventId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = EventId(self.next_id.fetch_add(1, Ordering::AcqRel));
        let token = CancellationToken::new();
        self.events.insert(id, token.clone());

        let events = Arc::clone(&self.events);
        let accepted = self.reactor.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if events.remove(&id).is_some() {
                        task();
                    }
                }
            }
        });

        if !accepted {
            self.events.remove(&id);
            tracing::warn!(target: targets::SCHEDULER, %id, "reactor rejected timer");
        }
        id
    }

    /// Cancel a pending event. Returns false if it already fired or was cancelled.
    pub fn cancel(&self, id: EventId) -> bool {
        match self.events.remove(&id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.events.contains_key(&id)
    }

    /// Number of events still owed.
    pub fn pending(&self) -> usize {
        self.events.len()
    }

    /// Cancel every pending event. Idempotent, safe with no run active.
    pub fn reset(&self) {
        let cancelled = self.events.len();
        self.events.retain(|_, token| {
            token.cancel();
            false
        });
        self.resets.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(target: targets::SCHEDULER, cancelled, "scheduler reset");
    }

    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn setup() -> (Arc<Reactor>, Scheduler) {
        let reactor = Arc::new(Reactor::new());
        let scheduler = Scheduler::new(Arc::clone(&reactor));
        (reactor, scheduler)
    }

    #[test]
    fn event_fires_after_delay() {
        let (reactor, scheduler) = setup();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let handle = reactor.handle();

        let id = scheduler.schedule(Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            handle.stop();
        });
        assert!(scheduler.is_pending(id));

        reactor.run().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn cancelled_event_never_fires() {
        let (reactor, scheduler) = setup();
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);

        let id = scheduler.schedule(Duration::from_millis(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));

        let handle = reactor.handle();
        scheduler.schedule(Duration::from_millis(20), move || handle.stop());
        reactor.run().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reset_forgets_pending_events() {
        let (_reactor, scheduler) = setup();
        for _ in 0..3 {
            scheduler.schedule(Duration::from_secs(60), || {});
        }
        assert_eq!(scheduler.pending(), 3);

        scheduler.reset();
        scheduler.reset();
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.reset_count(), 2);
    }

    #[test]
    fn ids_are_unique_across_resets() {
        let (_reactor, scheduler) = setup();
        let first = scheduler.schedule(Duration::from_secs(1), || {});
        scheduler.reset();
        let second = scheduler.schedule(Duration::from_secs(1), || {});
        assert!(second > first);
    }

    #[test]
    fn timers_target_current_generation() {
        let (reactor, scheduler) = setup();
        let stale = reactor.handle();
        reactor.reset();
        assert!(!stale.is_live());

        let id = scheduler.schedule(Duration::from_secs(1), || {});
        assert!(scheduler.is_pending(id));
        assert_eq!(reactor.queued_jobs(), 1);
    }
}
