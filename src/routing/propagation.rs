//! Automatic prefix propagation.
//!
//! # Responsibilities
//! - Decide which local prefixes to announce to the connected router
//! - Refresh announcements periodically on the shared scheduler
//! - Back off exponentially while no router is reachable
//!
//! # Design Decisions
//! - A router counts as reachable while the RIB holds a route to `/localhop/nfd`
//! - Only the shortest covering prefixes are announced; `/localhost` never leaves the host
//! - Each refresh schedules the next one; dropping the propagator cancels the pending event

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;

use crate::config::PrefixPropagationConfig;
use crate::forwarder::name_has_prefix;
use crate::observability::targets;
use crate::runtime::{EventId, Scheduler};

/// Prefix of the connected router's management service.
pub const HUB_PREFIX: &str = "/localhop/nfd";

const LOCAL_SCOPE: &str = "/localhost";

/// Exponential retry wait with up to 10% jitter, capped at `max`.
pub fn retry_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return base.min(max);
    }
    let factor = 2u32.saturating_pow(attempt.min(31));
    let capped = base.saturating_mul(factor).min(max);

    let jitter_range = u64::try_from(capped.as_millis()).unwrap_or(u64::MAX) / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    capped.saturating_add(Duration::from_millis(jitter)).min(max)
}

/// Reduce `prefixes` to the shortest covering set, leaving out local scope.
pub fn covering_prefixes<'a>(prefixes: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    let mut candidates: Vec<&str> = prefixes
        .into_iter()
        .filter(|prefix| !name_has_prefix(prefix, LOCAL_SCOPE) && !name_has_prefix(prefix, HUB_PREFIX))
        .collect();
    candidates.sort_by_key(|prefix| prefix.len());

    let mut covering: BTreeSet<String> = BTreeSet::new();
    for prefix in candidates {
        if !covering.iter().any(|kept| name_has_prefix(prefix, kept)) {
            covering.insert(prefix.to_string());
        }
    }
    covering
}

/// Counters and the current announcement set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropagationStatus {
    pub refreshes: u64,
    pub connected: bool,
    pub failed_attempts: u32,
    pub propagated: BTreeSet<String>,
}

/// Source of the RIB's registered prefixes.
pub trait PrefixSource: Send + Sync + 'static {
    fn prefixes(&self) -> Vec<String>;
}

struct Inner<S: PrefixSource> {
    config: PrefixPropagationConfig,
    scheduler: Arc<Scheduler>,
    source: S,
    status: Mutex<PropagationStatus>,
    next_event: Mutex<Option<EventId>>,
}

impl<S: PrefixSource> Inner<S> {
    fn refresh(&self) -> Duration {
        let prefixes = self.source.prefixes();
        let connected = prefixes.iter().any(|prefix| name_has_prefix(prefix, HUB_PREFIX));

        let mut status = self.status.lock();
        status.refreshes += 1;
        status.connected = connected;

        if connected {
            status.failed_attempts = 0;
            status.propagated = covering_prefixes(prefixes.iter().map(String::as_str));
            tracing::debug!(
                target: targets::PREFIX_PROPAGATOR,
                propagated = status.propagated.len(),
                "prefixes refreshed"
            );
            Duration::from_secs(self.config.refresh_interval)
        } else {
            if !status.propagated.is_empty() {
                tracing::info!(
                    target: targets::PREFIX_PROPAGATOR,
                    withdrawn = status.propagated.len(),
                    "router unreachable, withdrawing prefixes"
                );
            }
            status.propagated.clear();
            let wait = retry_backoff(
                status.failed_attempts,
                Duration::from_secs(self.config.base_retry_wait),
                Duration::from_secs(self.config.max_retry_wait),
            );
            status.failed_attempts = status.failed_attempts.saturating_add(1);
            wait
        }
    }

    fn arm(self: &Arc<Self>, delay: Duration) {
        let inner = Arc::clone(self);
        let id = self.scheduler.schedule(delay, move || {
            let next = inner.refresh();
            inner.arm(next);
        });
        *self.next_event.lock() = Some(id);
    }
}

/// Periodic prefix announcer bound to the shared scheduler.
pub struct AutoPrefixPropagator<S: PrefixSource> {
    inner: Arc<Inner<S>>,
}

impl<S: PrefixSource> AutoPrefixPropagator<S> {
    pub fn new(config: PrefixPropagationConfig, scheduler: Arc<Scheduler>, source: S) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                scheduler,
                source,
                status: Mutex::new(PropagationStatus::default()),
                next_event: Mutex::new(None),
            }),
        }
    }

    /// Schedule the first refresh one interval from now.
    pub fn start(&self) {
        let first = Duration::from_secs(self.inner.config.refresh_interval);
        self.inner.arm(first);
        tracing::info!(
            target: targets::PREFIX_PROPAGATOR,
            refresh_interval = self.inner.config.refresh_interval,
            cost = self.inner.config.cost,
            "propagation enabled"
        );
    }

    /// Run one refresh now and return the delay until the next one.
    pub fn refresh_now(&self) -> Duration {
        self.inner.refresh()
    }

    pub fn status(&self) -> PropagationStatus {
        self.inner.status.lock().clone()
    }

    /// The event of the next scheduled refresh.
    pub fn next_event(&self) -> Option<EventId> {
        *self.inner.next_event.lock()
    }
}

impl<S: PrefixSource> Drop for AutoPrefixPropagator<S> {
    fn drop(&mut self) {
        if let Some(id) = self.inner.next_event.lock().take() {
            self.inner.scheduler.cancel(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Reactor;

    struct Fixed(Vec<&'static str>);

    impl PrefixSource for Fixed {
        fn prefixes(&self) -> Vec<String> {
            self.0.iter().map(|p| p.to_string()).collect()
        }
    }

    fn scheduler() -> Arc<Scheduler> {
        Arc::new(Scheduler::new(Arc::new(Reactor::new())))
    }

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_secs(50);
        let max = Duration::from_secs(3600);
        assert_eq!(retry_backoff(0, base, max), base);
        assert!(retry_backoff(1, base, max) >= Duration::from_secs(100));
        assert!(retry_backoff(2, base, max) >= Duration::from_secs(200));
        assert_eq!(retry_backoff(20, base, max), max);
    }

    #[test]
    fn backoff_saturates_with_huge_limits() {
        let base = Duration::from_secs(u64::MAX / 4);
        assert_eq!(retry_backoff(8, base, Duration::MAX), Duration::MAX);
        assert!(retry_backoff(1, base, Duration::MAX) >= base * 2);
    }

    #[test]
    fn covering_set_skips_local_and_nested() {
        let covering = covering_prefixes(["/a/b", "/a", "/c/d", "/localhost/app", "/localhop/nfd"]);
        let expected: BTreeSet<String> = ["/a", "/c/d"].iter().map(|p| p.to_string()).collect();
        assert_eq!(covering, expected);
    }

    #[test]
    fn connected_refresh_announces_prefixes() {
        let config = PrefixPropagationConfig::default();
        let propagator = AutoPrefixPropagator::new(
            config.clone(),
            scheduler(),
            Fixed(vec!["/localhop/nfd", "/example/app"]),
        );

        let next = propagator.refresh_now();
        assert_eq!(next, Duration::from_secs(config.refresh_interval));
        let status = propagator.status();
        assert!(status.connected);
        assert_eq!(status.refreshes, 1);
        assert!(status.propagated.contains("/example/app"));
    }

    #[test]
    fn disconnected_refresh_backs_off() {
        let config = PrefixPropagationConfig::default();
        let propagator =
            AutoPrefixPropagator::new(config.clone(), scheduler(), Fixed(vec!["/example/app"]));

        let first = propagator.refresh_now();
        let second = propagator.refresh_now();
        assert_eq!(first, Duration::from_secs(config.base_retry_wait));
        assert!(second > first);
        let status = propagator.status();
        assert!(!status.connected);
        assert!(status.propagated.is_empty());
        assert_eq!(status.failed_attempts, 2);
    }

    #[test]
    fn drop_cancels_pending_refresh() {
        let scheduler = scheduler();
        let propagator = AutoPrefixPropagator::new(
            PrefixPropagationConfig::default(),
            Arc::clone(&scheduler),
            Fixed(vec![]),
        );
        propagator.start();
        let id = propagator.next_event().unwrap();
        assert!(scheduler.is_pending(id));

        drop(propagator);
        assert!(!scheduler.is_pending(id));
        assert_eq!(scheduler.pending(), 0);
    }
}
