//! Forwarding tables.
//!
//! # Responsibilities
//! - Strategy choice: longest-prefix lookup of the strategy for a name
//! - FIB: next hops per name prefix
//! - Content store: capacity limit
//!
//! # Design Decisions
//! - Prefix matching is per name component, so `/a` covers `/a/b` but not `/ab`
//! - No wildcard or regex matching, lookups walk the name's prefixes

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::TablesConfig;
use crate::forwarder::faces::FaceId;

/// True if `prefix` covers `name` component-wise.
pub fn name_has_prefix(name: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return name.starts_with('/');
    }
    match name.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Strategy assignments by name prefix.
#[derive(Debug, Clone, Default)]
pub struct StrategyChoice {
    entries: BTreeMap<String, String>,
}

impl StrategyChoice {
    pub fn from_config(tables: &TablesConfig) -> Self {
        Self {
            entries: tables.strategy_choice.clone(),
        }
    }

    /// Assign `strategy` to `prefix`, replacing any previous assignment.
    pub fn insert(&mut self, prefix: impl Into<String>, strategy: impl Into<String>) {
        self.entries.insert(prefix.into(), strategy.into());
    }

    /// Strategy of the longest assigned prefix covering `name`.
    pub fn find_effective(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(prefix, _)| name_has_prefix(name, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, strategy)| strategy.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One next hop of a FIB entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NextHop {
    pub face: FaceId,
    pub cost: u64,
}

/// Forwarding information base.
#[derive(Debug, Clone, Default)]
pub struct Fib {
    entries: BTreeMap<String, Vec<NextHop>>,
}

impl Fib {
    /// Add or update the next hop through `face` for `prefix`.
    pub fn add_next_hop(&mut self, prefix: &str, face: FaceId, cost: u64) {
        let hops = self.entries.entry(prefix.to_string()).or_default();
        match hops.iter_mut().find(|hop| hop.face == face) {
            Some(hop) => hop.cost = cost,
            None => hops.push(NextHop { face, cost }),
        }
        hops.sort_by_key(|hop| hop.cost);
    }

    /// Remove the next hop through `face`. Drops the entry when it empties.
    pub fn remove_next_hop(&mut self, prefix: &str, face: FaceId) -> bool {
        let Some(hops) = self.entries.get_mut(prefix) else {
            return false;
        };
        let before = hops.len();
        hops.retain(|hop| hop.face != face);
        let removed = hops.len() != before;
        if hops.is_empty() {
            self.entries.remove(prefix);
        }
        removed
    }

    /// Drop every next hop through `face`. Returns the number of entries
    /// touched.
    pub fn remove_face(&mut self, face: FaceId) -> usize {
        let mut touched = 0;
        self.entries.retain(|_, hops| {
            let before = hops.len();
            hops.retain(|hop| hop.face != face);
            if hops.len() != before {
                touched += 1;
            }
            !hops.is_empty()
        });
        touched
    }

    /// Next hops of the longest matching entry.
    pub fn longest_prefix_match(&self, name: &str) -> Option<&[NextHop]> {
        self.entries
            .iter()
            .filter(|(prefix, _)| name_has_prefix(name, prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, hops)| hops.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Content store limits. Data packets are not processed, so only the
/// capacity is tracked.
#[derive(Debug, Clone)]
pub struct ContentStore {
    capacity: usize,
}

impl ContentStore {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Change the capacity. Returns the previous one.
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        std::mem::replace(&mut self.capacity, capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBootstrap;
    use crate::config::defaults::{BEST_ROUTE_STRATEGY, MULTICAST_STRATEGY};

    #[test]
    fn prefix_matching_is_component_wise() {
        assert!(name_has_prefix("/a/b", "/a"));
        assert!(name_has_prefix("/a", "/a"));
        assert!(name_has_prefix("/anything", "/"));
        assert!(!name_has_prefix("/ab", "/a"));
        assert!(!name_has_prefix("/b", "/a"));
    }

    #[test]
    fn builtin_strategy_choice() {
        let config = ConfigBootstrap::default_config();
        let choice = StrategyChoice::from_config(&config.tables);

        assert_eq!(choice.len(), 5);
        assert_eq!(choice.find_effective("/example/data"), Some(BEST_ROUTE_STRATEGY));
        assert_eq!(choice.find_effective("/localhost/app"), Some(MULTICAST_STRATEGY));
        assert_eq!(choice.find_effective("/localhost/nfd/rib"), Some(BEST_ROUTE_STRATEGY));
        assert_eq!(choice.find_effective("/ndn/broadcast/x"), Some(MULTICAST_STRATEGY));
    }

    #[test]
    fn fib_keeps_hops_sorted_by_cost() {
        let mut fib = Fib::default();
        fib.add_next_hop("/a", FaceId::from_raw(300), 20);
        fib.add_next_hop("/a", FaceId::from_raw(301), 10);
        fib.add_next_hop("/a", FaceId::from_raw(300), 5);

        let hops = fib.longest_prefix_match("/a/b").unwrap();
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].cost, 5);

        assert!(fib.remove_next_hop("/a", FaceId::from_raw(300)));
        assert!(fib.remove_next_hop("/a", FaceId::from_raw(301)));
        assert!(fib.is_empty());
    }

    #[test]
    fn removing_a_face_clears_its_next_hops() {
        let mut fib = Fib::default();
        let gone = FaceId::from_raw(300);
        fib.add_next_hop("/a", gone, 10);
        fib.add_next_hop("/a", FaceId::from_raw(301), 20);
        fib.add_next_hop("/b", gone, 10);

        assert_eq!(fib.remove_face(gone), 2);
        assert_eq!(fib.len(), 1);
        assert_eq!(fib.longest_prefix_match("/a/x").unwrap()[0].face, FaceId::from_raw(301));
        assert!(fib.longest_prefix_match("/b").is_none());
    }

    #[test]
    fn content_store_capacity_can_change() {
        let mut cs = ContentStore::new(100);
        assert_eq!(cs.set_capacity(10), 100);
        assert_eq!(cs.capacity(), 10);
    }
}
