//! Cache policies: which nodes are cacheable and for how long.

use std::num::NonZeroUsize;
use std::time::Duration;

use super::node::CachedNode;

/// Default node capacity of the store backing a cache.
pub const DEFAULT_CACHE_SIZE: usize = 1024;

/// Decides which nodes a store keeps and their time-to-live.
///
/// Swapping the active policy replaces the whole store underneath the cache,
/// so policies can assume a fresh store observes them from its first insert.
pub trait CachePolicy: Send + Sync {
    /// Bounded number of nodes the store may hold.
    fn capacity(&self) -> NonZeroUsize;

    /// Time-to-live for a node, `None` to keep until evicted.
    fn time_to_live(&self, node: &CachedNode) -> Option<Duration>;

    /// Whether the node should be cached at all.
    fn is_cacheable(&self, _node: &CachedNode) -> bool {
        true
    }
}

/// Bounded LRU with an optional uniform time-to-live.
#[derive(Clone, Debug)]
pub struct LruTtlPolicy {
    capacity: NonZeroUsize,
    ttl: Option<Duration>,
}

impl LruTtlPolicy {
    /// A policy holding up to `capacity` nodes with no expiry.
    pub fn with_capacity(capacity: usize) -> Self {
        LruTtlPolicy {
            capacity: NonZeroUsize::new(capacity)
                .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CACHE_SIZE).expect("nonzero")),
            ttl: None,
        }
    }

    /// Adds a uniform time-to-live.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

impl Default for LruTtlPolicy {
    fn default() -> Self {
        LruTtlPolicy::with_capacity(DEFAULT_CACHE_SIZE)
    }
}

impl CachePolicy for LruTtlPolicy {
    fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    fn time_to_live(&self, _node: &CachedNode) -> Option<Duration> {
        self.ttl
    }
}
