//! The shared node store underneath a cache: a policy-driven LRU arena
//! keyed by [`NodeKey`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::key::NodeKey;

use super::node::CachedNode;
use super::policy::CachePolicy;

struct Entry {
    node: Arc<CachedNode>,
    expires: Option<Instant>,
}

/// Monotonic counters for one store's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from the store.
    pub hits: u64,
    /// Lookups that found nothing usable (absent or expired).
    pub misses: u64,
}

/// One generation of the shared cache store.
///
/// A policy swap closes the store; a closed store serves no further inserts
/// but in-flight readers keep the `Arc`s they already obtained.
pub struct NodeStore {
    policy: Arc<dyn CachePolicy>,
    nodes: Mutex<LruCache<NodeKey, Entry>>,
    closed: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl NodeStore {
    /// A fresh store observing `policy`.
    pub fn new(policy: Arc<dyn CachePolicy>) -> Self {
        let capacity = policy.capacity();
        NodeStore {
            policy,
            nodes: Mutex::new(LruCache::new(capacity)),
            closed: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached node, honoring its time-to-live.
    pub fn get(&self, key: &NodeKey) -> Option<Arc<CachedNode>> {
        let mut nodes = self.nodes.lock();
        let expired = match nodes.get(key) {
            Some(entry) => match entry.expires {
                Some(at) if at <= Instant::now() => true,
                _ => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(Arc::clone(&entry.node));
                }
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if expired {
            nodes.pop(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts (or replaces) a node, if the policy admits it and the store
    /// is still open. Replacement is atomic per node: readers observe the
    /// old snapshot or the new one, never a mixture.
    pub fn put(&self, node: Arc<CachedNode>) {
        if self.closed.load(Ordering::Acquire) || !self.policy.is_cacheable(&node) {
            return;
        }
        let expires = self
            .policy
            .time_to_live(&node)
            .map(|ttl| Instant::now() + ttl);
        let key = node.key().clone();
        self.nodes.lock().put(key, Entry { node, expires });
    }

    /// Drops one node. Returns whether it was present.
    pub fn remove(&self, key: &NodeKey) -> bool {
        self.nodes.lock().pop(key).is_some()
    }

    /// Drops `key` and every cached node whose parent chain passes through
    /// it. Children only reachable through uncached ancestors are untouched;
    /// they reload on next access.
    pub fn remove_subtree(&self, key: &NodeKey) {
        let mut nodes = self.nodes.lock();
        let parents: FxHashMap<NodeKey, Option<NodeKey>> = nodes
            .iter()
            .map(|(k, e)| (k.clone(), e.node.parent().cloned()))
            .collect();
        let doomed: Vec<NodeKey> = parents
            .keys()
            .filter(|k| {
                let mut cursor = Some((*k).clone());
                while let Some(c) = cursor {
                    if &c == key {
                        return true;
                    }
                    cursor = parents.get(&c).cloned().flatten();
                }
                false
            })
            .cloned()
            .collect();
        debug!(key = %key, dropped = doomed.len(), "structural invalidation");
        for k in doomed {
            nodes.pop(&k);
        }
    }

    /// Marks the store closed and releases its contents.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.nodes.lock().clear();
    }

    /// Whether a policy swap has closed this store.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of currently cached nodes.
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Whether the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit/miss counters since the store was created.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::policy::LruTtlPolicy;
    use crate::document::DocumentView;
    use crate::key::SourceId;
    use crate::path::Name;
    use std::time::Duration;

    fn node(id: &str, parent: Option<&str>) -> Arc<CachedNode> {
        let source = SourceId::new("mem");
        Arc::new(CachedNode::from_document(DocumentView {
            key: NodeKey::new(source.clone(), id),
            parent: parent.map(|p| NodeKey::new(source.clone(), p)),
            primary_type: Name::qualified("nt", "unstructured"),
            mixins: Vec::new(),
            properties: Default::default(),
            children: Vec::new(),
            children_info: None,
        }))
    }

    fn key(id: &str) -> NodeKey {
        NodeKey::new(SourceId::new("mem"), id)
    }

    #[test]
    fn ttl_expiry_counts_as_a_miss() {
        let store = NodeStore::new(Arc::new(
            LruTtlPolicy::with_capacity(8).with_ttl(Duration::from_millis(1)),
        ));
        store.put(node("a", None));
        std::thread::sleep(Duration::from_millis(5));
        assert!(store.get(&key("a")).is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn closed_store_rejects_inserts_but_serves_held_arcs() {
        let store = NodeStore::new(Arc::new(LruTtlPolicy::with_capacity(8)));
        store.put(node("a", None));
        let held = store.get(&key("a")).unwrap();
        store.close();
        store.put(node("b", None));
        assert!(store.is_empty());
        // The snapshot obtained before the close is still usable.
        assert_eq!(held.key(), &key("a"));
    }

    #[test]
    fn subtree_removal_follows_cached_parent_chains() {
        let store = NodeStore::new(Arc::new(LruTtlPolicy::with_capacity(8)));
        store.put(node("root", None));
        store.put(node("a", Some("root")));
        store.put(node("b", Some("a")));
        store.put(node("other", None));
        store.remove_subtree(&key("a"));
        assert!(store.get(&key("a")).is_none());
        assert!(store.get(&key("b")).is_none());
        assert!(store.get(&key("root")).is_some());
        assert!(store.get(&key("other")).is_some());
    }
}
