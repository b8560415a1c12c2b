//! The workspace document cache.
//!
//! [`DocumentCache`] is the sole point of truth for what a workspace's node
//! tree looks like right now: the persisted view read through connectors,
//! merged on demand with each session's transient overlay. Connector
//! round-trips are minimized by a bounded shared store and a single-flight
//! table that collapses concurrent loads of one key into one request.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::connector::ConnectorRegistry;
use crate::document::{Mutation, Property};
use crate::error::{OpOutcome, PartialCommitError, RepoError, Result};
use crate::key::{BlockKey, NodeKey};
use crate::path::Name;

mod node;
mod paging;
mod policy;
mod session;
mod store;

pub use node::{CachedNode, ChildList, ChildRef};
pub use paging::ChildIter;
pub use policy::{CachePolicy, LruTtlPolicy, DEFAULT_CACHE_SIZE};
pub use session::{SessionChanges, SessionId};
pub use store::{CacheStats, NodeStore};

/// Why a node is being invalidated.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InvalidationCause {
    /// The node's own state changed out-of-band; children stay cached.
    Local,
    /// The structure around the node changed (a federation boundary moved);
    /// cached descendants are dropped with it.
    Structural,
}

/// Receipt of a fully applied commit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    /// Per-node outcomes, all successful, in application order.
    pub outcomes: Vec<OpOutcome>,
}

impl CommitReceipt {
    /// Number of nodes whose mutations were applied.
    pub fn applied(&self) -> usize {
        self.outcomes.len()
    }
}

enum SlotState {
    /// A leader is reading from the connector.
    Pending,
    /// The load finished; every waiter gets the same result.
    Done(Result<Arc<CachedNode>>),
    /// The leader timed out; one waiter must retry with a fresh request.
    Retry,
}

struct LoadSlot {
    state: Mutex<SlotState>,
    cond: Condvar,
}

impl LoadSlot {
    fn new() -> Self {
        LoadSlot {
            state: Mutex::new(SlotState::Pending),
            cond: Condvar::new(),
        }
    }
}

/// The per-workspace document cache.
pub struct DocumentCache {
    connectors: Arc<ConnectorRegistry>,
    store: RwLock<Arc<NodeStore>>,
    loads: Mutex<FxHashMap<NodeKey, Arc<LoadSlot>>>,
    sessions: Mutex<FxHashMap<SessionId, SessionChanges>>,
}

impl DocumentCache {
    /// Creates a cache over the given connectors with the default policy.
    pub fn new(connectors: Arc<ConnectorRegistry>) -> Self {
        Self::with_policy(connectors, Arc::new(LruTtlPolicy::default()))
    }

    /// Creates a cache with an explicit initial policy.
    pub fn with_policy(connectors: Arc<ConnectorRegistry>, policy: Arc<dyn CachePolicy>) -> Self {
        DocumentCache {
            connectors,
            store: RwLock::new(Arc::new(NodeStore::new(policy))),
            loads: Mutex::new(FxHashMap::default()),
            sessions: Mutex::new(FxHashMap::default()),
        }
    }

    /// The current store generation. In-flight readers keep the snapshot
    /// they grabbed even across a policy swap.
    pub(crate) fn store(&self) -> Arc<NodeStore> {
        Arc::clone(&self.store.read())
    }

    /// The connector registry this cache reads through.
    pub(crate) fn connectors(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    /// Hit/miss counters of the current store generation.
    pub fn stats(&self) -> CacheStats {
        self.store().stats()
    }

    /// Returns the node for `key`, reading through the owning connector on
    /// a miss.
    ///
    /// Concurrent calls for one uncached key collapse into a single
    /// connector read: one caller leads, the rest attach to the in-flight
    /// load and receive the same node (or the same error). A leader whose
    /// deadline passes releases the load; one waiter takes over with a
    /// fresh request while the timed-out caller alone sees
    /// [`RepoError::Timeout`].
    pub fn get_node(&self, key: &NodeKey, deadline: Option<Instant>) -> Result<Arc<CachedNode>> {
        loop {
            let store = self.store();
            if let Some(node) = store.get(key) {
                return Ok(node);
            }

            let (slot, leader) = {
                let mut loads = self.loads.lock();
                match loads.get(key) {
                    Some(slot) => (Arc::clone(slot), false),
                    None => {
                        let slot = Arc::new(LoadSlot::new());
                        loads.insert(key.clone(), Arc::clone(&slot));
                        (slot, true)
                    }
                }
            };

            if leader {
                trace!(key = %key, "leading connector read-through");
                return self.lead_load(key, deadline, &store, &slot);
            }

            match self.await_load(key, deadline, &slot)? {
                Some(result) => return result,
                // Leader timed out; take a fresh run at the cache.
                None => continue,
            }
        }
    }

    fn lead_load(
        &self,
        key: &NodeKey,
        deadline: Option<Instant>,
        store: &NodeStore,
        slot: &Arc<LoadSlot>,
    ) -> Result<Arc<CachedNode>> {
        let result = self.load_from_connector(key, deadline, store);
        let timed_out = matches!(result, Err(RepoError::Timeout { .. }));
        {
            let mut state = slot.state.lock();
            *state = if timed_out {
                SlotState::Retry
            } else {
                SlotState::Done(result.clone())
            };
        }
        self.loads.lock().remove(key);
        slot.cond.notify_all();
        result
    }

    /// Waits on an in-flight load. `Ok(Some(result))` is the shared
    /// outcome; `Ok(None)` means the leader timed out and the caller should
    /// retry; `Err(Timeout)` is the caller's own deadline expiring.
    fn await_load(
        &self,
        key: &NodeKey,
        deadline: Option<Instant>,
        slot: &Arc<LoadSlot>,
    ) -> Result<Option<Result<Arc<CachedNode>>>> {
        let started = Instant::now();
        let mut state = slot.state.lock();
        loop {
            match &*state {
                SlotState::Done(result) => return Ok(Some(result.clone())),
                SlotState::Retry => return Ok(None),
                SlotState::Pending => match deadline {
                    Some(at) => {
                        if slot.cond.wait_until(&mut state, at).timed_out() {
                            // Only this caller times out; the load itself
                            // continues for everyone else.
                            return Err(RepoError::Timeout {
                                key: key.clone(),
                                waited: started.elapsed(),
                            });
                        }
                    }
                    None => slot.cond.wait(&mut state),
                },
            }
        }
    }

    fn load_from_connector(
        &self,
        key: &NodeKey,
        deadline: Option<Instant>,
        store: &NodeStore,
    ) -> Result<Arc<CachedNode>> {
        let connector = self.connectors.get(key.source())?;
        let doc = connector.read_node(key.id(), deadline)?;
        let node = Arc::new(CachedNode::from_document(doc));
        store.put(Arc::clone(&node));
        Ok(node)
    }

    /// Restartable lazy traversal of a node's children. Cached blocks are
    /// served from the store; missing blocks are fetched on demand from the
    /// pageable connector and cached as they arrive.
    pub fn children(&self, key: &NodeKey) -> ChildIter<'_> {
        ChildIter::new(self, key.clone())
    }

    /// Replaces the cached snapshot of one node. Atomic per node: readers
    /// observe either the old or the new snapshot.
    pub(crate) fn replace_node(&self, node: Arc<CachedNode>) {
        self.store().put(node);
    }

    /// Fetches one children block from the owning pageable connector.
    pub(crate) fn fetch_block(
        &self,
        block: &BlockKey,
    ) -> Result<Option<crate::document::BlockDocument>> {
        let connector = self.connectors.get(block.parent.source())?;
        let pageable = connector
            .pageable()
            .ok_or(RepoError::Invalid("connector does not page children"))?;
        if !pageable.is_pageable(block.parent.id()) {
            // Paging was withdrawn for this document; report the offset as
            // stale so the traversal reloads and completes from the
            // document's inline child list.
            return Ok(None);
        }
        pageable.children_block(block)
    }

    /// Buffers a session-scoped mutation. Nothing is visible outside the
    /// session until [`DocumentCache::commit`].
    pub fn put_transient(&self, session: SessionId, key: NodeKey, mutation: Mutation) {
        self.sessions
            .lock()
            .entry(session)
            .or_default()
            .record(key, mutation);
    }

    /// The node as seen by `session`: the shared snapshot with the
    /// session's buffered mutations applied, in program order.
    pub fn node_for_session(
        &self,
        session: SessionId,
        key: &NodeKey,
        deadline: Option<Instant>,
    ) -> Result<Arc<CachedNode>> {
        let base = self.get_node(key, deadline)?;
        let sessions = self.sessions.lock();
        match sessions.get(&session).and_then(|s| s.for_node(key)) {
            Some(set) if !set.is_empty() => Ok(Arc::new(base.with_mutations(&set.changes))),
            _ => Ok(base),
        }
    }

    /// The node's property map, or an empty map when the node is absent.
    ///
    /// Preserved quirk: absence is not an error here, unlike
    /// [`DocumentCache::get_node`].
    pub fn properties_or_empty(&self, key: &NodeKey) -> Result<BTreeMap<Name, Property>> {
        match self.get_node(key, None) {
            Ok(node) => Ok(node.properties().clone()),
            Err(RepoError::NodeNotFound(_)) | Err(RepoError::UnknownSource(_)) => {
                Ok(BTreeMap::new())
            }
            Err(other) => Err(other),
        }
    }

    /// Atomically publishes a session's buffered changes.
    ///
    /// Mutations are grouped per node in first-touch order and forwarded to
    /// each node's owning connector. Nodes whose connector accepts the
    /// mutations are merged into the shared store one node at a time; a
    /// reader never observes half of one node's update, though a multi-node
    /// commit may be partially visible across nodes. On any connector
    /// failure the already-applied portion stays applied and the caller
    /// receives [`RepoError::PartialCommit`] enumerating every outcome.
    pub fn commit(&self, session: SessionId) -> Result<CommitReceipt> {
        let changes = self
            .sessions
            .lock()
            .remove(&session)
            .unwrap_or_default();
        if changes.is_empty() {
            return Ok(CommitReceipt {
                outcomes: Vec::new(),
            });
        }

        let store = self.store();
        let mut outcomes = Vec::new();
        let mut any_failed = false;
        for (key, set) in changes.drain_in_order() {
            let applied = self
                .connectors
                .get(key.source())
                .and_then(|c| c.apply_mutation(key.id(), &set));
            match applied {
                Ok(()) => {
                    if let Some(node) = store.get(&key) {
                        store.put(Arc::new(node.with_mutations(&set.changes)));
                    }
                    outcomes.push(OpOutcome {
                        key,
                        succeeded: true,
                        detail: String::new(),
                    });
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "commit sub-operation failed");
                    any_failed = true;
                    outcomes.push(OpOutcome {
                        key,
                        succeeded: false,
                        detail: err.to_string(),
                    });
                }
            }
        }

        if any_failed {
            Err(RepoError::PartialCommit(PartialCommitError { outcomes }))
        } else {
            debug!(session = %session, applied = outcomes.len(), "commit applied");
            Ok(CommitReceipt { outcomes })
        }
    }

    /// Discards a session's buffered changes without applying them.
    pub fn discard(&self, session: SessionId) {
        self.sessions.lock().remove(&session);
    }

    /// Drops a node from the cache. [`InvalidationCause::Structural`] also
    /// drops cached descendants. Never fails; the next read reloads.
    pub fn invalidate(&self, key: &NodeKey, cause: InvalidationCause) {
        let store = self.store();
        match cause {
            InvalidationCause::Local => {
                store.remove(key);
            }
            InvalidationCause::Structural => store.remove_subtree(key),
        }
    }

    /// Replaces the active cache policy.
    ///
    /// A fresh store is constructed under the new policy and the previous
    /// generation is closed. In-flight reads complete against the snapshot
    /// they already hold; they are not aborted.
    pub fn set_cache_policy(&self, policy: Arc<dyn CachePolicy>) {
        let fresh = Arc::new(NodeStore::new(policy));
        let old = {
            let mut store = self.store.write();
            std::mem::replace(&mut *store, fresh)
        };
        old.close();
        debug!("cache policy replaced; previous store closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::MemoryConnector;
    use crate::document::PropertyValue;

    fn cache_with(conn: Arc<MemoryConnector>) -> DocumentCache {
        let registry = Arc::new(ConnectorRegistry::new());
        registry.register(conn);
        DocumentCache::new(registry)
    }

    #[test]
    fn read_through_caches_the_node() {
        let conn = Arc::new(MemoryConnector::new("mem"));
        conn.seed("a", None, &[]);
        let cache = cache_with(Arc::clone(&conn));
        let key = conn.key("a");
        cache.get_node(&key, None).unwrap();
        cache.get_node(&key, None).unwrap();
        assert_eq!(conn.reads("a"), 1);
    }

    #[test]
    fn invalidation_forces_a_reload() {
        let conn = Arc::new(MemoryConnector::new("mem"));
        conn.seed("a", None, &[]);
        let cache = cache_with(Arc::clone(&conn));
        let key = conn.key("a");
        cache.get_node(&key, None).unwrap();
        cache.invalidate(&key, InvalidationCause::Local);
        cache.get_node(&key, None).unwrap();
        assert_eq!(conn.reads("a"), 2);
    }

    #[test]
    fn structural_invalidation_drops_cached_descendants() {
        let conn = Arc::new(MemoryConnector::new("mem"));
        conn.seed("root", None, &[("a", "a")]);
        conn.seed("a", Some("root"), &[("b", "b")]);
        conn.seed("b", Some("a"), &[]);
        let cache = cache_with(Arc::clone(&conn));
        for id in ["root", "a", "b"] {
            cache.get_node(&conn.key(id), None).unwrap();
        }
        cache.invalidate(&conn.key("a"), InvalidationCause::Structural);
        cache.get_node(&conn.key("b"), None).unwrap();
        assert_eq!(conn.reads("b"), 2);
        cache.get_node(&conn.key("root"), None).unwrap();
        assert_eq!(conn.reads("root"), 1);
    }

    #[test]
    fn transient_reads_merge_overlay_without_publishing() {
        let conn = Arc::new(MemoryConnector::new("mem"));
        conn.seed("a", None, &[]);
        let cache = cache_with(Arc::clone(&conn));
        let key = conn.key("a");
        let (alice, bob) = (SessionId(1), SessionId(2));

        cache.put_transient(
            alice,
            key.clone(),
            Mutation::SetProperty {
                name: Name::local("x"),
                property: Property::single(PropertyValue::Long(7)),
            },
        );

        let mine = cache.node_for_session(alice, &key, None).unwrap();
        assert_eq!(
            mine.property(&Name::local("x")),
            Some(&Property::single(PropertyValue::Long(7)))
        );
        let theirs = cache.node_for_session(bob, &key, None).unwrap();
        assert!(theirs.property(&Name::local("x")).is_none());
    }

    #[test]
    fn policy_swap_closes_the_old_store() {
        let conn = Arc::new(MemoryConnector::new("mem"));
        conn.seed("a", None, &[]);
        let cache = cache_with(Arc::clone(&conn));
        cache.get_node(&conn.key("a"), None).unwrap();
        let old = cache.store();
        cache.set_cache_policy(Arc::new(LruTtlPolicy::with_capacity(4)));
        assert!(old.is_closed());
        // Fresh store, fresh miss.
        cache.get_node(&conn.key("a"), None).unwrap();
        assert_eq!(conn.reads("a"), 2);
    }

    #[test]
    fn properties_or_empty_swallows_absence_only() {
        let conn = Arc::new(MemoryConnector::new("mem"));
        let cache = cache_with(Arc::clone(&conn));
        let props = cache.properties_or_empty(&conn.key("ghost")).unwrap();
        assert!(props.is_empty());
    }
}
