//! Pluggable document sources.
//!
//! Connectors are the boundary between the cache and whatever actually
//! persists or federates documents. Dispatch is capability-based: each
//! connector registers under its [`SourceId`] in an explicit
//! [`ConnectorRegistry`] handed to the cache at construction, and optional
//! capabilities (paging) are surfaced as further traits.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::document::{BlockDocument, DocumentView, MutationSet};
use crate::error::{RepoError, Result};
use crate::key::{BlockKey, SourceId};

mod memory;

pub use memory::MemoryConnector;

/// A pluggable source of node documents.
pub trait Connector: Send + Sync {
    /// The source scope this connector owns.
    fn source_id(&self) -> &SourceId;

    /// Reads the flattened snapshot of one document.
    ///
    /// Implementations honor `deadline` on a best-effort basis and return
    /// [`RepoError::Timeout`] when it passes before the read completes.
    fn read_node(&self, id: &str, deadline: Option<Instant>) -> Result<DocumentView>;

    /// Applies a set of buffered mutations to one document. Best-effort:
    /// a failure here does not imply anything was rolled back.
    fn apply_mutation(&self, id: &str, changes: &MutationSet) -> Result<()>;

    /// The paging capability, when this connector exposes children in
    /// blocks.
    fn pageable(&self) -> Option<&dyn Pageable> {
        None
    }
}

impl std::fmt::Debug for dyn Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Connector").field(self.source_id()).finish()
    }
}

/// Capability of serving a node's children in successive blocks.
pub trait Pageable {
    /// Whether the given document's children are paged.
    fn is_pageable(&self, id: &str) -> bool;

    /// Returns the requested block, or `Ok(None)` when the offset is stale
    /// and the caller must restart paging from the beginning.
    fn children_block(&self, block: &BlockKey) -> Result<Option<BlockDocument>>;
}

/// Explicit startup-time mapping from source scope to connector.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: RwLock<FxHashMap<SourceId, Arc<dyn Connector>>>,
}

impl ConnectorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connector under its own source id, replacing any
    /// previous registration for that source.
    pub fn register(&self, connector: Arc<dyn Connector>) {
        let source = connector.source_id().clone();
        self.connectors.write().insert(source, connector);
    }

    /// Looks up the connector owning `source`.
    pub fn get(&self, source: &SourceId) -> Result<Arc<dyn Connector>> {
        self.connectors
            .read()
            .get(source)
            .cloned()
            .ok_or_else(|| RepoError::UnknownSource(source.clone()))
    }

    /// Source ids with a registered connector.
    pub fn sources(&self) -> Vec<SourceId> {
        self.connectors.read().keys().cloned().collect()
    }
}
