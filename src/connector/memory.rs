//! In-process connector used by tests and prototyping.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::document::{
    BlockDocument, ChildEntry, ChildrenInfo, DocumentView, Mutation, MutationSet, Property,
};
use crate::error::{RepoError, Result};
use crate::key::{BlockKey, NodeKey, SourceId};
use crate::path::Name;

use super::{Connector, Pageable};

struct PagedChildren {
    children: Vec<ChildEntry>,
    block_size: u64,
}

#[derive(Default)]
struct Inner {
    docs: FxHashMap<String, DocumentView>,
    paged: FxHashMap<String, PagedChildren>,
    reads: FxHashMap<String, u64>,
    block_fetches: u64,
    stale_once: HashSet<(String, u64)>,
}

/// A connector backed by process memory.
///
/// Carries the knobs the test suites need: a per-document read counter, an
/// injectable read delay, a write-failure toggle, and stale-block injection
/// for the paging restart contract.
pub struct MemoryConnector {
    source: SourceId,
    inner: Mutex<Inner>,
    read_delay: Mutex<Option<Duration>>,
    fail_writes: AtomicBool,
}

impl MemoryConnector {
    /// Creates an empty connector owning the given source scope.
    pub fn new(source: impl AsRef<str>) -> Self {
        MemoryConnector {
            source: SourceId::new(source),
            inner: Mutex::new(Inner::default()),
            read_delay: Mutex::new(None),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// The key of a document in this connector's scope.
    pub fn key(&self, id: &str) -> NodeKey {
        NodeKey::new(self.source.clone(), id)
    }

    /// Stores a fully materialized document.
    pub fn insert(&self, doc: DocumentView) {
        let id = doc.key.id().to_string();
        self.inner.lock().docs.insert(id, doc);
    }

    /// Stores a document whose children are served in blocks of
    /// `block_size`. The document's inline child list and paging info are
    /// derived per request.
    pub fn insert_paged(&self, doc: DocumentView, children: Vec<ChildEntry>, block_size: u64) {
        assert!(block_size >= 1, "block size must be at least 1");
        let id = doc.key.id().to_string();
        let mut inner = self.inner.lock();
        inner.paged.insert(
            id.clone(),
            PagedChildren {
                children,
                block_size,
            },
        );
        inner.docs.insert(id, doc);
    }

    /// Seeds a plain `nt:unstructured` document: `children` pairs each
    /// child name with its local id.
    pub fn seed(&self, id: &str, parent: Option<&str>, children: &[(&str, &str)]) {
        let doc = DocumentView {
            key: self.key(id),
            parent: parent.map(|p| self.key(p)),
            primary_type: Name::qualified("nt", "unstructured"),
            mixins: Vec::new(),
            properties: Default::default(),
            children: children
                .iter()
                .map(|(name, child_id)| ChildEntry {
                    name: Name::local(name),
                    key: self.key(child_id),
                })
                .collect(),
            children_info: None,
        };
        self.insert(doc);
    }

    /// Sets a property directly on the stored document, bypassing the
    /// mutation path.
    pub fn set_property(&self, id: &str, name: Name, property: Property) {
        if let Some(doc) = self.inner.lock().docs.get_mut(id) {
            doc.properties.insert(name, property);
        }
    }

    /// Number of `read_node` calls served for `id`.
    pub fn reads(&self, id: &str) -> u64 {
        self.inner.lock().reads.get(id).copied().unwrap_or(0)
    }

    /// Number of `children_block` calls served, across all documents.
    pub fn block_fetches(&self) -> u64 {
        self.inner.lock().block_fetches
    }

    /// Delays every subsequent read by `delay`.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.lock() = delay;
    }

    /// Makes subsequent `apply_mutation` calls fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Withdraws paging for `id`, folding every child into the stored
    /// document's inline list.
    pub fn unpage(&self, id: &str) {
        let mut inner = self.inner.lock();
        if let Some(paged) = inner.paged.remove(id) {
            if let Some(doc) = inner.docs.get_mut(id) {
                doc.children = paged.children;
                doc.children_info = None;
            }
        }
    }

    /// Arranges for the next block request at `offset` under `id` to report
    /// a stale offset (a `None` block).
    pub fn mark_stale(&self, id: &str, offset: u64) {
        self.inner.lock().stale_once.insert((id.to_string(), offset));
    }

    /// A copy of the stored document, for assertions.
    pub fn document(&self, id: &str) -> Option<DocumentView> {
        self.inner.lock().docs.get(id).cloned()
    }

    fn paged_view(&self, inner: &Inner, doc: &DocumentView) -> DocumentView {
        let Some(paged) = inner.paged.get(doc.key.id()) else {
            return doc.clone();
        };
        let block = paged.block_size as usize;
        let mut view = doc.clone();
        view.children = paged.children.iter().take(block).cloned().collect();
        view.children_info = Some(ChildrenInfo {
            count: paged.children.len() as u64,
            block_size: paged.block_size,
            next_block: (paged.children.len() > block).then(|| BlockKey {
                parent: doc.key.clone(),
                offset: paged.block_size,
                size: paged.block_size,
            }),
        });
        view
    }
}

impl Connector for MemoryConnector {
    fn source_id(&self) -> &SourceId {
        &self.source
    }

    fn read_node(&self, id: &str, deadline: Option<Instant>) -> Result<DocumentView> {
        let delay = *self.read_delay.lock();
        if let Some(delay) = delay {
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now + delay > deadline {
                    thread::sleep(deadline.saturating_duration_since(now));
                    return Err(RepoError::Timeout {
                        key: self.key(id),
                        waited: delay,
                    });
                }
            }
            thread::sleep(delay);
        }
        let mut inner = self.inner.lock();
        *inner.reads.entry(id.to_string()).or_insert(0) += 1;
        match inner.docs.get(id) {
            Some(doc) => Ok(self.paged_view(&inner, doc)),
            None => Err(RepoError::NodeNotFound(self.key(id))),
        }
    }

    fn apply_mutation(&self, id: &str, changes: &MutationSet) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Connector(format!(
                "source '{}' rejected write to '{id}'",
                self.source
            )));
        }
        let mut inner = self.inner.lock();
        let doc = inner
            .docs
            .get_mut(id)
            .ok_or_else(|| RepoError::NodeNotFound(self.key(id)))?;
        for change in &changes.changes {
            match change {
                Mutation::SetProperty { name, property } => {
                    doc.properties.insert(name.clone(), property.clone());
                }
                Mutation::RemoveProperty { name } => {
                    doc.properties.remove(name);
                }
                Mutation::AddChild { name, key } => {
                    doc.children.push(ChildEntry {
                        name: name.clone(),
                        key: key.clone(),
                    });
                }
                Mutation::RemoveChild { key } => {
                    doc.children.retain(|c| &c.key != key);
                }
                Mutation::ReorderChild { key, before } => {
                    if let Some(pos) = doc.children.iter().position(|c| &c.key == key) {
                        let entry = doc.children.remove(pos);
                        let at = before
                            .as_ref()
                            .and_then(|b| doc.children.iter().position(|c| &c.key == b))
                            .unwrap_or(doc.children.len());
                        doc.children.insert(at, entry);
                    }
                }
            }
        }
        Ok(())
    }

    fn pageable(&self) -> Option<&dyn Pageable> {
        Some(self)
    }
}

impl Pageable for MemoryConnector {
    fn is_pageable(&self, id: &str) -> bool {
        self.inner.lock().paged.contains_key(id)
    }

    fn children_block(&self, block: &BlockKey) -> Result<Option<BlockDocument>> {
        let mut inner = self.inner.lock();
        inner.block_fetches += 1;
        let id = block.parent.id().to_string();
        if inner.stale_once.remove(&(id.clone(), block.offset)) {
            return Ok(None);
        }
        let Some(paged) = inner.paged.get(&id) else {
            return Ok(None);
        };
        let start = block.offset as usize;
        if start >= paged.children.len() {
            return Ok(None);
        }
        let end = (start + block.size as usize).min(paged.children.len());
        Ok(Some(BlockDocument {
            children: paged.children[start..end].to_vec(),
            children_info: ChildrenInfo {
                count: paged.children.len() as u64,
                block_size: paged.block_size,
                next_block: (end < paged.children.len()).then(|| BlockKey {
                    parent: block.parent.clone(),
                    offset: end as u64,
                    size: paged.block_size,
                }),
            },
        }))
    }
}
