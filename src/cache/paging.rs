//! Lazy, restartable traversal of paged child lists.

use std::sync::Arc;

use tracing::debug;

use crate::error::{RepoError, Result};

use super::node::ChildRef;
use super::{DocumentCache, InvalidationCause};
use crate::key::NodeKey;

/// Paging restarts tolerated before the traversal gives up; a connector
/// that invalidates its offsets faster than one block per restart is
/// effectively unreadable.
const MAX_RESTARTS: u32 = 8;

/// Iterator over a node's children.
///
/// Materialized entries come straight from the cache; when the list is
/// incomplete the next block is fetched from the pageable connector and
/// cached on the node, so a second traversal never re-fetches a block the
/// first one saw. A stale block (the connector no longer recognizes the
/// offset) restarts the traversal from the beginning against a freshly
/// loaded document.
pub struct ChildIter<'a> {
    cache: &'a DocumentCache,
    key: NodeKey,
    pos: usize,
    restarts: u32,
    fused: bool,
}

impl<'a> ChildIter<'a> {
    pub(crate) fn new(cache: &'a DocumentCache, key: NodeKey) -> Self {
        ChildIter {
            cache,
            key,
            pos: 0,
            restarts: 0,
            fused: false,
        }
    }

    fn fail(&mut self, err: RepoError) -> Option<Result<ChildRef>> {
        self.fused = true;
        Some(Err(err))
    }
}

impl Iterator for ChildIter<'_> {
    type Item = Result<ChildRef>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        loop {
            let node = match self.cache.get_node(&self.key, None) {
                Ok(node) => node,
                Err(err) => return self.fail(err),
            };
            let children = node.children();
            if self.pos < children.entries().len() {
                let entry = children.entries()[self.pos].clone();
                self.pos += 1;
                return Some(Ok(entry));
            }
            if children.is_complete() {
                return None;
            }

            let block_key = children
                .next_block()
                .expect("incomplete list carries a next block")
                .clone();
            match self.cache.fetch_block(&block_key) {
                Ok(Some(block)) => {
                    let updated =
                        node.with_block(&block.children, block.children_info.next_block);
                    self.cache.replace_node(Arc::new(updated));
                }
                Ok(None) => {
                    // Stale offset: the block chain moved underneath us.
                    // Reload the document and walk its fresh chain from the
                    // first block; entries already yielded stand as a
                    // point-in-time prefix and are not repeated.
                    if self.restarts >= MAX_RESTARTS {
                        return self.fail(RepoError::Connector(format!(
                            "paging of {} restarted {MAX_RESTARTS} times without completing",
                            self.key
                        )));
                    }
                    self.restarts += 1;
                    debug!(key = %self.key, restart = self.restarts, "stale block, restarting paging");
                    self.cache.invalidate(&self.key, InvalidationCause::Local);
                }
                Err(err) => return self.fail(err),
            }
        }
    }
}
