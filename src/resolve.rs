//! Path ↔ identity resolution over the document cache.

use std::collections::HashSet;

use tracing::trace;

use crate::cache::DocumentCache;
use crate::error::{RepoError, Result};
use crate::key::NodeKey;
use crate::path::{Path, Segment};

/// Translates between hierarchical paths and stable node keys by walking
/// the cache one level at a time.
pub struct PathResolver<'a> {
    cache: &'a DocumentCache,
}

impl<'a> PathResolver<'a> {
    /// A resolver over the given cache.
    pub fn new(cache: &'a DocumentCache) -> Self {
        PathResolver { cache }
    }

    /// Resolves `path` starting from `root`, materializing missing levels
    /// through the cache's read-through as needed.
    ///
    /// Self segments are no-ops. Parent segments pop an explicit key stack
    /// rather than the weak parent back-reference, because several logical
    /// paths may alias one key during a single resolution; popping past
    /// `root` fails with [`RepoError::PathNotNormalizable`]. The first
    /// unmatched segment fails with [`RepoError::PathNotFound`] carrying
    /// the longest resolved prefix.
    pub fn resolve(&self, root: &NodeKey, path: &Path) -> Result<NodeKey> {
        let mut stack: Vec<NodeKey> = vec![root.clone()];
        let mut resolved: Vec<Segment> = Vec::new();

        for segment in path.segments() {
            match segment {
                Segment::Self_ => {}
                Segment::Parent => {
                    if stack.len() > 1 {
                        stack.pop();
                        resolved.pop();
                    } else {
                        return Err(RepoError::PathNotNormalizable(path.clone()));
                    }
                }
                named => {
                    let current = stack.last().expect("stack holds at least the root");
                    let mut found = None;
                    for entry in self.cache.children(current) {
                        let entry = entry?;
                        if &entry.segment == named {
                            found = Some(entry.key);
                            break;
                        }
                    }
                    match found {
                        Some(key) => {
                            trace!(segment = %named, key = %key, "resolved one level");
                            resolved.push(named.clone());
                            stack.push(key);
                        }
                        None => {
                            return Err(RepoError::PathNotFound {
                                resolved: Path::from_segments(path.is_absolute(), resolved),
                                remaining: named.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(stack.pop().expect("stack holds at least the root"))
    }

    /// Reconstructs a materialized absolute path for `key` by following
    /// parent back-references and re-deriving each segment from the
    /// parent's current child list.
    ///
    /// Point-in-time: a concurrent structural change elsewhere can make two
    /// successive calls disagree. Paths are views; keys are identities.
    pub fn locate(&self, key: &NodeKey) -> Result<Path> {
        let mut segments: Vec<Segment> = Vec::new();
        let mut seen: HashSet<NodeKey> = HashSet::new();
        let mut cursor = key.clone();

        loop {
            if !seen.insert(cursor.clone()) {
                return Err(RepoError::Connector(format!(
                    "parent chain of {key} cycles through {cursor}"
                )));
            }
            let node = self.cache.get_node(&cursor, None)?;
            let Some(parent) = node.parent().cloned() else {
                break;
            };
            let mut segment = None;
            for entry in self.cache.children(&parent) {
                let entry = entry?;
                if entry.key == cursor {
                    segment = Some(entry.segment);
                    break;
                }
            }
            let segment = segment.ok_or_else(|| RepoError::PathNotFound {
                resolved: Path::root(),
                remaining: Segment::Parent,
            })?;
            segments.push(segment);
            cursor = parent;
        }

        segments.reverse();
        Ok(Path::from_segments(true, segments))
    }
}
