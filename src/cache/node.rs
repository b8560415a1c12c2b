//! The cached, immutable snapshot of one node.

use std::collections::BTreeMap;

use crate::document::{ChildEntry, DocumentView, Mutation, Property};
use crate::key::{BlockKey, NodeKey};
use crate::path::{Name, Segment};

/// One entry of a node's ordered child list: the disambiguated segment plus
/// the child's stable key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildRef {
    /// Name with its resolved same-name-sibling index.
    pub segment: Segment,
    /// Stable key of the child.
    pub key: NodeKey,
}

/// Ordered child list, possibly only partially materialized when the owning
/// connector pages children.
#[derive(Clone, Debug, Default)]
pub struct ChildList {
    entries: Vec<ChildRef>,
    next_block: Option<BlockKey>,
}

impl ChildList {
    /// Builds a list from wire entries, assigning same-name-sibling indexes
    /// densely in list order.
    pub fn from_entries(entries: &[ChildEntry], next_block: Option<BlockKey>) -> Self {
        let mut list = ChildList {
            entries: Vec::with_capacity(entries.len()),
            next_block,
        };
        for entry in entries {
            list.append(entry.name.clone(), entry.key.clone());
        }
        list
    }

    /// The materialized entries, in order.
    pub fn entries(&self) -> &[ChildRef] {
        &self.entries
    }

    /// Key of the next unfetched block, when the list is incomplete.
    pub fn next_block(&self) -> Option<&BlockKey> {
        self.next_block.as_ref()
    }

    /// Whether every child is materialized.
    pub fn is_complete(&self) -> bool {
        self.next_block.is_none()
    }

    /// Appends the contents of a fetched block.
    pub fn extend_from_block(&mut self, entries: &[ChildEntry], next_block: Option<BlockKey>) {
        for entry in entries {
            self.append(entry.name.clone(), entry.key.clone());
        }
        self.next_block = next_block;
    }

    /// Appends a child, assigning the next free sibling index for its name.
    ///
    /// The index is one past the highest surviving index, not the sibling
    /// count: removal never renumbers, so a reinsert after removing a middle
    /// sibling cannot collide with a survivor.
    pub fn append(&mut self, name: Name, key: NodeKey) -> Segment {
        let max_index = self
            .entries
            .iter()
            .filter_map(|c| match &c.segment {
                Segment::Named { name: n, .. } if *n == name => Some(c.segment.sibling_index()),
                _ => None,
            })
            .max();
        let segment = match max_index {
            None => Segment::named(name),
            Some(max) => Segment::indexed(name, max + 1),
        };
        self.entries.push(ChildRef {
            segment: segment.clone(),
            key,
        });
        segment
    }

    /// Unlinks a child by key; surviving siblings keep their indexes.
    pub fn remove(&mut self, key: &NodeKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|c| &c.key != key);
        before != self.entries.len()
    }

    /// Moves `key` to just before `before`, or to the end when `before` is
    /// `None` or not present.
    pub fn reorder(&mut self, key: &NodeKey, before: Option<&NodeKey>) {
        let Some(pos) = self.entries.iter().position(|c| &c.key == key) else {
            return;
        };
        let entry = self.entries.remove(pos);
        let at = before
            .and_then(|b| self.entries.iter().position(|c| &c.key == b))
            .unwrap_or(self.entries.len());
        self.entries.insert(at, entry);
    }

    /// Finds the child matching a segment (name plus reconciled index).
    pub fn find(&self, segment: &Segment) -> Option<&ChildRef> {
        self.entries.iter().find(|c| &c.segment == segment)
    }

    /// Finds the entry for a child key.
    pub fn find_key(&self, key: &NodeKey) -> Option<&ChildRef> {
        self.entries.iter().find(|c| &c.key == key)
    }
}

/// Immutable cached snapshot of one node.
///
/// Exactly one `CachedNode` exists per key per store. The parent field is a
/// lookup key, never an owning pointer: evicting a parent and evicting a
/// child are independent operations.
#[derive(Clone, Debug)]
pub struct CachedNode {
    key: NodeKey,
    parent: Option<NodeKey>,
    primary_type: Name,
    mixins: Vec<Name>,
    properties: BTreeMap<Name, Property>,
    children: ChildList,
}

impl CachedNode {
    /// Materializes a node from a connector document.
    pub fn from_document(doc: DocumentView) -> Self {
        let next_block = doc.children_info.as_ref().and_then(|i| i.next_block.clone());
        CachedNode {
            children: ChildList::from_entries(&doc.children, next_block),
            key: doc.key,
            parent: doc.parent,
            primary_type: doc.primary_type,
            mixins: doc.mixins,
            properties: doc.properties,
        }
    }

    /// The node's stable key.
    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    /// Parent key, absent at a source root.
    pub fn parent(&self) -> Option<&NodeKey> {
        self.parent.as_ref()
    }

    /// Primary node type.
    pub fn primary_type(&self) -> &Name {
        &self.primary_type
    }

    /// Mixin node types.
    pub fn mixins(&self) -> &[Name] {
        &self.mixins
    }

    /// The property map.
    pub fn properties(&self) -> &BTreeMap<Name, Property> {
        &self.properties
    }

    /// One property by name.
    pub fn property(&self, name: &Name) -> Option<&Property> {
        self.properties.get(name)
    }

    /// The (possibly partially materialized) child list.
    pub fn children(&self) -> &ChildList {
        &self.children
    }

    /// Copy of this node with a fetched block appended to its child list.
    pub fn with_block(&self, entries: &[ChildEntry], next_block: Option<BlockKey>) -> Self {
        let mut node = self.clone();
        node.children.extend_from_block(entries, next_block);
        node
    }

    /// Copy of this node with its child list rebuilt from scratch (used when
    /// a stale block forces a paging restart).
    pub fn with_children(&self, entries: &[ChildEntry], next_block: Option<BlockKey>) -> Self {
        let mut node = self.clone();
        node.children = ChildList::from_entries(entries, next_block);
        node
    }

    /// Copy of this node with a session's buffered mutations applied.
    pub fn with_mutations<'a>(&self, changes: impl IntoIterator<Item = &'a Mutation>) -> Self {
        let mut node = self.clone();
        for change in changes {
            match change {
                Mutation::SetProperty { name, property } => {
                    node.properties.insert(name.clone(), property.clone());
                }
                Mutation::RemoveProperty { name } => {
                    node.properties.remove(name);
                }
                Mutation::AddChild { name, key } => {
                    node.children.append(name.clone(), key.clone());
                }
                Mutation::RemoveChild { key } => {
                    node.children.remove(key);
                }
                Mutation::ReorderChild { key, before } => {
                    node.children.reorder(key, before.as_ref());
                }
            }
        }
        node
    }
}
