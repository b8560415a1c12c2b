//! Wire-facing document shapes exchanged with connectors.
//!
//! A connector surfaces each node as a flattened [`DocumentView`]; pageable
//! connectors additionally serve [`BlockDocument`]s whose reserved
//! `childrenInfo` sub-document carries the paging bookkeeping (`count`,
//! `blockSize`, `nextBlock`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::key::{BlockKey, NodeKey};
use crate::path::Name;

/// Type tag of a property's values.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    /// Boolean values.
    Bool,
    /// 64-bit signed integers.
    Long,
    /// 64-bit floats.
    Double,
    /// Unicode strings.
    String,
    /// Qualified names.
    Name,
    /// Hierarchical paths.
    Path,
    /// References to other nodes by stable key.
    Reference,
    /// Opaque byte payloads.
    Binary,
    /// Milliseconds since the Unix epoch.
    Date,
}

/// One property value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// A boolean.
    Bool(bool),
    /// A 64-bit integer.
    Long(i64),
    /// A 64-bit float.
    Double(f64),
    /// A string.
    String(String),
    /// A qualified name.
    Name(Name),
    /// A path literal.
    Path(crate::path::Path),
    /// A reference to another node.
    Reference(NodeKey),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Milliseconds since the Unix epoch.
    Date(i64),
}

impl PropertyValue {
    /// The type tag matching this value.
    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyValue::Bool(_) => PropertyType::Bool,
            PropertyValue::Long(_) => PropertyType::Long,
            PropertyValue::Double(_) => PropertyType::Double,
            PropertyValue::String(_) => PropertyType::String,
            PropertyValue::Name(_) => PropertyType::Name,
            PropertyValue::Path(_) => PropertyType::Path,
            PropertyValue::Reference(_) => PropertyType::Reference,
            PropertyValue::Binary(_) => PropertyType::Binary,
            PropertyValue::Date(_) => PropertyType::Date,
        }
    }
}

/// A typed property holding one or many values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// The declared type of the values.
    pub ptype: PropertyType,
    /// The values; single-valued properties carry exactly one entry.
    pub values: SmallVec<[PropertyValue; 1]>,
}

impl Property {
    /// A single-valued property typed after its value.
    pub fn single(value: PropertyValue) -> Self {
        Property {
            ptype: value.property_type(),
            values: SmallVec::from_buf([value]),
        }
    }

    /// A multi-valued property with an explicit type tag.
    pub fn multi(ptype: PropertyType, values: impl IntoIterator<Item = PropertyValue>) -> Self {
        Property {
            ptype,
            values: values.into_iter().collect(),
        }
    }

    /// The first value, if any.
    pub fn first(&self) -> Option<&PropertyValue> {
        self.values.first()
    }

    /// Whether the property holds more than one value.
    pub fn is_multiple(&self) -> bool {
        self.values.len() > 1
    }
}

/// One child reference inside a document or block: a name plus the child's
/// stable key. Sibling indexes are assigned by the cache on insertion, in
/// list order, so the wire form carries only the name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChildEntry {
    /// Child name as stored by the connector.
    pub name: Name,
    /// Stable key of the child document.
    pub key: NodeKey,
}

/// Paging bookkeeping in a document's reserved `childrenInfo` sub-document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildrenInfo {
    /// Total child count across all blocks.
    pub count: u64,
    /// Children per block.
    pub block_size: u64,
    /// Key of the next block; `None` marks the terminal block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_block: Option<BlockKey>,
}

/// Flattened snapshot of one node as read from a connector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    /// Stable key of the document.
    pub key: NodeKey,
    /// Parent key, absent for a source's root document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeKey>,
    /// Primary node type.
    pub primary_type: Name,
    /// Mixin node types.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mixins: Vec<Name>,
    /// Properties keyed by qualified name.
    #[serde(default)]
    pub properties: BTreeMap<Name, Property>,
    /// Directly embedded children, in order. For pageable documents this is
    /// the first block's worth and `children_info` points at the rest.
    #[serde(default)]
    pub children: Vec<ChildEntry>,
    /// Present when the child list continues in further blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children_info: Option<ChildrenInfo>,
}

/// One page of a node's children as served by a pageable connector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDocument {
    /// The children in this block, in list order.
    pub children: Vec<ChildEntry>,
    /// Paging bookkeeping; `next_block == None` terminates the list.
    pub children_info: ChildrenInfo,
}

/// One buffered change to a node, in session program order.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    /// Set (or replace) a property.
    SetProperty {
        /// Property name.
        name: Name,
        /// New property payload.
        property: Property,
    },
    /// Remove a property if present.
    RemoveProperty {
        /// Property name.
        name: Name,
    },
    /// Append a child; the cache assigns the sibling index.
    AddChild {
        /// Child name.
        name: Name,
        /// Key of the child being linked.
        key: NodeKey,
    },
    /// Unlink a child by key. Surviving siblings keep their indexes.
    RemoveChild {
        /// Key of the child being unlinked.
        key: NodeKey,
    },
    /// Move a child to just before another child (or to the end).
    ReorderChild {
        /// Key of the child being moved.
        key: NodeKey,
        /// Key to insert before; `None` moves to the end.
        before: Option<NodeKey>,
    },
}

/// The ordered set of buffered mutations for one node, as handed to its
/// owning connector at commit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MutationSet {
    /// Changes in the order the session issued them.
    pub changes: Vec<Mutation>,
}

impl MutationSet {
    /// Whether the set carries no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
