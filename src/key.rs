//! Stable node identity and federation block keys.
//!
//! A [`NodeKey`] is the cache's primary key: opaque, unique within a
//! workspace, and immune to moves and renames. Paths are derived views over
//! keys, never the other way around.

use std::fmt;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of the connector (persistence or federation source) that owns
/// a document.
///
/// Cheap to clone; the backing string is shared.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SourceId(Arc<str>);

impl SourceId {
    /// Creates a source identifier from a name.
    pub fn new(name: impl AsRef<str>) -> Self {
        SourceId(Arc::from(name.as_ref()))
    }

    /// The source name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for SourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(SourceId::new)
    }
}

/// Stable, move-invariant identity of one node: the owning source plus the
/// source-local document id.
///
/// Serializes as the string `source:id`, the form block documents embed.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeKey {
    source: SourceId,
    id: Arc<str>,
}

impl NodeKey {
    /// Creates a key scoped to `source` with the given local document id.
    pub fn new(source: SourceId, id: impl AsRef<str>) -> Self {
        NodeKey {
            source,
            id: Arc::from(id.as_ref()),
        }
    }

    /// The connector that owns the document.
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// The source-local document id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.id)
    }
}

impl Serialize for NodeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let (source, id) = text
            .split_once(':')
            .ok_or_else(|| D::Error::custom("node key must be 'source:id'"))?;
        Ok(NodeKey::new(SourceId::new(source), id))
    }
}

/// Identifies one page of a node's children as exposed by a pageable
/// connector.
///
/// Concatenating blocks in `next` order yields the complete, order-preserving
/// child list.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BlockKey {
    /// Parent whose children the block belongs to.
    pub parent: NodeKey,
    /// Connector-defined offset token of the block's first child.
    pub offset: u64,
    /// Number of children the block is expected to carry.
    pub size: u64,
}

impl BlockKey {
    /// The first block of a parent's child list.
    pub fn first(parent: NodeKey, size: u64) -> Self {
        BlockKey {
            parent,
            offset: 0,
            size,
        }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}+{}", self.parent, self.offset, self.size)
    }
}
