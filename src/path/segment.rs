//! Path segments with same-name-sibling indexes.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::name::Name;

/// One step of a path.
///
/// The self (`.`) and parent (`..`) tokens carry no index and are never
/// disambiguated. A named segment may carry a 1-based same-name-sibling
/// index; a missing index and an explicit `[1]` refer to the same node, so
/// equality, ordering, and hashing all reconcile the two forms.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Segment {
    /// The `.` token.
    Self_,
    /// The `..` token.
    Parent,
    /// A named child step, optionally disambiguated by a sibling index.
    Named {
        /// The child name.
        name: Name,
        /// 1-based same-name-sibling index; `None` is equivalent to `Some(1)`.
        index: Option<u32>,
    },
}

impl Segment {
    /// A named segment without an explicit index.
    pub fn named(name: Name) -> Self {
        Segment::Named { name, index: None }
    }

    /// A named segment with an explicit same-name-sibling index.
    pub fn indexed(name: Name, index: u32) -> Self {
        debug_assert!(index >= 1, "sibling indexes are 1-based");
        Segment::Named {
            name,
            index: Some(index),
        }
    }

    /// The segment's name, when it is a named step.
    pub fn name(&self) -> Option<&Name> {
        match self {
            Segment::Named { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The normalized sibling index: the explicit index, or 1 when absent.
    /// Self and parent tokens report 1.
    pub fn sibling_index(&self) -> u32 {
        match self {
            Segment::Named { index, .. } => index.unwrap_or(1),
            _ => 1,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Segment::Self_ => 0,
            Segment::Parent => 1,
            Segment::Named { .. } => 2,
        }
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Segment::Self_, Segment::Self_) => true,
            (Segment::Parent, Segment::Parent) => true,
            (
                Segment::Named { name: a, index: ai },
                Segment::Named { name: b, index: bi },
            ) => a == b && ai.unwrap_or(1) == bi.unwrap_or(1),
            _ => false,
        }
    }
}

impl Eq for Segment {}

impl Hash for Segment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        if let Segment::Named { name, index } = self {
            name.hash(state);
            index.unwrap_or(1).hash(state);
        }
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (
                Segment::Named { name: a, index: ai },
                Segment::Named { name: b, index: bi },
            ) => a
                .cmp(b)
                .then_with(|| ai.unwrap_or(1).cmp(&bi.unwrap_or(1))),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Self_ => f.write_str("."),
            Segment::Parent => f.write_str(".."),
            Segment::Named { name, index } => match index {
                Some(i) => write!(f, "{name}[{i}]"),
                None => write!(f, "{name}"),
            },
        }
    }
}
