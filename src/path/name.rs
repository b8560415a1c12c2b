//! Namespace-qualified names.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A namespace-qualified local name.
///
/// The namespace is a URI (or registered prefix token) and may be empty for
/// unqualified names. Ordering is namespace-first, then local name, which
/// gives paths a stable total order independent of prefix registration
/// order.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Name {
    namespace: Arc<str>,
    local: Arc<str>,
}

impl Name {
    /// Creates a name in the empty namespace.
    pub fn local(local: impl AsRef<str>) -> Self {
        Name {
            namespace: Arc::from(""),
            local: Arc::from(local.as_ref()),
        }
    }

    /// Creates a fully qualified name.
    pub fn qualified(namespace: impl AsRef<str>, local: impl AsRef<str>) -> Self {
        Name {
            namespace: Arc::from(namespace.as_ref()),
            local: Arc::from(local.as_ref()),
        }
    }

    /// The namespace URI or prefix token, empty when unqualified.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The local part of the name.
    pub fn local_name(&self) -> &str {
        &self.local
    }

    /// Parses a name from its display form: `{uri}local`, `prefix:local`,
    /// or a bare local name. Returns `None` on an unbalanced `{`.
    pub fn parse(text: &str) -> Option<Name> {
        if let Some(stripped) = text.strip_prefix('{') {
            let end = stripped.find('}')?;
            return Some(Name::qualified(&stripped[..end], &stripped[end + 1..]));
        }
        match text.split_once(':') {
            Some((prefix, local)) => Some(Name::qualified(prefix, local)),
            None => Some(Name::local(text)),
        }
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Name::parse(&text).ok_or_else(|| D::Error::custom("malformed qualified name"))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.namespace
            .cmp(&other.namespace)
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local)
        } else if self.namespace.contains([':', '/']) {
            // Expanded form for URI namespaces.
            write!(f, "{{{}}}{}", self.namespace, self.local)
        } else {
            write!(f, "{}:{}", self.namespace, self.local)
        }
    }
}
