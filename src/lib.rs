//! Hierarchical content repository core.
//!
//! A tree-structured, queryable data store exposing a JCR-like
//! node/property model over pluggable connectors. This crate carries the
//! three load-bearing layers: the per-workspace document cache (persisted
//! view plus session-transient overlays), path/identity resolution between
//! hierarchical paths and stable node keys, and the query planner that
//! turns declarative commands into canonical logical plans.

#![warn(missing_docs)]

pub mod cache;
pub mod connector;
pub mod document;
pub mod error;
pub mod key;
pub mod path;
pub mod query;
pub mod resolve;

pub use cache::{DocumentCache, InvalidationCause, SessionId};
pub use error::{RepoError, Result};
pub use key::{BlockKey, NodeKey, SourceId};
pub use path::{Name, Path, Segment};
pub use resolve::PathResolver;
