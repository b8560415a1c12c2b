//! Immutable hierarchical paths.
//!
//! A [`Path`] is an ordered sequence of [`Segment`]s, either absolute
//! (rooted) or relative. Paths are derived, possibly-stale views over the
//! tree; stable identity lives in [`crate::key::NodeKey`].

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RepoError, Result};

mod name;
mod segment;

pub use name::Name;
pub use segment::Segment;

/// An immutable hierarchical path.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Path {
    absolute: bool,
    segments: Vec<Segment>,
}

impl Path {
    /// The absolute root path `/`.
    pub fn root() -> Self {
        Path {
            absolute: true,
            segments: Vec::new(),
        }
    }

    /// Builds a path from parts without parsing.
    pub fn from_segments(absolute: bool, segments: Vec<Segment>) -> Self {
        Path { absolute, segments }
    }

    /// Parses a path string.
    ///
    /// Segments are `/`-separated; each named segment is an optional
    /// `{uri}` or `prefix:` qualifier, a local name, and an optional
    /// 1-based `[n]` sibling index. `.` and `..` are the self and parent
    /// tokens and accept no index.
    pub fn parse(text: &str) -> Result<Path> {
        if text.is_empty() {
            return Err(parse_err(0, "empty path"));
        }
        let absolute = text.starts_with('/');
        let body = if absolute { &text[1..] } else { text };
        if body.is_empty() {
            if absolute {
                return Ok(Path::root());
            }
            return Err(parse_err(0, "empty path"));
        }

        let mut segments = Vec::new();
        let mut offset = if absolute { 1 } else { 0 };
        for raw in body.split('/') {
            segments.push(parse_segment(raw, offset)?);
            offset += raw.len() + 1;
        }
        Ok(Path { absolute, segments })
    }

    /// Whether the path is rooted.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Whether the path is the absolute root.
    pub fn is_root(&self) -> bool {
        self.absolute && self.segments.is_empty()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the path carries no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The segments in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The final segment, if any.
    pub fn last_segment(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// The path with the final segment removed; `None` for the root and for
    /// an empty relative path.
    pub fn parent(&self) -> Option<Path> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Path {
            absolute: self.absolute,
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The ancestor `degree` levels up; `ancestor(0)` is the path itself.
    pub fn ancestor(&self, degree: usize) -> Option<Path> {
        if degree > self.segments.len() {
            return None;
        }
        Some(Path {
            absolute: self.absolute,
            segments: self.segments[..self.segments.len() - degree].to_vec(),
        })
    }

    /// The subpath covering `start..end` of this path's segments, keeping
    /// the absolute flag only when the range starts at the first segment.
    /// `None` for an inverted or out-of-range bound.
    pub fn subpath(&self, start: usize, end: usize) -> Option<Path> {
        let segments = self.segments.get(start..end)?.to_vec();
        Some(Path {
            absolute: self.absolute && start == 0,
            segments,
        })
    }

    /// Appends a single segment.
    pub fn child(&self, segment: Segment) -> Path {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Path {
            absolute: self.absolute,
            segments,
        }
    }

    /// Whether `self` is a proper ancestor of `other`. Both paths must be
    /// in resolved form for the answer to be meaningful.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        self.absolute == other.absolute
            && self.segments.len() < other.segments.len()
            && self.segments == other.segments[..self.segments.len()]
    }

    /// The longest shared prefix of two paths with the same rooting.
    pub fn common_ancestor(&self, other: &Path) -> Option<Path> {
        if self.absolute != other.absolute {
            return None;
        }
        let shared = self
            .segments
            .iter()
            .zip(&other.segments)
            .take_while(|(a, b)| a == b)
            .count();
        Some(Path {
            absolute: self.absolute,
            segments: self.segments[..shared].to_vec(),
        })
    }

    /// Expresses `self` relative to `base`, inserting parent segments for
    /// the part of `base` not shared with `self`. Both paths must be
    /// absolute.
    pub fn relative_to(&self, base: &Path) -> Result<Path> {
        if !self.absolute || !base.absolute {
            return Err(RepoError::Invalid(
                "relative_to requires two absolute paths",
            ));
        }
        let shared = self
            .segments
            .iter()
            .zip(&base.segments)
            .take_while(|(a, b)| a == b)
            .count();
        let mut segments: Vec<Segment> = Vec::new();
        segments.resize(base.segments.len() - shared, Segment::Parent);
        segments.extend_from_slice(&self.segments[shared..]);
        Ok(Path {
            absolute: false,
            segments,
        })
    }

    /// Removes self tokens and resolvable `name/..` pairs.
    ///
    /// Fails with [`RepoError::NotNormalizable`] when a parent token would
    /// ascend above the path's own root, which is unanswerable for a
    /// relative path with unknown ancestry and illegal for an absolute one.
    pub fn normalize(&self) -> Result<Path> {
        let mut out: Vec<Segment> = Vec::with_capacity(self.segments.len());
        for seg in &self.segments {
            match seg {
                Segment::Self_ => {}
                Segment::Parent => {
                    if matches!(out.last(), Some(Segment::Named { .. })) {
                        out.pop();
                    } else {
                        return Err(RepoError::NotNormalizable(self.to_string()));
                    }
                }
                named => out.push(named.clone()),
            }
        }
        Ok(Path {
            absolute: self.absolute,
            segments: out,
        })
    }

    /// Resolves `relative` against `base`: concatenation followed by
    /// normalization. An absolute path may not be appended to another path.
    pub fn resolve(base: &Path, relative: &Path) -> Result<Path> {
        if relative.absolute {
            return Err(RepoError::Invalid(
                "cannot append an absolute path to a base path",
            ));
        }
        let mut segments = base.segments.clone();
        segments.extend_from_slice(&relative.segments);
        Path {
            absolute: base.absolute,
            segments,
        }
        .normalize()
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        // Absolute paths order before relative ones; then segment-wise.
        other
            .absolute
            .cmp(&self.absolute)
            .then_with(|| self.segments.cmp(&other.segments))
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        if !self.absolute && self.segments.is_empty() {
            return f.write_str(".");
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 || self.absolute {
                f.write_str("/")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

fn parse_err(offset: usize, reason: impl Into<String>) -> RepoError {
    RepoError::PathParse {
        offset,
        reason: reason.into(),
    }
}

fn parse_segment(raw: &str, offset: usize) -> Result<Segment> {
    if raw.is_empty() {
        return Err(parse_err(offset, "empty segment"));
    }
    match raw {
        "." => return Ok(Segment::Self_),
        ".." => return Ok(Segment::Parent),
        _ => {}
    }

    let (namespace, rest) = if let Some(stripped) = raw.strip_prefix('{') {
        match stripped.find('}') {
            Some(end) => (Some(&stripped[..end]), &stripped[end + 1..]),
            None => return Err(parse_err(offset, "unbalanced '{' in segment")),
        }
    } else {
        (None, raw)
    };

    let (body, index) = match rest.find('[') {
        Some(open) => {
            let tail = &rest[open + 1..];
            let close = tail
                .find(']')
                .ok_or_else(|| parse_err(offset + open, "unbalanced '[' in segment"))?;
            if close + 1 != tail.len() {
                return Err(parse_err(
                    offset + open,
                    "characters after sibling index bracket",
                ));
            }
            let digits = &tail[..close];
            let index: u32 = digits
                .parse()
                .map_err(|_| parse_err(offset + open, "sibling index is not a number"))?;
            if index == 0 {
                return Err(parse_err(offset + open, "sibling index is 1-based"));
            }
            (&rest[..open], Some(index))
        }
        None => {
            if rest.contains(']') {
                return Err(parse_err(offset, "unbalanced ']' in segment"));
            }
            (rest, None)
        }
    };

    if body.is_empty() {
        return Err(parse_err(offset, "empty segment name"));
    }
    if body.contains(['|', '*']) {
        return Err(parse_err(offset, "illegal character in segment name"));
    }

    let name = match namespace {
        Some(ns) => Name::qualified(ns, body),
        None => match body.split_once(':') {
            Some((prefix, local)) => {
                if prefix.is_empty() || local.is_empty() {
                    return Err(parse_err(offset, "malformed prefixed name"));
                }
                Name::qualified(prefix, local)
            }
            None => Name::local(body),
        },
    };
    Ok(Segment::Named { name, index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn p(text: &str) -> Path {
        Path::parse(text).expect("path parses")
    }

    #[test]
    fn parses_root_and_plain_paths() {
        assert!(p("/").is_root());
        let path = p("/a/b[2]/jcr:content");
        assert!(path.is_absolute());
        assert_eq!(path.len(), 3);
        assert_eq!(path.to_string(), "/a/b[2]/jcr:content");
    }

    #[test]
    fn parses_expanded_namespace_form() {
        let path = p("/{http://ns/1.0}a/b");
        let name = path.segments()[0].name().expect("named");
        assert_eq!(name.namespace(), "http://ns/1.0");
        assert_eq!(name.local_name(), "a");
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in [
            "", "//a", "/a//b", "/a[", "/a[]", "/a[0]", "/a[1]x", "/a]", "/{nsa",
            "/a|b", "/:x", "/a/", "/a[x]",
        ] {
            let err = Path::parse(bad).expect_err(bad);
            assert_eq!(err.code(), "PathParse", "input {bad:?} gave {err:?}");
        }
    }

    #[test]
    fn last_segment_reconciles_missing_and_explicit_first_index() {
        // A first sibling may be referenced with or without `[1]`.
        assert_eq!(p("/a/b").last_segment(), p("/a/b[1]").last_segment());
        assert_ne!(p("/a/b").last_segment(), p("/a/b[2]").last_segment());
    }

    #[test]
    fn normalization_resolves_self_and_parent_pairs() {
        assert_eq!(p("/a/./b/../c").normalize().unwrap(), p("/a/c"));
        assert_eq!(p("a/b/..").normalize().unwrap().to_string(), "a");
    }

    #[test]
    fn normalization_fails_above_the_root() {
        assert_eq!(p("/..").normalize().unwrap_err().code(), "NotNormalizable");
        assert_eq!(
            p("a/../..").normalize().unwrap_err().code(),
            "NotNormalizable"
        );
    }

    #[test]
    fn resolve_appends_and_normalizes() {
        let base = p("/a/b");
        assert_eq!(Path::resolve(&base, &p("../c")).unwrap(), p("/a/c"));
        assert_eq!(
            Path::resolve(&base, &p("/c")).unwrap_err().code(),
            "Invalid"
        );
    }

    #[test]
    fn relative_to_inserts_parent_segments() {
        let rel = p("/a/b/c").relative_to(&p("/a/x")).unwrap();
        assert_eq!(rel.to_string(), "../b/c");
        assert_eq!(
            Path::resolve(&p("/a/x"), &rel).unwrap(),
            p("/a/b/c")
        );
    }

    #[test]
    fn ancestry_helpers() {
        let path = p("/a/b/c");
        assert!(p("/a").is_ancestor_of(&path));
        assert!(!path.is_ancestor_of(&path));
        assert_eq!(path.ancestor(2).unwrap(), p("/a"));
        assert_eq!(
            p("/a/b/c").common_ancestor(&p("/a/b/d")).unwrap(),
            p("/a/b")
        );
    }

    #[test]
    fn subpath_bounds_mirror_ancestor() {
        let path = p("/a/b/c");
        assert_eq!(path.subpath(0, 2).unwrap(), p("/a/b"));
        assert_eq!(path.subpath(1, 3).unwrap(), p("b/c"));
        assert!(path.subpath(1, 4).is_none());
        assert!(path.subpath(2, 1).is_none());
        assert!(path.ancestor(4).is_none());
    }

    proptest! {
        #[test]
        fn display_parse_round_trip(
            absolute in any::<bool>(),
            names in prop::collection::vec("[a-z]{1,8}", 1..6),
            indexes in prop::collection::vec(prop::option::of(1u32..5), 1..6),
        ) {
            let segments: Vec<Segment> = names
                .iter()
                .zip(&indexes)
                .map(|(n, i)| Segment::Named { name: Name::local(n), index: *i })
                .collect();
            let path = Path::from_segments(absolute, segments);
            let reparsed = Path::parse(&path.to_string()).unwrap();
            prop_assert_eq!(path, reparsed);
        }
    }
}
