//! Prefix tree node.
//!
//! Each node stands for one path segment. Static children are kept sorted
//! for binary search; all parameter segments at a given depth share a
//! single parameter child regardless of the name they were declared with,
//! and a wildcard child is always terminal.

use std::borrow::Cow;

use smallvec::SmallVec;

use crate::error::RouteError;
use crate::params::Params;
use crate::path::{segments, PARAM_MARKER, WILDCARD};

/// Type of path segment a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Literal segment (e.g. `users`).
    Static,
    /// Parameter segment (e.g. `:id`).
    Param,
    /// Terminal wildcard (`*`).
    Wildcard,
}

/// A handler registered at a node, with the pattern it came from.
#[derive(Debug, Clone)]
pub struct Route<H> {
    /// The registered handler.
    pub handler: H,
    /// The normalized pattern, e.g. `/users/:id`.
    pub pattern: String,
    /// Capture names in segment order; a wildcard capture is named `*`.
    pub param_names: Vec<String>,
}

/// A parsed pattern segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
    Wildcard,
}

/// A node in the prefix tree.
#[derive(Debug, Clone)]
pub struct Node<H> {
    segment: String,
    kind: SegmentKind,
    route: Option<Route<H>>,
    static_children: Vec<Node<H>>,
    param_child: Option<Box<Node<H>>>,
    wildcard_child: Option<Box<Node<H>>>,
}

impl<H> Node<H> {
    fn new(segment: impl Into<String>, kind: SegmentKind) -> Self {
        Self {
            segment: segment.into(),
            kind,
            route: None,
            static_children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    /// Creates the root node of a tree.
    #[must_use]
    pub fn root() -> Self {
        Self::new("", SegmentKind::Static)
    }

    /// Returns the segment text of this node (`:` for parameters).
    #[must_use]
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Returns the kind of this node.
    #[must_use]
    pub const fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Returns the route registered at this node, if any.
    #[must_use]
    pub const fn route(&self) -> Option<&Route<H>> {
        self.route.as_ref()
    }

    /// Inserts a route for a normalized pattern.
    ///
    /// Returns the handler previously registered for the same pattern.
    pub(crate) fn insert(&mut self, pattern: &str, handler: H) -> Result<Option<H>, RouteError> {
        let parsed = parse_pattern(pattern)?;
        let param_names = parsed
            .iter()
            .filter_map(|segment| match segment {
                Segment::Static(_) => None,
                Segment::Param(name) => Some((*name).to_string()),
                Segment::Wildcard => Some(WILDCARD.to_string()),
            })
            .collect();

        let target = self.descend(&parsed);
        let previous = target.route.replace(Route {
            handler,
            pattern: pattern.to_string(),
            param_names,
        });
        Ok(previous.map(|route| route.handler))
    }

    /// Walks to (creating as needed) the node addressed by `parsed`.
    fn descend(&mut self, parsed: &[Segment<'_>]) -> &mut Self {
        let Some((first, rest)) = parsed.split_first() else {
            return self;
        };

        let child = match *first {
            Segment::Static(literal) => {
                let index = match self
                    .static_children
                    .binary_search_by(|c| c.segment.as_str().cmp(literal))
                {
                    Ok(index) => index,
                    Err(index) => {
                        self.static_children
                            .insert(index, Self::new(literal, SegmentKind::Static));
                        index
                    }
                };
                &mut self.static_children[index]
            }
            Segment::Param(_) => self
                .param_child
                .get_or_insert_with(|| Box::new(Self::new(PARAM_MARKER, SegmentKind::Param)))
                .as_mut(),
            Segment::Wildcard => self
                .wildcard_child
                .get_or_insert_with(|| Box::new(Self::new(WILDCARD, SegmentKind::Wildcard)))
                .as_mut(),
        };

        child.descend(rest)
    }

    /// Matches a path against this subtree.
    pub(crate) fn match_path<'n>(&'n self, path: &str) -> Option<(&'n Route<H>, Params)> {
        let parts: SmallVec<[&str; 8]> = segments(path).collect();
        let mut captured: SmallVec<[Cow<'_, str>; 4]> = SmallVec::new();

        let route = self.match_segments(&parts, &mut captured)?;
        let params = route
            .param_names
            .iter()
            .cloned()
            .zip(captured.into_iter().map(Cow::into_owned))
            .collect();
        Some((route, params))
    }

    /// Depth-first match with backtracking: static, then parameter, then
    /// wildcard. Captured values are pushed in segment order and popped
    /// again when a branch dead-ends.
    fn match_segments<'n, 'p>(
        &'n self,
        parts: &[&'p str],
        captured: &mut SmallVec<[Cow<'p, str>; 4]>,
    ) -> Option<&'n Route<H>> {
        let Some((&part, rest)) = parts.split_first() else {
            return self.route.as_ref();
        };

        if let Some(child) = self.find_static_child(part) {
            if let Some(route) = child.match_segments(rest, captured) {
                return Some(route);
            }
        }

        if let Some(child) = &self.param_child {
            let mark = captured.len();
            captured.push(Cow::Borrowed(part));
            if let Some(route) = child.match_segments(rest, captured) {
                return Some(route);
            }
            captured.truncate(mark);
        }

        if let Some(route) = self.wildcard_child.as_ref().and_then(|c| c.route.as_ref()) {
            captured.push(Cow::Owned(parts.join("/")));
            return Some(route);
        }

        None
    }

    fn find_static_child(&self, segment: &str) -> Option<&Self> {
        self.static_children
            .binary_search_by(|c| c.segment.as_str().cmp(segment))
            .ok()
            .map(|i| &self.static_children[i])
    }

    /// Visits every route in this subtree.
    pub(crate) fn for_each_route<'n>(&'n self, f: &mut impl FnMut(&'n Route<H>)) {
        if let Some(route) = &self.route {
            f(route);
        }
        for child in &self.static_children {
            child.for_each_route(f);
        }
        if let Some(child) = &self.param_child {
            child.for_each_route(f);
        }
        if let Some(child) = &self.wildcard_child {
            child.for_each_route(f);
        }
    }
}

/// Parses a normalized pattern into segments.
fn parse_pattern(pattern: &str) -> Result<Vec<Segment<'_>>, RouteError> {
    let raw: Vec<&str> = segments(pattern).collect();
    let mut parsed = Vec::with_capacity(raw.len());
    let mut seen: SmallVec<[&str; 4]> = SmallVec::new();

    for (index, part) in raw.iter().enumerate() {
        let segment = if *part == WILDCARD {
            if index + 1 != raw.len() {
                return Err(RouteError::WildcardNotLast {
                    pattern: pattern.to_string(),
                });
            }
            Segment::Wildcard
        } else if let Some(name) = part.strip_prefix(PARAM_MARKER) {
            if name.is_empty() {
                return Err(RouteError::EmptyParamName {
                    pattern: pattern.to_string(),
                });
            }
            if name == WILDCARD {
                return Err(RouteError::ReservedParamName {
                    pattern: pattern.to_string(),
                });
            }
            if seen.contains(&name) {
                return Err(RouteError::DuplicateParam {
                    pattern: pattern.to_string(),
                    name: name.to_string(),
                });
            }
            seen.push(name);
            Segment::Param(name)
        } else {
            Segment::Static(part)
        };
        parsed.push(segment);
    }

    Ok(parsed)
}
