//! High-level router API.
//!
//! [`Router`] owns one prefix tree per HTTP method. A method that has never
//! had a route registered has no tree and matches nothing.

use std::collections::HashMap;

use http::Method;

use crate::error::RouteError;
use crate::node::{Node, Route};
use crate::path::normalize_path;
use crate::RouteMatch;

/// A per-method prefix tree router.
///
/// The handler type is generic so the router can store anything from an
/// operation name to a fully decorated async handler.
///
/// # Example
///
/// ```rust
/// use cyber_router::Router;
/// use http::Method;
///
/// let mut router = Router::new();
/// router.add_route(Method::GET, "/users", "listUsers").unwrap();
/// router.add_route(Method::GET, "/users/:id", "getUser").unwrap();
///
/// let m = router.match_route(&Method::GET, "/users/42").unwrap();
/// assert_eq!(*m.handler, "getUser");
/// assert_eq!(m.params.get("id"), Some("42"));
/// ```
///
/// # Route Priority
///
/// 1. **Static segments** (`/users/profile`)
/// 2. **Parameter segments** (`/users/:id`)
/// 3. **Wildcard** (`/users/*`)
///
/// Priority is applied with backtracking, so a static branch that dead-ends
/// deeper in the path does not hide a parameter branch that matches.
#[derive(Debug, Clone)]
pub struct Router<H> {
    trees: HashMap<Method, Node<H>>,
    route_count: usize,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Router<H> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trees: HashMap::new(),
            route_count: 0,
        }
    }

    /// Registers `handler` for `method` and `pattern`.
    ///
    /// The pattern is normalized first (leading `/` added, one trailing `/`
    /// removed). Re-registering the same method and normalized pattern
    /// replaces the handler; the replaced one is returned.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] if the pattern is malformed; the router is left
    /// unchanged in that case.
    pub fn add_route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: H,
    ) -> Result<Option<H>, RouteError> {
        let pattern = normalize_path(pattern);
        let previous = match self.trees.get_mut(&method) {
            Some(tree) => tree.insert(&pattern, handler)?,
            None => {
                let mut tree = Node::root();
                tree.insert(&pattern, handler)?;
                self.trees.insert(method, tree);
                None
            }
        };
        if previous.is_none() {
            self.route_count += 1;
        }
        Ok(previous)
    }

    /// Matches `method` and `path`.
    ///
    /// Returns `None` when nothing matches; a miss is not an error.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_, H>> {
        let tree = self.trees.get(method)?;
        let path = normalize_path(path);
        tree.match_path(&path).map(|(route, params)| RouteMatch {
            handler: &route.handler,
            pattern: &route.pattern,
            params,
        })
    }

    /// Returns `true` if at least one route exists for `method`.
    #[must_use]
    pub fn has_method(&self, method: &Method) -> bool {
        self.trees.contains_key(method)
    }

    /// Returns every registered route for `method`.
    #[must_use]
    pub fn routes(&self, method: &Method) -> Vec<&Route<H>> {
        let mut out = Vec::new();
        if let Some(tree) = self.trees.get(method) {
            tree.for_each_route(&mut |route| out.push(route));
        }
        out
    }

    /// Returns the number of distinct (method, pattern) routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns `true` if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }
}
