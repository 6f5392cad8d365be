//! Route matching for an environment snapshot.
//!
//! Routes are compiled once per snapshot and matched in declaration order;
//! the first route whose method and endpoint match wins.

pub mod pattern;

use std::collections::HashMap;

use tracing::warn;

pub use pattern::EndpointPattern;

use crate::environment::{Environment, Route, RouteType};

/// Parameter name used for the item id of CRUD routes.
const CRUD_ID_PARAM: &str = "__crudId";

const CRUD_METHODS: &[&str] = &["get", "post", "put", "patch", "delete"];

/// A route that matched an incoming request.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    /// Index into the environment's route list
    pub route_index: usize,
    pub params: HashMap<String, String>,
    /// Item id for CRUD routes addressed as `endpoint/:id`
    pub crud_id: Option<String>,
}

/// A route endpoint that could not be compiled.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteCreationError {
    pub route_uuid: String,
    pub message: String,
}

#[derive(Debug)]
struct CompiledRoute {
    index: usize,
    method: String,
    route_type: RouteType,
    pattern: EndpointPattern,
    item_pattern: Option<EndpointPattern>,
}

#[derive(Debug, Default)]
pub struct RouteMatcher {
    routes: Vec<CompiledRoute>,
    endpoint_prefix: String,
    errors: Vec<RouteCreationError>,
}

impl RouteMatcher {
    pub fn new(environment: &Environment, disabled_routes: &[String]) -> Self {
        let mut routes = Vec::new();
        let mut errors = Vec::new();

        for (index, route) in environment.routes.iter().enumerate() {
            if is_route_disabled(route, disabled_routes) {
                continue;
            }
            match EndpointPattern::parse(&route.endpoint) {
                Ok(pattern) => {
                    let item_pattern = match route.route_type {
                        RouteType::Crud => pattern.with_param(CRUD_ID_PARAM),
                        _ => None,
                    };
                    routes.push(CompiledRoute {
                        index,
                        method: route.method.to_ascii_lowercase(),
                        route_type: route.route_type,
                        pattern,
                        item_pattern,
                    });
                }
                Err(e) => {
                    warn!(
                        "Route {} ({}) could not be created: {}",
                        route.uuid, route.endpoint, e
                    );
                    errors.push(RouteCreationError {
                        route_uuid: route.uuid.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Self {
            routes,
            endpoint_prefix: environment.endpoint_prefix.trim_matches('/').to_string(),
            errors,
        }
    }

    /// Endpoints that failed to compile.
    pub fn creation_errors(&self) -> &[RouteCreationError] {
        &self.errors
    }

    /// Find the first route matching `method` and `path`.
    pub fn find(&self, method: &str, path: &str) -> Option<RouteMatch> {
        let method = method.to_ascii_lowercase();
        let path = collapse_slashes(path);
        let path = self.strip_prefix(&path);

        for route in &self.routes {
            match route.route_type {
                RouteType::Crud => {
                    if !CRUD_METHODS.contains(&method.as_str()) {
                        continue;
                    }
                    if let Some(params) = route.pattern.match_path(path) {
                        return Some(RouteMatch {
                            route_index: route.index,
                            params,
                            crud_id: None,
                        });
                    }
                    if let Some(mut params) =
                        route.item_pattern.as_ref().and_then(|p| p.match_path(path))
                    {
                        let crud_id = params.remove(CRUD_ID_PARAM);
                        return Some(RouteMatch {
                            route_index: route.index,
                            params,
                            crud_id,
                        });
                    }
                }
                _ => {
                    if route.method != method && route.method != "all" {
                        continue;
                    }
                    if let Some(params) = route.pattern.match_path(path) {
                        return Some(RouteMatch {
                            route_index: route.index,
                            params,
                            crud_id: None,
                        });
                    }
                }
            }
        }
        None
    }

    fn strip_prefix<'p>(&self, path: &'p str) -> &'p str {
        if self.endpoint_prefix.is_empty() {
            return path;
        }
        let Some(rest) = path
            .strip_prefix('/')
            .and_then(|p| p.strip_prefix(self.endpoint_prefix.as_str()))
        else {
            return path;
        };
        if rest.is_empty() {
            "/"
        } else if rest.starts_with('/') {
            rest
        } else {
            path
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Whether a route is excluded from matching, either by its own flag or by
/// the host's `disabledRoutes` list (uuids or endpoint substrings).
pub fn is_route_disabled(route: &Route, disabled_routes: &[String]) -> bool {
    !route.enabled
        || disabled_routes
            .iter()
            .filter(|entry| !entry.is_empty())
            .any(|entry| *entry == route.uuid || route.endpoint.contains(entry.as_str()))
}

/// Collapse repeated `/` into one.
pub fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(c);
    }
    out
}
