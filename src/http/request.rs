//! Request handling and transformation.
//!
//! # Responsibilities
//! - Map request paths onto conventional route values
//! - Snapshot method, path, query, headers and body into `RequestData`
//!
//! # Design Decisions
//! - Conventional routes map path segments positionally onto keys; there
//!   is no template syntax
//! - Routes are tried in configuration order; the first that fits wins
//! - Missing segments fall back to defaults, otherwise the key stays absent

use std::collections::BTreeMap;

use axum::body::Bytes;
use axum::extract::Query;
use axum::http::request::Parts;

use crate::config::schema::ConventionalRouteConfig;
use crate::routing::values::{RequestData, RouteData, RouteValues};

/// Ordered conventional routes.
#[derive(Debug, Clone)]
pub struct ConventionalRoutes {
    routes: Vec<ConventionalRouteConfig>,
}

impl ConventionalRoutes {
    pub fn new(routes: Vec<ConventionalRouteConfig>) -> Self {
        Self { routes }
    }

    /// Route data for the first route that fits `path`.
    pub fn match_path(&self, path: &str) -> Option<RouteData> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.routes.iter().find_map(|route| map_route(route, &segments))
    }
}

fn map_route(route: &ConventionalRouteConfig, segments: &[&str]) -> Option<RouteData> {
    let mut rest = segments;
    if let Some(prefix) = &route.prefix {
        for literal in prefix.split('/').filter(|s| !s.is_empty()) {
            let (first, tail) = rest.split_first()?;
            if !first.eq_ignore_ascii_case(literal) {
                return None;
            }
            rest = tail;
        }
    }
    if rest.len() > route.keys.len() {
        return None;
    }

    let mut values = RouteValues::new();
    for (i, key) in route.keys.iter().enumerate() {
        match rest.get(i) {
            Some(segment) => values.insert(key, *segment),
            None => {
                if let Some(default) = route.defaults.get(key) {
                    values.insert(key, default.as_str());
                }
            }
        }
    }
    for (key, default) in &route.defaults {
        if !values.contains_key(key) {
            values.insert(key, default.as_str());
        }
    }

    Some(RouteData {
        values,
        routers: vec![route.name.clone()],
    })
}

/// Builds the immutable request snapshot handed to the pipeline.
pub fn request_data(parts: &Parts, body: Bytes) -> RequestData {
    let query = Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(q)| q)
        .unwrap_or_else(|e| {
            tracing::debug!(error = %e, "Ignoring malformed query string");
            BTreeMap::new()
        });

    RequestData {
        method: parts.method.clone(),
        path: parts.uri.path().to_string(),
        query,
        headers: parts.headers.clone(),
        body,
    }
}
