//! Procedure tree
//!
//! Procedures are registered under slash-separated names (`health`,
//! `user/me`). The RPC transport looks them up by name; the REST transport
//! matches the method and path template declared in each procedure's
//! [`Route`](super::Route).

use axum::http::Method;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::procedure::Procedure;

#[derive(Clone, Default)]
pub struct ProcedureRouter {
    procedures: BTreeMap<String, Procedure>,
}

/// A REST match: the procedure plus values captured from the path template
pub struct RestMatch<'a> {
    pub name: &'a str,
    pub procedure: &'a Procedure,
    pub params: Map<String, Value>,
}

impl ProcedureRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn procedure(mut self, name: &str, procedure: Procedure) -> Self {
        tracing::debug!(
            procedure = %normalize(name),
            middlewares = ?procedure.middleware_names(),
            "Registered procedure"
        );
        self.procedures
            .insert(normalize(name).to_string(), procedure);
        self
    }

    pub fn resolve_rpc(&self, path: &str) -> Option<(&str, &Procedure)> {
        self.procedures
            .get_key_value(normalize(path))
            .map(|(name, procedure)| (name.as_str(), procedure))
    }

    pub fn resolve_rest(&self, method: &Method, path: &str) -> Option<RestMatch<'_>> {
        self.procedures.iter().find_map(|(name, procedure)| {
            let route = procedure.route()?;
            if route.method != *method {
                return None;
            }
            match_template(&route.path, path).map(|params| RestMatch {
                name: name.as_str(),
                procedure,
                params,
            })
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Procedure)> {
        self.procedures.iter().map(|(n, p)| (n.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

/// Match a concrete path against a `/users/{id}` style template
pub fn match_template(template: &str, path: &str) -> Option<Map<String, Value>> {
    let template_segments: Vec<&str> = normalize(template)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    let path_segments: Vec<&str> = normalize(path)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if template_segments.len() != path_segments.len() {
        return None;
    }

    let mut params = Map::new();
    for (expected, actual) in template_segments.iter().zip(path_segments.iter()) {
        match expected
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            Some(param) => {
                params.insert(param.to_string(), Value::String(actual.to_string()));
            }
            None if expected == actual => {}
            None => return None,
        }
    }

    Some(params)
}
