//! Request-to-rule matching.
//!
//! A server's rules are compiled once per configuration generation into a
//! [`RuleSet`]. Matching walks the rules in declaration order and evaluates a
//! fixed sequence of predicates per rule, stopping at the first that fails.
//! The first rule passing every predicate wins.

use crate::config::{Config, HttpMethod, ServerConfig};
use bytes::Bytes;
use hyper::http::request::Parts;
use std::collections::HashMap;

/// Everything the matcher and the request log need from an inbound request
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub method: String,
    /// Percent-decoded request path
    pub path: String,
    /// Query parameters in first-seen order; a repeated key keeps its last value
    pub query: Vec<(String, String)>,
    /// Header pairs in arrival order, names lower-case
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        let raw_path = parts.uri.path();
        let path = urlencoding::decode(raw_path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| raw_path.to_string());

        let headers = parts
            .headers
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();

        Self {
            method: parts.method.as_str().to_string(),
            path,
            query: parse_query_string(parts.uri.query().unwrap_or("")),
            headers,
            body,
        }
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First header with this name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Parse a query string, URL-decoding keys and values (`+` is a space).
/// A key without `=` gets an empty value.
pub fn parse_query_string(query: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for pair in query.split('&').filter(|s| !s.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = decode_component(value);
        match pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => pairs.push((key, value)),
        }
    }
    pairs
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// A request rule resolved against its server
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: String,
    pub method: HttpMethod,
    /// Server base path followed by the rule mapping
    pub full_path: String,
    pub parameters: Option<HashMap<String, String>>,
    pub body: Option<Bytes>,
    pub response_id: String,
}

type Predicate = fn(&CompiledRule, &InboundRequest) -> bool;

/// Evaluation order is part of the matching contract
const PREDICATES: [Predicate; 4] = [
    method_matches,
    path_matches,
    parameters_match,
    body_matches,
];

fn method_matches(rule: &CompiledRule, request: &InboundRequest) -> bool {
    rule.method.as_str() == request.method
}

fn path_matches(rule: &CompiledRule, request: &InboundRequest) -> bool {
    rule.full_path == request.path
}

fn parameters_match(rule: &CompiledRule, request: &InboundRequest) -> bool {
    match &rule.parameters {
        Some(expected) => expected
            .iter()
            .all(|(key, value)| request.query_value(key) == Some(value.as_str())),
        None => true,
    }
}

fn body_matches(rule: &CompiledRule, request: &InboundRequest) -> bool {
    match &rule.body {
        Some(expected) => *expected == request.body,
        None => true,
    }
}

impl CompiledRule {
    pub fn matches(&self, request: &InboundRequest) -> bool {
        PREDICATES.iter().all(|predicate| predicate(self, request))
    }
}

/// No rule of the server accepted the request
#[derive(Debug, Clone, thiserror::Error)]
#[error("Request '{method} {path}' matches no rule. Will be allocated to default response")]
pub struct NoRouteMatch {
    pub method: String,
    pub path: String,
}

/// Ordered rules of one server
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Resolve the server's rules. Rule bodies are loaded here, once per
    /// configuration generation.
    pub fn compile(config: &Config, server: &ServerConfig) -> Self {
        let base_path = server.base_url.base_path();
        let rules = config
            .server_requests(server)
            .map(|(id, request)| CompiledRule {
                id: id.to_string(),
                method: request.method,
                full_path: format!("{base_path}{}", request.mapping),
                parameters: request.parameters.clone(),
                body: request.body.as_ref().map(|body| body.load_blocking()),
                response_id: request.response_id.clone(),
            })
            .collect();
        Self { rules }
    }

    pub fn from_rules(rules: Vec<CompiledRule>) -> Self {
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn find(&self, request: &InboundRequest) -> Result<&CompiledRule, NoRouteMatch> {
        self.rules
            .iter()
            .find(|rule| rule.matches(request))
            .ok_or_else(|| NoRouteMatch {
                method: request.method.clone(),
                path: request.path.clone(),
            })
    }
}
