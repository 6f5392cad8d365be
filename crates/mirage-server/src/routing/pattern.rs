//! Endpoint patterns.
//!
//! Supports patterns like:
//! - `users/:id` - named parameter
//! - `users/:id/posts/:postId` - multiple parameters
//! - `files/*` - wildcard suffix
//! - `/^users\/(?<id>[0-9]+)$/` - regular expression with named captures

use std::collections::HashMap;

use regex::Regex;

use crate::request::decode_component;

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

#[derive(Debug, Clone)]
pub enum EndpointPattern {
    Segments(Vec<Segment>),
    Regex(Regex),
}

/// Whether an endpoint is written as `/regex/`.
pub fn is_regex_endpoint(endpoint: &str) -> bool {
    endpoint.len() > 2 && endpoint.starts_with('/') && endpoint.ends_with('/')
}

impl EndpointPattern {
    pub fn parse(endpoint: &str) -> Result<Self, regex::Error> {
        if is_regex_endpoint(endpoint) {
            let inner = &endpoint[1..endpoint.len() - 1];
            let inner = inner.trim_start_matches('^').trim_end_matches('$');
            let regex = Regex::new(&format!("^(?:{inner})$"))?;
            return Ok(EndpointPattern::Regex(regex));
        }

        let segments = split_path(endpoint)
            .map(|part| {
                if part == "*" {
                    Segment::Wildcard
                } else if let Some(name) = part.strip_prefix(':') {
                    Segment::Param(name.to_string())
                } else {
                    Segment::Literal(part.to_string())
                }
            })
            .collect();
        Ok(EndpointPattern::Segments(segments))
    }

    /// Pattern with an extra trailing parameter, used for CRUD item paths.
    pub fn with_param(&self, name: &str) -> Option<Self> {
        match self {
            EndpointPattern::Segments(segments) => {
                let mut segments = segments.clone();
                segments.push(Segment::Param(name.to_string()));
                Some(EndpointPattern::Segments(segments))
            }
            EndpointPattern::Regex(_) => None,
        }
    }

    /// Match a request path, returning extracted parameters.
    pub fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        match self {
            EndpointPattern::Regex(regex) => {
                let target = path.strip_prefix('/').unwrap_or(path);
                let captures = regex.captures(target)?;
                let params = regex
                    .capture_names()
                    .flatten()
                    .filter_map(|name| {
                        captures
                            .name(name)
                            .map(|m| (name.to_string(), decode_component(m.as_str())))
                    })
                    .collect();
                Some(params)
            }
            EndpointPattern::Segments(segments) => match_segments(segments, path),
        }
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|part| !part.is_empty())
}

fn match_segments(pattern: &[Segment], path: &str) -> Option<HashMap<String, String>> {
    let mut params = HashMap::new();
    let path_parts: Vec<&str> = split_path(path).collect();

    for (i, segment) in pattern.iter().enumerate() {
        match segment {
            Segment::Wildcard => return Some(params),
            Segment::Param(name) => {
                let part = path_parts.get(i)?;
                params.insert(name.clone(), decode_component(part));
            }
            Segment::Literal(literal) => {
                if path_parts.get(i)? != literal {
                    return None;
                }
            }
        }
    }

    if pattern.len() != path_parts.len() {
        return None;
    }
    Some(params)
}
