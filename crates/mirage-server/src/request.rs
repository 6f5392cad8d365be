//! Request data shared by rule evaluation, templating and the transaction log.
//!
//! The request body is collected once per request and kept as raw bytes. Query
//! strings and form bodies are parsed into `serde_json::Value` objects so rule
//! modifiers and template paths resolve against them uniformly.

use std::borrow::Cow;
use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use hyper::HeaderMap;
use serde_json::{Map, Value};
use serde_json_path::JsonPath;

use crate::environment::Header;

/// Parsed request data for a single incoming request.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    /// HTTP method, uppercase
    pub method: String,
    /// Request path with duplicate slashes collapsed (without query string)
    pub path: String,
    pub query_string: Option<String>,
    /// Query parameters as a JSON object; repeated keys become arrays
    pub query: Value,
    pub headers: HeaderMap,
    /// Path parameters extracted from the matched route pattern
    pub path_params: HashMap<String, String>,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestData {
    pub fn new(
        method: &str,
        path: &str,
        query_string: Option<&str>,
        headers: HeaderMap,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query_string: query_string.filter(|q| !q.is_empty()).map(str::to_string),
            query: parse_query_string(query_string),
            headers,
            path_params: HashMap::new(),
            body,
            remote_addr,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name.to_ascii_lowercase().as_str())
            .and_then(|v| v.to_str().ok())
    }

    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Host header without its port.
    pub fn hostname(&self) -> String {
        let host = self.header("host").unwrap_or_default();
        match host.rsplit_once(':') {
            Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name.to_string(),
            _ => host.to_string(),
        }
    }

    pub fn ip(&self) -> String {
        self.remote_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default()
    }

    /// Body parsed according to its content type.
    ///
    /// Form-encoded bodies become an object, JSON bodies are parsed as-is, and
    /// anything unparseable becomes an empty object.
    pub fn parsed_body(&self) -> Value {
        let content_type = self.content_type().unwrap_or_default().to_ascii_lowercase();
        if content_type.contains("application/x-www-form-urlencoded") {
            return parse_query_string(Some(&self.body_str()));
        }
        if content_type.contains("json") {
            if let Ok(value) = serde_json::from_slice::<Value>(&self.body) {
                return value;
            }
        }
        Value::Object(Map::new())
    }

    /// Headers as ordered key/value pairs for transaction records.
    pub fn header_list(&self) -> Vec<Header> {
        header_list(&self.headers)
    }
}

/// Convert a header map into ordered key/value pairs.
pub fn header_list(headers: &HeaderMap) -> Vec<Header> {
    headers
        .iter()
        .map(|(k, v)| Header::new(k.as_str(), String::from_utf8_lossy(v.as_bytes())))
        .collect()
}

/// Decode a URL-encoded component, treating `+` as a space.
pub fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Parse a query string (or form body) into a JSON object.
///
/// Repeated keys become arrays and bracketed keys nest:
/// `a=1&a=2&user[name]=x&tags[]=t` gives
/// `{"a": ["1", "2"], "user": {"name": "x"}, "tags": ["t"]}`.
pub fn parse_query_string(query: Option<&str>) -> Value {
    let mut root = Value::Object(Map::new());
    if let Some(q) = query {
        for pair in q.split('&').filter(|p| !p.is_empty()) {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(raw_key);
            let value = Value::String(decode_component(raw_value));
            let segments = key_segments(&key);
            insert_segments(&mut root, &segments, value);
        }
    }
    root
}

/// Bracket segments nested beyond this depth stay in one literal key.
const MAX_KEY_DEPTH: usize = 20;

fn key_segments(key: &str) -> Vec<&str> {
    match key.find('[') {
        Some(open) if key.ends_with(']') && open > 0 => {
            let mut segments = vec![&key[..open]];
            let mut rest = &key[open + 1..key.len() - 1];
            for _ in 0..MAX_KEY_DEPTH {
                match rest.split_once("][") {
                    Some((segment, tail)) => {
                        segments.push(segment);
                        rest = tail;
                    }
                    None => break,
                }
            }
            segments.push(rest);
            segments
        }
        _ => vec![key],
    }
}

fn insert_segments(target: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    if head.is_empty() {
        // `key[]` appends
        if !target.is_array() {
            *target = Value::Array(Vec::new());
        }
        if let Value::Array(items) = target {
            if rest.is_empty() {
                items.push(value);
            } else {
                let mut child = Value::Object(Map::new());
                insert_segments(&mut child, rest, value);
                items.push(child);
            }
        }
        return;
    }

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(map) = target else {
        return;
    };

    if rest.is_empty() {
        match map.get_mut(*head) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, value]);
            }
            None => {
                map.insert(head.to_string(), value);
            }
        }
    } else {
        let child = map
            .entry(head.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        insert_segments(child, rest, value);
    }
}

/// Resolve a path expression against a JSON value.
///
/// Paths starting with `$` are JSONPath queries; anything else is a dot path
/// where numeric segments index arrays. An empty path returns the value itself.
pub fn lookup_path(value: &Value, path: &str) -> Option<Value> {
    let path = path.trim();
    if path.is_empty() {
        return Some(value.clone());
    }

    if path.starts_with('$') {
        let json_path = JsonPath::parse(path).ok()?;
        let nodes = json_path.query(value).all();
        return match nodes.len() {
            0 => None,
            1 => Some(nodes[0].clone()),
            _ => Some(Value::Array(nodes.into_iter().cloned().collect())),
        };
    }

    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}
