//! Per-request values that response rules are evaluated against.

use serde_json::{Map, Value};

use crate::request::{lookup_path, RequestData};
use crate::template::value_to_string;

/// Values a rule modifier can resolve against. Built once per request.
#[derive(Debug, Clone)]
pub struct RuleTargets {
    pub body: Value,
    pub query: Value,
    pub params: Value,
    /// 1-based count of requests served by the matched route
    pub request_number: u64,
}

pub fn extract_targets(request: &RequestData, request_number: u64) -> RuleTargets {
    let params = request
        .path_params
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect::<Map<String, Value>>();

    RuleTargets {
        body: request.parsed_body(),
        query: request.query.clone(),
        params: Value::Object(params),
        request_number,
    }
}

/// A rule target value after path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedValue {
    Scalar(String),
    List(Vec<String>),
    Missing,
}

impl ResolvedValue {
    pub fn from_value(value: Option<Value>) -> Self {
        match value {
            None => ResolvedValue::Missing,
            Some(Value::Array(items)) => {
                ResolvedValue::List(items.iter().map(value_to_string).collect())
            }
            Some(other) => ResolvedValue::Scalar(value_to_string(&other)),
        }
    }

    /// Resolve `path` against `root`.
    pub fn resolve(root: &Value, path: &str) -> Self {
        Self::from_value(lookup_path(root, path))
    }
}
