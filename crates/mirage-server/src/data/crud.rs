//! CRUD operations over a data bucket value.
//!
//! Array buckets are treated as collections keyed by `crudKey` (or by index
//! for arrays of primitives). Any other value is treated as a single
//! document that the verbs replace, merge or clear as a whole.

use std::cmp::Ordering;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::template::value_to_string;

#[derive(Debug, Error, PartialEq)]
pub enum CrudError {
    #[error("Item '{0}' not found")]
    NotFound(String),
    #[error("Data bucket '{0}' not found")]
    BucketNotFound(String),
    #[error("Method {0} is not supported on CRUD routes")]
    UnsupportedMethod(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrudOperation {
    List,
    Get,
    Create,
    Replace,
    ReplaceItem,
    Merge,
    MergeItem,
    Clear,
    Delete,
}

impl CrudOperation {
    pub fn from_request(method: &str, has_id: bool) -> Result<Self, CrudError> {
        let op = match (method.to_ascii_uppercase().as_str(), has_id) {
            ("GET", false) => CrudOperation::List,
            ("GET", true) => CrudOperation::Get,
            ("POST", _) => CrudOperation::Create,
            ("PUT", false) => CrudOperation::Replace,
            ("PUT", true) => CrudOperation::ReplaceItem,
            ("PATCH", false) => CrudOperation::Merge,
            ("PATCH", true) => CrudOperation::MergeItem,
            ("DELETE", false) => CrudOperation::Clear,
            ("DELETE", true) => CrudOperation::Delete,
            (other, _) => return Err(CrudError::UnsupportedMethod(other.to_string())),
        };
        Ok(op)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrudResult {
    pub status: u16,
    /// `Value::Null` means an empty body
    pub body: Value,
    /// Set for list reads, before paging
    pub total_count: Option<usize>,
}

impl CrudResult {
    fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body,
            total_count: None,
        }
    }
}

/// Apply one operation to `bucket`.
pub fn execute_crud(
    op: CrudOperation,
    id: Option<&str>,
    payload: Value,
    query: &Value,
    crud_key: &str,
    bucket: &mut Value,
) -> Result<CrudResult, CrudError> {
    let id = id.unwrap_or_default();

    let Value::Array(items) = &mut *bucket else {
        return Ok(execute_on_document(op, payload, bucket));
    };

    match op {
        CrudOperation::List => {
            let filtered = filter_and_sort(items, query);
            let total = filtered.len();
            let page = paginate(filtered, query);
            Ok(CrudResult {
                status: 200,
                body: Value::Array(page),
                total_count: Some(total),
            })
        }
        CrudOperation::Get => {
            let index = find_index(items, crud_key, id).ok_or_else(|| CrudError::NotFound(id.to_string()))?;
            Ok(CrudResult::ok(items[index].clone()))
        }
        CrudOperation::Create => {
            let mut item = payload;
            if let Value::Object(map) = &mut item {
                if !map.contains_key(crud_key) {
                    map.insert(crud_key.to_string(), next_id(items, crud_key));
                }
            }
            items.push(item.clone());
            Ok(CrudResult {
                status: 201,
                body: item,
                total_count: None,
            })
        }
        CrudOperation::Replace => {
            *bucket = payload.clone();
            Ok(CrudResult::ok(payload))
        }
        CrudOperation::ReplaceItem => {
            let index = find_index(items, crud_key, id).ok_or_else(|| CrudError::NotFound(id.to_string()))?;
            let mut item = payload;
            if let (Value::Object(map), Some(existing)) = (&mut item, items[index].get(crud_key)) {
                map.insert(crud_key.to_string(), existing.clone());
            }
            items[index] = item.clone();
            Ok(CrudResult::ok(item))
        }
        CrudOperation::Merge => {
            merge(bucket, payload);
            Ok(CrudResult::ok(bucket.clone()))
        }
        CrudOperation::MergeItem => {
            let index = find_index(items, crud_key, id).ok_or_else(|| CrudError::NotFound(id.to_string()))?;
            let key_value = items[index].get(crud_key).cloned();
            merge(&mut items[index], payload);
            if let (Value::Object(map), Some(key_value)) = (&mut items[index], key_value) {
                map.insert(crud_key.to_string(), key_value);
            }
            Ok(CrudResult::ok(items[index].clone()))
        }
        CrudOperation::Clear => {
            items.clear();
            Ok(CrudResult::ok(Value::Null))
        }
        CrudOperation::Delete => {
            let index = find_index(items, crud_key, id).ok_or_else(|| CrudError::NotFound(id.to_string()))?;
            items.remove(index);
            Ok(CrudResult::ok(Value::Null))
        }
    }
}

fn execute_on_document(op: CrudOperation, payload: Value, bucket: &mut Value) -> CrudResult {
    match op {
        CrudOperation::List | CrudOperation::Get => CrudResult::ok(bucket.clone()),
        CrudOperation::Create | CrudOperation::Replace | CrudOperation::ReplaceItem => {
            *bucket = payload;
            CrudResult {
                status: if op == CrudOperation::Create { 201 } else { 200 },
                body: bucket.clone(),
                total_count: None,
            }
        }
        CrudOperation::Merge | CrudOperation::MergeItem => {
            merge(bucket, payload);
            CrudResult::ok(bucket.clone())
        }
        CrudOperation::Clear | CrudOperation::Delete => {
            *bucket = Value::Null;
            CrudResult::ok(Value::Null)
        }
    }
}

/// Position of the item whose key matches `id` by string form. Arrays of
/// primitives use the index as id.
fn find_index(items: &[Value], crud_key: &str, id: &str) -> Option<usize> {
    if items.iter().all(|item| !item.is_object()) {
        return id.parse::<usize>().ok().filter(|i| *i < items.len());
    }
    items.iter().position(|item| {
        item.get(crud_key)
            .map(|key| value_to_string(key) == id)
            .unwrap_or(false)
    })
}

/// Highest numeric id plus one, or a fresh UUID when no numeric ids exist
/// or the next one would overflow.
fn next_id(items: &[Value], crud_key: &str) -> Value {
    let max = items
        .iter()
        .filter_map(|item| item.get(crud_key))
        .filter_map(|key| match key {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        })
        .max();
    match max.and_then(|max| max.checked_add(1)) {
        Some(next) => Value::from(next),
        None => Value::String(uuid::Uuid::new_v4().to_string()),
    }
}

fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(existing), Value::Object(patch)) => {
            for (key, value) in patch {
                existing.insert(key, value);
            }
        }
        (target, patch) => *target = patch,
    }
}

fn query_str<'a>(query: &'a Value, key: &str) -> Option<&'a str> {
    query.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn filter_and_sort(items: &[Value], query: &Value) -> Vec<Value> {
    let mut result: Vec<Value> = match query_str(query, "search") {
        Some(search) => {
            let needle = search.to_lowercase();
            items
                .iter()
                .filter(|item| contains_text(item, &needle))
                .cloned()
                .collect()
        }
        None => items.to_vec(),
    };

    if let Some(field) = query_str(query, "sort") {
        let descending = query_str(query, "order")
            .map(|o| o.eq_ignore_ascii_case("desc"))
            .unwrap_or(false);
        result.sort_by(|a, b| {
            let ordering = compare_values(a.get(field), b.get(field));
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }
    result
}

fn contains_text(item: &Value, needle: &str) -> bool {
    match item {
        Value::Object(map) => map.values().any(|v| contains_text(v, needle)),
        Value::Array(items) => items.iter().any(|v| contains_text(v, needle)),
        other => value_to_string(other).to_lowercase().contains(needle),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => value_to_string(x).cmp(&value_to_string(y)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn paginate(items: Vec<Value>, query: &Value) -> Vec<Value> {
    let page = query_str(query, "page").and_then(|p| p.parse::<usize>().ok());
    let limit = query_str(query, "limit").and_then(|l| l.parse::<usize>().ok());
    if page.is_none() && limit.is_none() {
        return items;
    }
    let limit = limit.unwrap_or(10).max(1);
    let page = page.unwrap_or(1).max(1);
    items
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .collect()
}

/// Empty object body used for CRUD 404s.
pub fn not_found_body() -> Value {
    Value::Object(Map::new())
}
