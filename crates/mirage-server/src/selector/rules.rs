//! Response rule evaluation.

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::targets::{ResolvedValue, RuleTargets};
use crate::data::GlobalVariables;
use crate::environment::{ResponseRule, RuleTarget};
use crate::request::{lookup_path, RequestData};

/// Evaluate one rule against the current request.
///
/// A rule without a target or a modifier is never valid.
pub fn is_valid_rule(
    rule: &ResponseRule,
    request: &RequestData,
    targets: &RuleTargets,
    global_vars: &GlobalVariables,
) -> bool {
    let Some(target) = rule.target else {
        return false;
    };
    if rule.modifier.is_empty() {
        return false;
    }

    let resolved = match target {
        RuleTarget::Header => match request.header(&rule.modifier) {
            Some(value) => ResolvedValue::Scalar(value.to_string()),
            None => ResolvedValue::Missing,
        },
        RuleTarget::Body => ResolvedValue::resolve(&targets.body, &rule.modifier),
        RuleTarget::Query => ResolvedValue::resolve(&targets.query, &rule.modifier),
        RuleTarget::Params => ResolvedValue::resolve(&targets.params, &rule.modifier),
        RuleTarget::RequestNumber => ResolvedValue::Scalar(targets.request_number.to_string()),
        RuleTarget::GlobalVar => resolve_global_var(global_vars, &rule.modifier),
        RuleTarget::Unknown => return false,
    };

    let result = match resolved {
        ResolvedValue::Missing => return false,
        resolved if rule.is_regex => match Regex::new(&rule.value) {
            Ok(regex) => match resolved {
                ResolvedValue::Scalar(s) => regex.is_match(&s),
                ResolvedValue::List(items) => items.iter().any(|item| regex.is_match(item)),
                ResolvedValue::Missing => false,
            },
            Err(e) => {
                debug!("Invalid rule regex '{}': {}", rule.value, e);
                return false;
            }
        },
        ResolvedValue::Scalar(s) => s == rule.value,
        ResolvedValue::List(items) => items.iter().any(|item| *item == rule.value),
    };

    result != rule.invert
}

/// `key` or `key.path` against the global variables.
fn resolve_global_var(global_vars: &GlobalVariables, modifier: &str) -> ResolvedValue {
    let (name, path) = match modifier.split_once('.') {
        Some((name, path)) => (name, path),
        None => (modifier, ""),
    };
    let value: Option<Value> = global_vars.get(name).and_then(|v| lookup_path(&v, path));
    ResolvedValue::from_value(value)
}
