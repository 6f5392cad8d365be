//! Response selection for a matched route.
//!
//! Routes either pick a response at random or walk their responses in order
//! and return the first whose rules pass. When nothing is eligible the first
//! response is served.

pub mod rules;
pub mod targets;

use rand::Rng;

pub use rules::is_valid_rule;
pub use targets::{extract_targets, ResolvedValue, RuleTargets};

use crate::data::GlobalVariables;
use crate::environment::{Route, RouteResponse, RulesOperator};
use crate::request::RequestData;

/// Select the response to serve. Returns `None` only for a route without
/// responses.
pub fn select_response<'r, R: Rng + ?Sized>(
    route: &'r Route,
    request: &RequestData,
    targets: &RuleTargets,
    global_vars: &GlobalVariables,
    rng: &mut R,
) -> Option<&'r RouteResponse> {
    let first = route.responses.first()?;

    if route.random_response {
        let index = rng.gen_range(0..route.responses.len());
        return Some(route.responses.get(index).unwrap_or(first));
    }

    let selected = route
        .responses
        .iter()
        .find(|response| is_eligible(response, request, targets, global_vars))
        .unwrap_or(first);
    Some(selected)
}

fn is_eligible(
    response: &RouteResponse,
    request: &RequestData,
    targets: &RuleTargets,
    global_vars: &GlobalVariables,
) -> bool {
    if response.rules.is_empty() {
        return false;
    }
    let mut results = response
        .rules
        .iter()
        .map(|rule| is_valid_rule(rule, request, targets, global_vars));
    match response.rules_operator {
        RulesOperator::And => results.all(|valid| valid),
        RulesOperator::Or => results.any(|valid| valid),
    }
}
