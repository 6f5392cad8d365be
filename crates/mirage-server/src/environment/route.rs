//! Route, response and rule definitions.

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "get".to_string()
}

fn default_status() -> u16 {
    200
}

fn default_crud_key() -> String {
    "id".to_string()
}

/// A header key/value pair. Values may contain template expressions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteType {
    #[default]
    Http,
    /// Bucket-backed REST resource answering every CRUD verb.
    Crud,
    /// Streaming route fed by callbacks.
    Ws,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub uuid: String,
    #[serde(default)]
    pub documentation: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default, rename = "type")]
    pub route_type: RouteType,
    pub responses: Vec<RouteResponse>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Pick a random response instead of evaluating rules.
    #[serde(default)]
    pub random_response: bool,
    /// Bucket backing a CRUD route.
    #[serde(default)]
    pub databucket_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RulesOperator {
    And,
    #[default]
    Or,
}

/// Where a [`ResponseRule`] reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    Body,
    Query,
    Header,
    Params,
    RequestNumber,
    GlobalVar,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRule {
    #[serde(default)]
    pub target: Option<RuleTarget>,
    /// Path expression, or header name for header rules.
    #[serde(default)]
    pub modifier: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub invert: bool,
}

/// Fires a [`Callback`] after the response that references it is served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackInvocation {
    pub uuid: String,
    #[serde(default)]
    pub latency: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    #[serde(default)]
    pub uuid: String,
    #[serde(default = "default_status")]
    pub status_code: u16,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub databucket_id: Option<String>,
    #[serde(default)]
    pub rules: Vec<ResponseRule>,
    #[serde(default)]
    pub rules_operator: RulesOperator,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub latency: u64,
    #[serde(default)]
    pub disable_templating: bool,
    /// Identifier field used by CRUD routes.
    #[serde(default = "default_crud_key")]
    pub crud_key: String,
    #[serde(default)]
    pub callbacks: Vec<CallbackInvocation>,
}

impl Default for RouteResponse {
    fn default() -> Self {
        Self {
            uuid: String::new(),
            status_code: default_status(),
            label: String::new(),
            headers: Vec::new(),
            body: String::new(),
            file_path: None,
            databucket_id: None,
            rules: Vec::new(),
            rules_operator: RulesOperator::default(),
            is_default: false,
            latency: 0,
            disable_templating: false,
            crud_key: default_crud_key(),
            callbacks: Vec::new(),
        }
    }
}

/// Where the body of a [`RouteResponse`] comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySource<'a> {
    Inline(&'a str),
    File(&'a str),
    DataBucket(&'a str),
}

impl RouteResponse {
    pub fn body_source(&self) -> BodySource<'_> {
        if let Some(bucket) = self.databucket_id.as_deref().filter(|b| !b.is_empty()) {
            return BodySource::DataBucket(bucket);
        }
        if let Some(path) = self.file_path.as_deref().filter(|p| !p.is_empty()) {
            return BodySource::File(path);
        }
        BodySource::Inline(&self.body)
    }

    /// Display name used in logs.
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.uuid
        } else {
            &self.label
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataBucket {
    pub uuid: String,
    /// Short identifier usable in templates and routes.
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub documentation: String,
    /// Templated seed rendered once on start.
    #[serde(default)]
    pub value: String,
}

/// Server-initiated message pushed into a streaming route's channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Callback {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    pub route_uuid: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub replayable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_rule_target_deserializes() {
        let rule: ResponseRule =
            serde_json::from_value(json!({"target": "cookie", "modifier": "a", "value": "b"}))
                .unwrap();
        assert_eq!(rule.target, Some(RuleTarget::Unknown));

        let rule: ResponseRule = serde_json::from_value(json!({"modifier": "a"})).unwrap();
        assert_eq!(rule.target, None);
    }

    #[test]
    fn test_body_source_precedence() {
        let mut response: RouteResponse =
            serde_json::from_value(json!({"body": "inline"})).unwrap();
        assert_eq!(response.body_source(), BodySource::Inline("inline"));

        response.file_path = Some("data.json".into());
        assert_eq!(response.body_source(), BodySource::File("data.json"));

        response.databucket_id = Some("users".into());
        assert_eq!(response.body_source(), BodySource::DataBucket("users"));

        response.databucket_id = Some(String::new());
        assert_eq!(response.body_source(), BodySource::File("data.json"));
    }

    #[test]
    fn test_route_type_wire_names() {
        let route: Route = serde_json::from_value(json!({
            "uuid": "r",
            "type": "crud",
            "endpoint": "users",
            "responses": [{}]
        }))
        .unwrap();
        assert_eq!(route.route_type, RouteType::Crud);
        assert_eq!(route.method, "get");
    }
}
