//! Handlebars-style template engine used for response bodies, headers,
//! data bucket seeds and callback bodies.
//!
//! Templates are parsed into a small AST (`parser`) and evaluated against a
//! [`RenderContext`]. The helper set is closed: an unknown helper renders as
//! the empty string rather than failing the response.
//!
//! # Example
//!
//! ```ignore
//! let engine = TemplateEngine::new(&FakerOptions::default(), "MOCKOON_");
//! let ctx = RenderContext::for_request(&request);
//! let body = engine.render("Hello {{urlParam 'name'}}", &ctx)?;
//! ```

mod faker;
mod helpers;
pub mod migration;
mod parser;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

pub use helpers::value_to_string;
pub use parser::has_expressions;

use crate::data::{DataStore, GlobalVariables};
use crate::environment::{FakerLocale, FakerOptions};
use crate::request::RequestData;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("Template parse error: {0}")]
    Parse(String),
}

/// Everything a template can read while rendering.
#[derive(Clone, Copy, Default)]
pub struct RenderContext<'a> {
    pub request: Option<&'a RequestData>,
    pub data: Option<&'a DataStore>,
    pub global_vars: Option<&'a GlobalVariables>,
}

impl<'a> RenderContext<'a> {
    /// Context with no request, as used for bucket seeding.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn for_request(request: &'a RequestData) -> Self {
        Self {
            request: Some(request),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: &'a DataStore) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_global_vars(mut self, vars: &'a GlobalVariables) -> Self {
        self.global_vars = Some(vars);
        self
    }
}

/// Per-server template engine. Holds the faker rng so seeded servers render
/// reproducible fake data.
pub struct TemplateEngine {
    rng: Mutex<StdRng>,
    locale: FakerLocale,
    env_vars_prefix: String,
}

impl TemplateEngine {
    pub fn new(faker: &FakerOptions, env_vars_prefix: &str) -> Self {
        let rng = match faker.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
            locale: faker.locale,
            env_vars_prefix: env_vars_prefix.to_string(),
        }
    }

    /// Render a template. Text without `{{` is returned unchanged.
    pub fn render(&self, template: &str, ctx: &RenderContext<'_>) -> Result<String, TemplateError> {
        if !has_expressions(template) {
            return Ok(template.to_string());
        }
        let nodes = parser::parse(template)?;
        let mut rng = self.rng.lock();
        let mut renderer = helpers::Renderer::new(self, ctx, &mut *rng);
        renderer.render(&nodes)
    }

    pub fn locale(&self) -> FakerLocale {
        self.locale
    }

    /// Read a prefixed process environment variable. The prefix is added
    /// when `name` does not already carry it.
    pub(crate) fn env_var(&self, name: &str) -> Option<String> {
        if name.is_empty() {
            return None;
        }
        let full_name = if name.starts_with(&self.env_vars_prefix) {
            name.to_string()
        } else {
            format!("{}{}", self.env_vars_prefix, name)
        };
        std::env::var(full_name).ok()
    }
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("locale", &self.locale)
            .field("env_vars_prefix", &self.env_vars_prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::DataBucket;
    use bytes::Bytes;
    use hyper::header::{HeaderName, HeaderValue};
    use hyper::HeaderMap;
    use serde_json::json;
    use serial_test::serial;

    fn engine() -> TemplateEngine {
        TemplateEngine::new(
            &FakerOptions {
                locale: FakerLocale::En,
                seed: Some(42),
            },
            "MOCKOON_",
        )
    }

    fn create_request(path: &str, query: Option<&str>, body: &str) -> RequestData {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/json"),
        );
        headers.insert(HeaderName::from_static("host"), HeaderValue::from_static("localhost:3000"));
        headers.insert(HeaderName::from_static("x-trace"), HeaderValue::from_static("abc"));
        RequestData::new(
            "GET",
            path,
            query,
            headers,
            Bytes::from(body.to_string()),
            Some("127.0.0.1:40000".parse().unwrap()),
        )
    }

    fn render_with(template: &str, request: &RequestData) -> String {
        engine()
            .render(template, &RenderContext::for_request(request))
            .unwrap()
    }

    #[test]
    fn test_plain_text_passthrough() {
        let result = engine().render("no tags here", &RenderContext::empty()).unwrap();
        assert_eq!(result, "no tags here");
    }

    #[test]
    fn test_render_non_ascii_template() {
        let request = create_request("/café", None, "");
        assert_eq!(render_with("Café {{method}} ☕", &request), "Café GET ☕");
        let _ = engine().render("{{ café }}", &RenderContext::for_request(&request));
        let _ = engine().render("Prix: {{ 5 € }}", &RenderContext::for_request(&request));
    }

    #[test]
    fn test_url_param() {
        let mut request = create_request("/users/42", None, "");
        request.path_params.insert("id".to_string(), "42".to_string());
        assert_eq!(render_with("{{urlParam 'id'}}", &request), "42");
        assert_eq!(render_with("[{{urlParam 'missing'}}]", &request), "[]");
    }

    #[test]
    fn test_request_helpers() {
        let request = create_request("/a", Some("name=John&tags=a&tags=b"), r#"{"user":{"id":7}}"#);
        assert_eq!(render_with("{{queryParam 'name'}}", &request), "John");
        assert_eq!(render_with("{{queryParam 'tags'}}", &request), "a,b");
        assert_eq!(render_with("{{queryParam 'nope' 'dflt'}}", &request), "dflt");
        assert_eq!(render_with("{{body 'user.id'}}", &request), "7");
        assert_eq!(render_with("{{body 'user.name' 'anon'}}", &request), "anon");
        assert_eq!(render_with("{{body}}", &request), r#"{"user":{"id":7}}"#);
        assert_eq!(render_with("{{header 'X-Trace'}}", &request), "abc");
        assert_eq!(render_with("{{hostname}} {{ip}} {{method}}", &request), "localhost 127.0.0.1 GET");
    }

    #[test]
    fn test_body_helper_with_invalid_json_uses_default() {
        let request = create_request("/a", None, "{broken");
        assert_eq!(render_with("{{body 'a' 'fallback'}}", &request), "fallback");
    }

    #[test]
    fn test_switch_case_default() {
        let request = create_request("/a", Some("type=b"), "");
        let template = "{{#switch (queryParam 'type')}}{{#case 'a'}}A{{/case}}{{#case 'b'}}B{{/case}}{{#case 'b'}}B2{{/case}}{{#default}}D{{/default}}{{/switch}}";
        assert_eq!(render_with(template, &request), "B");

        let request = create_request("/a", Some("type=z"), "");
        assert_eq!(render_with(template, &request), "D");
    }

    #[test]
    fn test_nested_and_sequential_switches_are_independent() {
        let request = create_request("/a", Some("x=1&y=2"), "");
        let template = concat!(
            "{{#switch (queryParam 'x')}}",
            "{{#case '1'}}[{{#switch (queryParam 'y')}}{{#case '9'}}no{{/case}}{{#default}}inner{{/default}}{{/switch}}]{{/case}}",
            "{{#default}}outer{{/default}}",
            "{{/switch}}",
            "{{#switch 'q'}}{{#default}}second{{/default}}{{/switch}}"
        );
        assert_eq!(render_with(template, &request), "[inner]second");
    }

    #[test]
    fn test_case_with_multiple_values() {
        let request = create_request("/a", Some("t=2"), "");
        let template = "{{#switch (queryParam 't')}}{{#case '1' '2'}}hit{{/case}}{{/switch}}";
        assert_eq!(render_with(template, &request), "hit");
    }

    #[test]
    fn test_if_else_and_each() {
        let request = create_request("/a", Some("show=1"), r#"{"items":["x","y"]}"#);
        assert_eq!(
            render_with("{{#if (queryParam 'show')}}yes{{else}}no{{/if}}", &request),
            "yes"
        );
        assert_eq!(
            render_with("{{#unless (queryParam 'show')}}yes{{else}}no{{/unless}}", &request),
            "no"
        );
        assert_eq!(
            render_with("{{#each (body 'items')}}{{@index}}={{this}};{{/each}}", &request),
            "0=x;1=y;"
        );
        assert_eq!(
            render_with("{{#each (body 'none')}}x{{else}}empty{{/each}}", &request),
            "empty"
        );
    }

    #[test]
    fn test_repeat() {
        let result = engine()
            .render("[{{#repeat 3}}\"{{@index}}\"{{/repeat}}]", &RenderContext::empty())
            .unwrap();
        assert_eq!(result, r#"["0","1","2"]"#);

        let result = engine()
            .render("{{#repeat 2 comma=false}}a{{/repeat}}", &RenderContext::empty())
            .unwrap();
        assert_eq!(result, "aa");
    }

    #[test]
    fn test_comparison_and_arithmetic() {
        let ctx = RenderContext::empty();
        let engine = engine();
        assert_eq!(engine.render("{{eq 1 '1'}}", &ctx).unwrap(), "true");
        assert_eq!(engine.render("{{gt 3 2}} {{lt 3 2}}", &ctx).unwrap(), "true false");
        assert_eq!(engine.render("{{add 1 2 3}} {{subtract 10 2.5}}", &ctx).unwrap(), "6 7.5");
        assert_eq!(
            engine.render("{{concat 'a' 1 true}} {{uppercase 'ab'}} {{lowercase 'CD'}}", &ctx).unwrap(),
            "a1true AB cd"
        );
        assert_eq!(engine.render("{{len (array 1 2 3)}} {{len 'abcd'}}", &ctx).unwrap(), "3 4");
    }

    #[test]
    fn test_one_of_and_some_of() {
        let engine = engine();
        let ctx = RenderContext::empty();
        let one = engine.render("{{oneOf (array 'a' 'b' 'c')}}", &ctx).unwrap();
        assert!(["a", "b", "c"].contains(&one.as_str()));

        let some = engine.render("{{someOf (array 'a' 'b' 'c') 1 2}}", &ctx).unwrap();
        let parts: Vec<&str> = some.split(',').collect();
        assert!((1..=2).contains(&parts.len()));

        let as_array = engine
            .render("{{stringify (someOf (array 1 2 3) 3 3 true)}}", &ctx)
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&as_array).unwrap();
        assert_eq!(parsed.as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn test_unknown_helper_renders_empty() {
        let result = engine()
            .render("a{{notAHelper 1 2}}b", &RenderContext::empty())
            .unwrap();
        assert_eq!(result, "ab");
    }

    #[test]
    fn test_parse_error() {
        let result = engine().render("{{#if true}}unclosed", &RenderContext::empty());
        assert!(matches!(result, Err(TemplateError::Parse(_))));
    }

    #[test]
    fn test_local_vars() {
        let result = engine()
            .render("{{setVar 'n' 5}}{{getVar 'n'}}-{{@n}}", &RenderContext::empty())
            .unwrap();
        assert_eq!(result, "5-5");
    }

    #[test]
    fn test_global_vars_and_data() {
        let engine = engine();
        let vars = GlobalVariables::new();
        let store = DataStore::new(&[DataBucket {
            uuid: "b1".to_string(),
            id: "users".to_string(),
            name: "Users".to_string(),
            documentation: String::new(),
            value: json!([{"id": 1, "name": "Ada"}]).to_string(),
        }]);
        store.seed(&engine);
        let ctx = RenderContext::empty().with_data(&store).with_global_vars(&vars);

        engine.render("{{setGlobalVar 'token' 'abc'}}", &ctx).unwrap();
        assert_eq!(engine.render("{{getGlobalVar 'token'}}", &ctx).unwrap(), "abc");
        assert_eq!(engine.render("{{data 'users' '0.name'}}", &ctx).unwrap(), "Ada");
        assert_eq!(engine.render("{{data 'Users' '$[0].id'}}", &ctx).unwrap(), "1");
    }

    #[test]
    #[serial]
    fn test_env_var_requires_prefix() {
        std::env::set_var("MOCKOON_TEMPLATE_TEST", "visible");
        std::env::set_var("TEMPLATE_TEST_UNPREFIXED", "hidden");
        let ctx = RenderContext::empty();
        let engine = engine();
        assert_eq!(engine.render("{{getEnvVar 'TEMPLATE_TEST'}}", &ctx).unwrap(), "visible");
        assert_eq!(
            engine.render("{{getEnvVar 'MOCKOON_TEMPLATE_TEST'}}", &ctx).unwrap(),
            "visible"
        );
        assert_eq!(
            engine
                .render("{{getEnvVar 'TEMPLATE_TEST_UNPREFIXED' 'none'}}", &ctx)
                .unwrap(),
            "none"
        );
        std::env::remove_var("MOCKOON_TEMPLATE_TEST");
        std::env::remove_var("TEMPLATE_TEST_UNPREFIXED");
    }

    #[test]
    fn test_seeded_faker_is_reproducible() {
        let template = "{{faker 'person.firstName'}} {{faker 'number.int' 1 100}} {{int 5 5}}";
        let a = engine().render(template, &RenderContext::empty()).unwrap();
        let b = engine().render(template, &RenderContext::empty()).unwrap();
        assert_eq!(a, b);
        assert!(a.ends_with(" 5"));
    }

    #[test]
    fn test_now_format() {
        let ctx = RenderContext::empty();
        let year = engine().render("{{now '%Y'}}", &ctx).unwrap();
        assert_eq!(year.len(), 4);
        assert!(year.chars().all(|c| c.is_ascii_digit()));
    }
}
