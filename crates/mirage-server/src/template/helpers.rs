//! Helper dispatch and AST evaluation.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt::Write;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;

use super::faker::{self, FakerArgs, FakerMethod};
use super::parser::{Expr, Node};
use super::{RenderContext, TemplateEngine, TemplateError};
use crate::request::lookup_path;

/// Every helper known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Helper {
    Body,
    UrlParam,
    QueryParam,
    Header,
    Hostname,
    Ip,
    Method,
    OneOf,
    SomeOf,
    Array,
    Switch,
    Case,
    Default,
    If,
    Unless,
    Each,
    Repeat,
    Eq,
    Gt,
    Lt,
    Add,
    Subtract,
    Concat,
    Lowercase,
    Uppercase,
    Len,
    Stringify,
    Now,
    Int,
    Float,
    Boolean,
    Uuid,
    Faker,
    Data,
    GetGlobalVar,
    SetGlobalVar,
    SetVar,
    GetVar,
    GetEnvVar,
    Unknown,
}

impl Helper {
    pub fn from_name(name: &str) -> Self {
        match name {
            "body" | "bodyRaw" => Helper::Body,
            "urlParam" => Helper::UrlParam,
            "queryParam" | "queryParamRaw" => Helper::QueryParam,
            "header" => Helper::Header,
            "hostname" => Helper::Hostname,
            "ip" => Helper::Ip,
            "method" => Helper::Method,
            "oneOf" => Helper::OneOf,
            "someOf" => Helper::SomeOf,
            "array" => Helper::Array,
            "switch" => Helper::Switch,
            "case" => Helper::Case,
            "default" => Helper::Default,
            "if" => Helper::If,
            "unless" => Helper::Unless,
            "each" => Helper::Each,
            "repeat" => Helper::Repeat,
            "eq" => Helper::Eq,
            "gt" => Helper::Gt,
            "lt" => Helper::Lt,
            "add" => Helper::Add,
            "subtract" => Helper::Subtract,
            "concat" => Helper::Concat,
            "lowercase" => Helper::Lowercase,
            "uppercase" => Helper::Uppercase,
            "len" => Helper::Len,
            "stringify" => Helper::Stringify,
            "now" => Helper::Now,
            "int" => Helper::Int,
            "float" => Helper::Float,
            "boolean" => Helper::Boolean,
            "guid" | "uuid" => Helper::Uuid,
            "faker" => Helper::Faker,
            "data" | "dataRaw" => Helper::Data,
            "getGlobalVar" => Helper::GetGlobalVar,
            "setGlobalVar" => Helper::SetGlobalVar,
            "setVar" => Helper::SetVar,
            "getVar" => Helper::GetVar,
            "getEnvVar" => Helper::GetEnvVar,
            _ => Helper::Unknown,
        }
    }
}

/// Render a value the way it appears in output text.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

/// State of one `switch` invocation, shared with its `case`/`default` blocks.
pub struct SwitchScope {
    value: String,
    matched: Cell<bool>,
}

#[derive(Clone, Copy, Default)]
struct Frame<'f> {
    this: Option<&'f Value>,
    index: Option<usize>,
    switch: Option<&'f SwitchScope>,
}

/// Evaluates one parsed template. Local variables (`setVar`) live for the
/// duration of a single render.
pub struct Renderer<'a> {
    engine: &'a TemplateEngine,
    ctx: &'a RenderContext<'a>,
    rng: &'a mut StdRng,
    local_vars: HashMap<String, Value>,
}

impl<'a> Renderer<'a> {
    pub fn new(engine: &'a TemplateEngine, ctx: &'a RenderContext<'a>, rng: &'a mut StdRng) -> Self {
        Self {
            engine,
            ctx,
            rng,
            local_vars: HashMap::new(),
        }
    }

    pub fn render(&mut self, nodes: &[Node]) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.render_nodes(nodes, Frame::default(), &mut out)?;
        Ok(out)
    }

    fn render_nodes(
        &mut self,
        nodes: &[Node],
        frame: Frame<'_>,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Expression(expr) => {
                    let value = self.eval(expr, frame)?;
                    out.push_str(&value_to_string(&value));
                }
                Node::Block {
                    name,
                    params,
                    hash,
                    body,
                    inverse,
                } => self.render_block(name, params, hash, body, inverse, frame, out)?,
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn render_block(
        &mut self,
        name: &str,
        params: &[Expr],
        hash: &[(String, Expr)],
        body: &[Node],
        inverse: &[Node],
        frame: Frame<'_>,
        out: &mut String,
    ) -> Result<(), TemplateError> {
        match Helper::from_name(name) {
            Helper::Switch => {
                let value = self.eval_param(params, 0, frame)?;
                let scope = SwitchScope {
                    value: value_to_string(&value),
                    matched: Cell::new(false),
                };
                let inner = Frame {
                    switch: Some(&scope),
                    ..frame
                };
                self.render_nodes(body, inner, out)
            }
            Helper::Case => {
                let Some(scope) = frame.switch else {
                    return Ok(());
                };
                if scope.matched.get() {
                    return Ok(());
                }
                let mut hit = false;
                for param in params {
                    if value_to_string(&self.eval(param, frame)?) == scope.value {
                        hit = true;
                        break;
                    }
                }
                if hit {
                    scope.matched.set(true);
                    self.render_nodes(body, frame, out)?;
                }
                Ok(())
            }
            Helper::Default => match frame.switch {
                Some(scope) if !scope.matched.get() => self.render_nodes(body, frame, out),
                _ => Ok(()),
            },
            Helper::If | Helper::Unless => {
                let mut condition = truthy(&self.eval_param(params, 0, frame)?);
                if Helper::from_name(name) == Helper::Unless {
                    condition = !condition;
                }
                let branch = if condition { body } else { inverse };
                self.render_nodes(branch, frame, out)
            }
            Helper::Each => {
                let list = self.eval_param(params, 0, frame)?;
                let items: Vec<&Value> = match &list {
                    Value::Array(items) => items.iter().collect(),
                    Value::Object(map) => map.values().collect(),
                    _ => Vec::new(),
                };
                if items.is_empty() {
                    return self.render_nodes(inverse, frame, out);
                }
                for (index, item) in items.into_iter().enumerate() {
                    let inner = Frame {
                        this: Some(item),
                        index: Some(index),
                        switch: frame.switch,
                    };
                    self.render_nodes(body, inner, out)?;
                }
                Ok(())
            }
            Helper::Repeat => {
                let min = as_number(&self.eval_param(params, 0, frame)?).unwrap_or(0.0);
                let count = match params.get(1) {
                    Some(expr) => {
                        let max = as_number(&self.eval(expr, frame)?).unwrap_or(min);
                        let (lo, hi) = (min.max(0.0) as u64, max.max(min).max(0.0) as u64);
                        self.rng.gen_range(lo..=hi)
                    }
                    None => min.max(0.0) as u64,
                };
                let mut comma = true;
                for (key, expr) in hash {
                    if key == "comma" {
                        comma = truthy(&self.eval(expr, frame)?);
                    }
                }
                for index in 0..count as usize {
                    if index > 0 && comma {
                        out.push(',');
                    }
                    let inner = Frame {
                        index: Some(index),
                        ..frame
                    };
                    self.render_nodes(body, inner, out)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn eval_param(
        &mut self,
        params: &[Expr],
        index: usize,
        frame: Frame<'_>,
    ) -> Result<Value, TemplateError> {
        match params.get(index) {
            Some(expr) => self.eval(expr, frame),
            None => Ok(Value::Null),
        }
    }

    fn eval(&mut self, expr: &Expr, frame: Frame<'_>) -> Result<Value, TemplateError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path(path) => Ok(self.lookup(path, frame)),
            Expr::Call { name, params, hash } => {
                let mut args = Vec::with_capacity(params.len());
                for param in params {
                    args.push(self.eval(param, frame)?);
                }
                let mut named = Vec::with_capacity(hash.len());
                for (key, value) in hash {
                    named.push((key.as_str(), self.eval(value, frame)?));
                }
                Ok(self.call(Helper::from_name(name), &args, &named))
            }
        }
    }

    fn lookup(&self, path: &str, frame: Frame<'_>) -> Value {
        if path == "this" {
            return frame.this.cloned().unwrap_or(Value::Null);
        }
        if let Some(rest) = path.strip_prefix("this.") {
            return frame
                .this
                .and_then(|this| lookup_path(this, rest))
                .unwrap_or(Value::Null);
        }
        if path == "@index" {
            return frame.index.map(Value::from).unwrap_or(Value::Null);
        }
        let name = path.strip_prefix('@').unwrap_or(path);
        self.local_vars.get(name).cloned().unwrap_or(Value::Null)
    }

    fn call(&mut self, helper: Helper, args: &[Value], hash: &[(&str, Value)]) -> Value {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Null);
        let arg_str = |i: usize| args.get(i).map(value_to_string).unwrap_or_default();
        let default_arg = |i: usize| args.get(i).cloned().unwrap_or(Value::String(String::new()));
        let request = self.ctx.request;

        match helper {
            Helper::Body => {
                let Some(request) = request else {
                    return default_arg(1);
                };
                let path = arg_str(0);
                if path.is_empty() {
                    return Value::String(request.body_str().into_owned());
                }
                serde_json::from_slice::<Value>(&request.body)
                    .ok()
                    .and_then(|body| lookup_path(&body, &path))
                    .unwrap_or_else(|| default_arg(1))
            }
            Helper::UrlParam => request
                .and_then(|r| r.path_params.get(&arg_str(0)).cloned())
                .map(Value::String)
                .unwrap_or_else(|| Value::String(String::new())),
            Helper::QueryParam => {
                let Some(request) = request else {
                    return default_arg(1);
                };
                lookup_path(&request.query, &arg_str(0)).unwrap_or_else(|| default_arg(1))
            }
            Helper::Header => request
                .and_then(|r| r.header(&arg_str(0)))
                .map(|v| Value::String(v.to_string()))
                .unwrap_or_else(|| default_arg(1)),
            Helper::Hostname => Value::String(request.map(|r| r.hostname()).unwrap_or_default()),
            Helper::Ip => Value::String(request.map(|r| r.ip()).unwrap_or_default()),
            Helper::Method => Value::String(request.map(|r| r.method.clone()).unwrap_or_default()),
            Helper::OneOf => match arg(0) {
                Value::Array(items) if !items.is_empty() => {
                    items[self.rng.gen_range(0..items.len())].clone()
                }
                _ => Value::Null,
            },
            Helper::SomeOf => {
                let Value::Array(mut items) = arg(0) else {
                    return Value::Null;
                };
                let min = as_number(&arg(1)).unwrap_or(1.0).max(0.0) as usize;
                let max = as_number(&arg(2)).map(|m| m as usize).unwrap_or(min).max(min);
                items.shuffle(&mut *self.rng);
                let count = self.rng.gen_range(min..=max).min(items.len());
                items.truncate(count);
                if truthy(&arg(3)) {
                    Value::Array(items)
                } else {
                    Value::String(
                        items
                            .iter()
                            .map(value_to_string)
                            .collect::<Vec<_>>()
                            .join(","),
                    )
                }
            }
            Helper::Array => Value::Array(args.to_vec()),
            Helper::Eq => {
                let (a, b) = (arg(0), arg(1));
                Value::Bool(a == b || value_to_string(&a) == value_to_string(&b))
            }
            Helper::Gt | Helper::Lt => match (as_number(&arg(0)), as_number(&arg(1))) {
                (Some(a), Some(b)) if helper == Helper::Gt => Value::Bool(a > b),
                (Some(a), Some(b)) => Value::Bool(a < b),
                _ => Value::Bool(false),
            },
            Helper::Add | Helper::Subtract => {
                let mut numbers = args.iter().filter_map(as_number);
                let Some(first) = numbers.next() else {
                    return Value::Null;
                };
                let total = numbers.fold(first, |acc, n| {
                    if helper == Helper::Add {
                        acc + n
                    } else {
                        acc - n
                    }
                });
                number_value(total)
            }
            Helper::Concat => Value::String(args.iter().map(value_to_string).collect()),
            Helper::Lowercase => Value::String(arg_str(0).to_lowercase()),
            Helper::Uppercase => Value::String(arg_str(0).to_uppercase()),
            Helper::Len => match arg(0) {
                Value::Array(items) => Value::from(items.len()),
                Value::Object(map) => Value::from(map.len()),
                other => Value::from(value_to_string(&other).chars().count()),
            },
            Helper::Stringify => {
                Value::String(serde_json::to_string_pretty(&arg(0)).unwrap_or_default())
            }
            Helper::Now => {
                let now = Utc::now();
                let format = arg_str(0);
                if format.is_empty() {
                    return Value::String(now.to_rfc3339());
                }
                let mut formatted = String::new();
                match write!(formatted, "{}", now.format(&format)) {
                    Ok(()) => Value::String(formatted),
                    Err(_) => Value::String(now.to_rfc3339()),
                }
            }
            Helper::Int | Helper::Float | Helper::Boolean | Helper::Uuid => {
                let method = match helper {
                    Helper::Int => FakerMethod::NumberInt,
                    Helper::Float => FakerMethod::NumberFloat,
                    Helper::Boolean => FakerMethod::DatatypeBoolean,
                    _ => FakerMethod::StringUuid,
                };
                let faker_args = FakerArgs {
                    min: as_number(&arg(0)),
                    max: as_number(&arg(1)),
                };
                faker::generate(method, faker_args, self.engine.locale(), &mut *self.rng)
            }
            Helper::Faker => {
                let method = FakerMethod::from_name(&arg_str(0));
                let mut faker_args = match (as_number(&arg(1)), as_number(&arg(2))) {
                    (Some(min), Some(max)) => FakerArgs {
                        min: Some(min),
                        max: Some(max),
                    },
                    (Some(max), None) => FakerArgs {
                        min: None,
                        max: Some(max),
                    },
                    _ => FakerArgs::default(),
                };
                for (key, value) in hash {
                    match *key {
                        "min" => faker_args.min = as_number(value),
                        "max" => faker_args.max = as_number(value),
                        _ => {}
                    }
                }
                faker::generate(method, faker_args, self.engine.locale(), &mut *self.rng)
            }
            Helper::Data => self
                .ctx
                .data
                .and_then(|store| store.get_value(&arg_str(0)))
                .and_then(|value| lookup_path(&value, &arg_str(1)))
                .unwrap_or(Value::Null),
            Helper::GetGlobalVar => self
                .ctx
                .global_vars
                .and_then(|vars| vars.get(&arg_str(0)))
                .and_then(|value| lookup_path(&value, &arg_str(1)))
                .unwrap_or(Value::Null),
            Helper::SetGlobalVar => {
                if let Some(vars) = self.ctx.global_vars {
                    vars.set(&arg_str(0), arg(1));
                }
                Value::Null
            }
            Helper::SetVar => {
                let name = arg_str(0);
                if !name.is_empty() {
                    self.local_vars.insert(name, arg(1));
                }
                Value::Null
            }
            Helper::GetVar => self
                .local_vars
                .get(&arg_str(0))
                .cloned()
                .unwrap_or(Value::Null),
            Helper::GetEnvVar => self
                .engine
                .env_var(&arg_str(0))
                .map(Value::String)
                .unwrap_or_else(|| default_arg(1)),
            Helper::Switch
            | Helper::Case
            | Helper::Default
            | Helper::If
            | Helper::Unless
            | Helper::Each
            | Helper::Repeat
            | Helper::Unknown => Value::Null,
        }
    }
}
