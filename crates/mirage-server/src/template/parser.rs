//! Template parser for the mustache-style helper syntax.
//!
//! Produces a small AST of text, inline expressions and block helpers.
//! Supported tags: `{{expr}}`, `{{{expr}}}`, `{{#helper ...}}`, `{{else}}`,
//! `{{/helper}}` and comments (`{{! ...}}`, `{{!-- ... --}}`).

use serde_json::{Number, Value};

use super::TemplateError;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Context lookup: `this`, `this.a.b`, `@index`, `@var`, or a bare word
    /// used as an argument.
    Path(String),
    Call {
        name: String,
        params: Vec<Expr>,
        hash: Vec<(String, Expr)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Expression(Expr),
    Block {
        name: String,
        params: Vec<Expr>,
        hash: Vec<(String, Expr)>,
        body: Vec<Node>,
        inverse: Vec<Node>,
    },
}

enum Tag {
    Open(String),
    Close(String),
    Else,
    Expression(String),
    Comment,
}

struct OpenBlock {
    name: String,
    params: Vec<Expr>,
    hash: Vec<(String, Expr)>,
    body: Vec<Node>,
    inverse: Vec<Node>,
    in_inverse: bool,
}

impl OpenBlock {
    fn push(&mut self, node: Node) {
        if self.in_inverse {
            self.inverse.push(node);
        } else {
            self.body.push(node);
        }
    }
}

/// Quick check used to skip parsing for plain strings.
pub fn has_expressions(template: &str) -> bool {
    template.contains("{{")
}

/// Parse a template into nodes.
pub fn parse(template: &str) -> Result<Vec<Node>, TemplateError> {
    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<OpenBlock> = Vec::new();
    let mut pos = 0;

    let push = |stack: &mut Vec<OpenBlock>, root: &mut Vec<Node>, node: Node| match stack.last_mut()
    {
        Some(block) => block.push(node),
        None => root.push(node),
    };

    while let Some(offset) = template[pos..].find("{{") {
        let start = pos + offset;
        if start > pos {
            push(
                &mut stack,
                &mut root,
                Node::Text(template[pos..start].to_string()),
            );
        }

        let (tag, end) = read_tag(template, start)?;
        pos = end;

        match tag {
            Tag::Comment => {}
            Tag::Expression(content) => {
                let expr = parse_expression(&content)?;
                push(&mut stack, &mut root, Node::Expression(expr));
            }
            Tag::Open(content) => {
                let (name, params, hash) = parse_call(&content)?;
                stack.push(OpenBlock {
                    name,
                    params,
                    hash,
                    body: Vec::new(),
                    inverse: Vec::new(),
                    in_inverse: false,
                });
            }
            Tag::Else => match stack.last_mut() {
                Some(block) => block.in_inverse = true,
                None => return Err(TemplateError::Parse("'else' outside of a block".into())),
            },
            Tag::Close(name) => {
                let block = stack.pop().ok_or_else(|| {
                    TemplateError::Parse(format!("unexpected closing tag '{name}'"))
                })?;
                if block.name != name {
                    return Err(TemplateError::Parse(format!(
                        "'{}' doesn't match '{}'",
                        name, block.name
                    )));
                }
                push(
                    &mut stack,
                    &mut root,
                    Node::Block {
                        name: block.name,
                        params: block.params,
                        hash: block.hash,
                        body: block.body,
                        inverse: block.inverse,
                    },
                );
            }
        }
    }

    if pos < template.len() {
        push(&mut stack, &mut root, Node::Text(template[pos..].to_string()));
    }

    if let Some(block) = stack.last() {
        return Err(TemplateError::Parse(format!(
            "unclosed block '{}'",
            block.name
        )));
    }

    Ok(root)
}

/// Read one tag starting at `start` (which points at `{{`).
fn read_tag(template: &str, start: usize) -> Result<(Tag, usize), TemplateError> {
    let rest = &template[start..];

    if rest.starts_with("{{!--") {
        let end = rest
            .find("--}}")
            .ok_or_else(|| TemplateError::Parse("unclosed comment".into()))?;
        return Ok((Tag::Comment, start + end + 4));
    }
    if rest.starts_with("{{!") {
        let end = rest
            .find("}}")
            .ok_or_else(|| TemplateError::Parse("unclosed comment".into()))?;
        return Ok((Tag::Comment, start + end + 2));
    }

    let (open_len, close) = if rest.starts_with("{{{") {
        (3, "}}}")
    } else {
        (2, "}}")
    };
    let content_start = start + open_len;
    let content_end = find_close(template, content_start, close).ok_or_else(|| {
        TemplateError::Parse(format!("unclosed expression at position {start}"))
    })?;

    let content = template[content_start..content_end]
        .trim()
        .trim_matches('~')
        .trim();
    let end = content_end + close.len();

    let tag = if let Some(open) = content.strip_prefix('#') {
        Tag::Open(open.trim().to_string())
    } else if let Some(name) = content.strip_prefix('/') {
        Tag::Close(name.trim().to_string())
    } else if content == "else" || content == "^" {
        Tag::Else
    } else {
        Tag::Expression(content.to_string())
    };
    Ok((tag, end))
}

/// Find the closing delimiter, skipping over quoted strings.
fn find_close(template: &str, from: usize, close: &str) -> Option<usize> {
    let bytes = template.as_bytes();
    let mut i = from;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'\'' || b == b'"' {
                    quote = Some(b);
                } else if bytes[i..].starts_with(close.as_bytes()) {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Word(String),
    Open,
    Close,
    Equals,
}

fn tokenize(content: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = content.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Equals);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    if ch == '\\' {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    } else if ch == quote {
                        closed = true;
                        break;
                    } else {
                        value.push(ch);
                    }
                }
                if !closed {
                    return Err(TemplateError::Parse(format!(
                        "unterminated string in '{content}'"
                    )));
                }
                tokens.push(Token::Str(value));
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || matches!(ch, '(' | ')' | '=' | '\'' | '"') {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

fn word_to_expr(word: &str) -> Expr {
    match word {
        "true" => return Expr::Literal(Value::Bool(true)),
        "false" => return Expr::Literal(Value::Bool(false)),
        "null" | "undefined" => return Expr::Literal(Value::Null),
        _ => {}
    }
    if let Ok(i) = word.parse::<i64>() {
        return Expr::Literal(Value::Number(i.into()));
    }
    if let Some(n) = word.parse::<f64>().ok().and_then(Number::from_f64) {
        return Expr::Literal(Value::Number(n));
    }
    Expr::Path(word.to_string())
}

struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    /// Parse arguments until `)` or end of input.
    fn arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), TemplateError> {
        let mut params = Vec::new();
        let mut hash = Vec::new();
        loop {
            match self.peek() {
                None | Some(Token::Close) => break,
                Some(Token::Word(key)) if self.peek_at(1) == Some(&Token::Equals) => {
                    let key = key.clone();
                    self.pos += 2;
                    let value = self.argument()?;
                    hash.push((key, value));
                }
                _ => params.push(self.argument()?),
            }
        }
        Ok((params, hash))
    }

    fn argument(&mut self) -> Result<Expr, TemplateError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Word(w)) => Ok(word_to_expr(&w)),
            Some(Token::Open) => {
                let name = match self.next() {
                    Some(Token::Word(w)) => w,
                    _ => return Err(TemplateError::Parse("expected helper name after '('".into())),
                };
                let (params, hash) = self.arguments()?;
                match self.next() {
                    Some(Token::Close) => Ok(Expr::Call { name, params, hash }),
                    _ => Err(TemplateError::Parse(format!(
                        "unclosed subexpression '{name}'"
                    ))),
                }
            }
            Some(Token::Close) => Err(TemplateError::Parse("unexpected ')'".into())),
            Some(Token::Equals) => Err(TemplateError::Parse("unexpected '='".into())),
            None => Err(TemplateError::Parse("unexpected end of expression".into())),
        }
    }
}

/// Parse `name arg1 (sub arg) key=value`.
fn parse_call(content: &str) -> Result<(String, Vec<Expr>, Vec<(String, Expr)>), TemplateError> {
    let mut stream = TokenStream {
        tokens: tokenize(content)?,
        pos: 0,
    };
    let name = match stream.next() {
        Some(Token::Word(w)) => w,
        _ => {
            return Err(TemplateError::Parse(format!(
                "expected helper name in '{content}'"
            )))
        }
    };
    let (params, hash) = stream.arguments()?;
    if stream.peek().is_some() {
        return Err(TemplateError::Parse(format!("unbalanced ')' in '{content}'")));
    }
    Ok((name, params, hash))
}

fn parse_expression(content: &str) -> Result<Expr, TemplateError> {
    let tokens = tokenize(content)?;
    match tokens.as_slice() {
        [] => Ok(Expr::Literal(Value::Null)),
        [Token::Str(s)] => Ok(Expr::Literal(Value::String(s.clone()))),
        [Token::Word(w)] => match word_to_expr(w) {
            Expr::Path(p) if !p.starts_with('@') && p != "this" && !p.contains('.') => {
                Ok(Expr::Call {
                    name: p,
                    params: Vec::new(),
                    hash: Vec::new(),
                })
            }
            other => Ok(other),
        },
        _ => {
            let (name, params, hash) = parse_call(content)?;
            Ok(Expr::Call { name, params, hash })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, params: Vec<Expr>) -> Expr {
        Expr::Call {
            name: name.to_string(),
            params,
            hash: Vec::new(),
        }
    }

    fn lit(s: &str) -> Expr {
        Expr::Literal(Value::String(s.to_string()))
    }

    #[test]
    fn test_parse_text_only() {
        let nodes = parse("plain {text}").unwrap();
        assert_eq!(nodes, vec![Node::Text("plain {text}".to_string())]);
    }

    #[test]
    fn test_parse_simple_call() {
        let nodes = parse("id={{urlParam 'id'}};").unwrap();
        assert_eq!(
            nodes,
            vec![
                Node::Text("id=".into()),
                Node::Expression(call("urlParam", vec![lit("id")])),
                Node::Text(";".into()),
            ]
        );
    }

    #[test]
    fn test_parse_non_ascii_text() {
        let nodes = parse("Prix: {{ 5 € }} ✓").unwrap();
        assert_eq!(nodes.first(), Some(&Node::Text("Prix: ".into())));
        assert_eq!(nodes.last(), Some(&Node::Text(" ✓".into())));

        assert!(parse("{{ café }}").is_ok());
        assert!(parse("{{queryParam 'q' ‘x’}}").is_ok());
        assert_eq!(
            parse("é{{urlParam 'nom'}}ü").unwrap(),
            vec![
                Node::Text("é".into()),
                Node::Expression(call("urlParam", vec![lit("nom")])),
                Node::Text("ü".into()),
            ]
        );
    }

    #[test]
    fn test_parse_bare_helper_and_paths() {
        assert_eq!(parse("{{method}}").unwrap(), vec![Node::Expression(call("method", vec![]))]);
        assert_eq!(
            parse("{{@index}}").unwrap(),
            vec![Node::Expression(Expr::Path("@index".into()))]
        );
        assert_eq!(
            parse("{{this.name}}").unwrap(),
            vec![Node::Expression(Expr::Path("this.name".into()))]
        );
    }

    #[test]
    fn test_parse_subexpression_and_literals() {
        let nodes = parse("{{oneOf (array 'a' 2 true null)}}").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Expression(call(
                "oneOf",
                vec![call(
                    "array",
                    vec![
                        lit("a"),
                        Expr::Literal(Value::Number(2.into())),
                        Expr::Literal(Value::Bool(true)),
                        Expr::Literal(Value::Null),
                    ]
                )]
            ))]
        );
    }

    #[test]
    fn test_parse_hash_arguments() {
        let nodes = parse("{{#repeat 2 comma=false}}x{{/repeat}}").unwrap();
        match &nodes[0] {
            Node::Block { name, params, hash, body, .. } => {
                assert_eq!(name, "repeat");
                assert_eq!(params.len(), 1);
                assert_eq!(hash[0].0, "comma");
                assert_eq!(hash[0].1, Expr::Literal(Value::Bool(false)));
                assert_eq!(body, &vec![Node::Text("x".into())]);
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_block_with_else() {
        let nodes = parse("{{#if (eq 1 1)}}yes{{else}}no{{/if}}").unwrap();
        match &nodes[0] {
            Node::Block { body, inverse, .. } => {
                assert_eq!(body, &vec![Node::Text("yes".into())]);
                assert_eq!(inverse, &vec![Node::Text("no".into())]);
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_triple_stash_and_comments() {
        let nodes = parse("{{!-- hidden }} --}}{{! short }}{{{body}}}").unwrap();
        assert_eq!(nodes, vec![Node::Expression(call("body", vec![]))]);
    }

    #[test]
    fn test_parse_closing_braces_inside_string() {
        let nodes = parse("{{concat '}}' 'x'}}").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Expression(call("concat", vec![lit("}}"), lit("x")]))]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("{{body 'a'").is_err());
        assert!(parse("{{#if x}}never closed").is_err());
        assert!(parse("{{#if x}}a{{/each}}").is_err());
        assert!(parse("{{/if}}").is_err());
        assert!(parse("{{body 'unterminated}}").is_err());
        assert!(parse("{{oneOf (array 1}}").is_err());
    }

    #[test]
    fn test_has_expressions() {
        assert!(has_expressions("a {{b}}"));
        assert!(!has_expressions(r#"{"a": {"b": 1}}"#));
    }
}
