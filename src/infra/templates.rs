//! Placeholder template engine used for page and sitemap templates.
//!
//! The syntax is deliberately small:
//!
//! - `{{ a.b }}` inserts a value, HTML-escaped when compiled as a page template.
//! - `{{{ a.b }}}` inserts a value verbatim.
//! - `{{#each list}}…{{/each}}` repeats its body per item; `this` names the item and
//!   unqualified names are looked up in the item first, then in enclosing scopes.
//! - `{{#if x}}…{{else}}…{{/if}}` branches on truthiness.
//! - `{{#with x}}…{{else}}…{{/with}}` branches like `#if` and makes `x` the innermost scope.
//! - `{{! … }}` is a comment.
//!
//! Wherever a value is expected, a helper call may stand instead: `helper arg…` at the top
//! of a tag, or `(helper arg…)` nested. Arguments are values, `"string"` literals or
//! nested calls.
//!
//! - `dir "/blog/"` lists a folder: every entry except index and error pages, each with
//!   `filename`, `is_dir` and `front_matter`.
//! - `sortbyname list` and `sortbytime list` order a listing by file name or by
//!   `front_matter.date`, ascending; `reverse list` flips it.
//! - `prev list name` and `next list name` return the entry after or before the one
//!   named `name`, so with a newest-first list `prev` is the older page.
//!
//! Missing values render as nothing. Arrays render as their scalar items joined by `, `.

use std::{
    borrow::Cow,
    cmp::Ordering,
    collections::{BTreeSet, HashMap},
    iter::Peekable,
    mem,
    sync::Arc,
    vec,
};

use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    application::render::{
        FOLDERS_KEY, TemplateCompiler, TemplateEngine, TemplateError, TemplateSource,
    },
    domain::{
        front_matter::{DEFAULT_TEMPLATE, IMAGE_TEMPLATE},
        path,
    },
};

const BUILTIN_DEFAULT: &str = include_str!("templates/default.html");
const BUILTIN_IMAGE: &str = include_str!("templates/image.html");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    Html,
    Text,
}

/// A dotted lookup such as `front_matter.title`, `this` or `this.name`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Lookup {
    /// Anchored at the innermost scope (`this…`) instead of searching outwards.
    anchored: bool,
    segments: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Helper {
    Dir,
    SortByName,
    SortByTime,
    Reverse,
    Prev,
    Next,
}

impl Helper {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "dir" => Some(Self::Dir),
            "sortbyname" => Some(Self::SortByName),
            "sortbytime" => Some(Self::SortByTime),
            "reverse" => Some(Self::Reverse),
            "prev" => Some(Self::Prev),
            "next" => Some(Self::Next),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Dir => "dir",
            Self::SortByName => "sortbyname",
            Self::SortByTime => "sortbytime",
            Self::Reverse => "reverse",
            Self::Prev => "prev",
            Self::Next => "next",
        }
    }

    fn arity(self) -> usize {
        match self {
            Self::Dir | Self::SortByName | Self::SortByTime | Self::Reverse => 1,
            Self::Prev | Self::Next => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Lookup(Lookup),
    Literal(String),
    Call { helper: Helper, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Text(String),
    Value { expr: Expr, raw: bool },
    Each { expr: Expr, body: Vec<Node> },
    If {
        expr: Expr,
        then: Vec<Node>,
        otherwise: Vec<Node>,
        /// `#with`: the value becomes the innermost scope of `then`.
        scoped: bool,
    },
}

/// A compiled set of named templates sharing one escaping mode.
#[derive(Debug)]
pub struct TemplateSet {
    templates: HashMap<String, Vec<Node>>,
    escape: Escape,
}

impl TemplateEngine for TemplateSet {
    fn execute(&self, name: &str, data: &Value) -> Result<String, TemplateError> {
        let nodes = self
            .templates
            .get(name)
            .ok_or_else(|| TemplateError::unknown(name))?;
        let mut out = String::new();
        render_nodes(nodes, &[data], self.escape, &mut out);
        Ok(out)
    }

    fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Folders named by `dir` calls whose argument resolves against the top-level data.
    /// Arguments that depend on an `#each` item are not known up front and list nothing.
    fn folder_references(&self, name: &str, data: &Value) -> Vec<String> {
        let Some(nodes) = self.templates.get(name) else {
            return Vec::new();
        };
        let mut arguments = Vec::new();
        collect_dir_arguments(nodes, &mut arguments);

        let folders: BTreeSet<String> = arguments
            .into_iter()
            .filter_map(|argument| {
                let value = eval(&[data], argument)?;
                path::folder_from_url(value.as_str()?)
            })
            .collect();
        folders.into_iter().collect()
    }
}

/// Compiles placeholder templates. Page sets always contain the built-in `default` and
/// `image` templates unless the site overrides them.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderCompiler;

impl PlaceholderCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateCompiler for PlaceholderCompiler {
    fn compile_pages(
        &self,
        sources: &[TemplateSource],
    ) -> Result<Arc<dyn TemplateEngine>, TemplateError> {
        let mut templates = HashMap::with_capacity(sources.len() + 2);
        templates.insert(
            DEFAULT_TEMPLATE.to_string(),
            parse(DEFAULT_TEMPLATE, BUILTIN_DEFAULT)?,
        );
        templates.insert(
            IMAGE_TEMPLATE.to_string(),
            parse(IMAGE_TEMPLATE, BUILTIN_IMAGE)?,
        );
        for source in sources {
            templates.insert(source.name.clone(), parse(&source.name, &source.body)?);
        }

        Ok(Arc::new(TemplateSet {
            templates,
            escape: Escape::Html,
        }))
    }

    fn compile_text(
        &self,
        source: &TemplateSource,
    ) -> Result<Arc<dyn TemplateEngine>, TemplateError> {
        let templates = HashMap::from([(source.name.clone(), parse(&source.name, &source.body)?)]);
        Ok(Arc::new(TemplateSet {
            templates,
            escape: Escape::Text,
        }))
    }
}

enum BlockKind {
    Root,
    Each(Expr),
    If {
        expr: Expr,
        then: Option<Vec<Node>>,
        scoped: bool,
    },
}

struct Block {
    kind: BlockKind,
    nodes: Vec<Node>,
}

fn parse(name: &str, source: &str) -> Result<Vec<Node>, TemplateError> {
    let mut stack = vec![Block {
        kind: BlockKind::Root,
        nodes: Vec::new(),
    }];
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        push_text(&mut stack, &rest[..start]);
        let tail = &rest[start..];

        if let Some(inner) = tail.strip_prefix("{{{") {
            let end = inner
                .find("}}}")
                .ok_or_else(|| TemplateError::parse(name, "unclosed `{{{`"))?;
            let expr = parse_expr(name, inner[..end].trim())?;
            push_node(&mut stack, Node::Value { expr, raw: true });
            rest = &inner[end + 3..];
            continue;
        }

        let inner = &tail[2..];
        let end = inner
            .find("}}")
            .ok_or_else(|| TemplateError::parse(name, "unclosed `{{`"))?;
        let tag = inner[..end].trim();
        rest = &inner[end + 2..];

        if tag.starts_with('!') {
            continue;
        }
        if let Some(directive) = tag.strip_prefix('#') {
            let (keyword, argument) = directive
                .split_once(char::is_whitespace)
                .map(|(keyword, argument)| (keyword, argument.trim()))
                .unwrap_or((directive, ""));
            let expr = parse_expr(name, argument)?;
            let kind = match keyword {
                "each" => BlockKind::Each(expr),
                "if" | "with" => BlockKind::If {
                    expr,
                    then: None,
                    scoped: keyword == "with",
                },
                other => {
                    return Err(TemplateError::parse(
                        name,
                        format!("unknown block `#{other}`"),
                    ));
                }
            };
            stack.push(Block {
                kind,
                nodes: Vec::new(),
            });
            continue;
        }
        if tag == "else" {
            let Some(Block {
                kind: BlockKind::If { then, .. },
                nodes,
            }) = stack.last_mut()
            else {
                return Err(TemplateError::parse(name, "`else` outside of `#if` or `#with`"));
            };
            if then.is_some() {
                return Err(TemplateError::parse(name, "duplicate `else`"));
            }
            *then = Some(mem::take(nodes));
            continue;
        }
        if let Some(closing) = tag.strip_prefix('/') {
            close_block(name, &mut stack, closing.trim())?;
            continue;
        }

        let expr = parse_expr(name, tag)?;
        push_node(&mut stack, Node::Value { expr, raw: false });
    }
    push_text(&mut stack, rest);

    match stack.pop() {
        Some(Block {
            kind: BlockKind::Root,
            nodes,
        }) if stack.is_empty() => Ok(nodes),
        _ => Err(TemplateError::parse(name, "unclosed block at end of template")),
    }
}

fn close_block(name: &str, stack: &mut Vec<Block>, closing: &str) -> Result<(), TemplateError> {
    let block = match stack.pop() {
        Some(block) if !matches!(block.kind, BlockKind::Root) => block,
        _ => {
            return Err(TemplateError::parse(
                name,
                format!("`/{closing}` without an open block"),
            ));
        }
    };

    let node = match (block.kind, closing) {
        (BlockKind::Each(expr), "each") => Node::Each {
            expr,
            body: block.nodes,
        },
        (BlockKind::If { expr, then, scoped }, closing)
            if closing == conditional_keyword(scoped) =>
        {
            let (then, otherwise) = match then {
                Some(then) => (then, block.nodes),
                None => (block.nodes, Vec::new()),
            };
            Node::If {
                expr,
                then,
                otherwise,
                scoped,
            }
        }
        _ => {
            return Err(TemplateError::parse(
                name,
                format!("mismatched `/{closing}`"),
            ));
        }
    };
    push_node(stack, node);
    Ok(())
}

fn conditional_keyword(scoped: bool) -> &'static str {
    if scoped { "with" } else { "if" }
}

fn push_text(stack: &mut [Block], text: &str) {
    if !text.is_empty() {
        push_node(stack, Node::Text(text.to_string()));
    }
}

fn push_node(stack: &mut [Block], node: Node) {
    if let Some(block) = stack.last_mut() {
        block.nodes.push(node);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'s> {
    Open,
    Close,
    Literal(&'s str),
    Word(&'s str),
}

type Tokens<'s> = Peekable<vec::IntoIter<Token<'s>>>;

fn tokenize<'s>(name: &str, text: &'s str) -> Result<Vec<Token<'s>>, TemplateError> {
    let mut tokens = Vec::new();
    let mut rest = text.trim_start();
    while let Some(ch) = rest.chars().next() {
        match ch {
            '(' => {
                tokens.push(Token::Open);
                rest = &rest[1..];
            }
            ')' => {
                tokens.push(Token::Close);
                rest = &rest[1..];
            }
            '"' => {
                let end = rest[1..]
                    .find('"')
                    .ok_or_else(|| TemplateError::parse(name, "unclosed string literal"))?;
                tokens.push(Token::Literal(&rest[1..=end]));
                rest = &rest[end + 2..];
            }
            _ => {
                let end = rest
                    .find(|ch: char| ch.is_whitespace() || matches!(ch, '(' | ')' | '"'))
                    .unwrap_or(rest.len());
                tokens.push(Token::Word(&rest[..end]));
                rest = &rest[end..];
            }
        }
        rest = rest.trim_start();
    }
    Ok(tokens)
}

fn parse_expr(name: &str, text: &str) -> Result<Expr, TemplateError> {
    let mut tokens = tokenize(name, text)?.into_iter().peekable();
    let expr = parse_call(name, &mut tokens)?;
    if tokens.next().is_some() {
        return Err(TemplateError::parse(
            name,
            format!("unexpected input in `{text}`"),
        ));
    }
    Ok(expr)
}

/// A helper call with its arguments, or a single term.
fn parse_call(name: &str, tokens: &mut Tokens<'_>) -> Result<Expr, TemplateError> {
    let helper = match tokens.peek() {
        Some(Token::Word(word)) => Helper::from_name(word),
        _ => None,
    };
    let Some(helper) = helper else {
        return parse_term(name, tokens);
    };
    tokens.next();

    let mut args = Vec::new();
    while tokens.peek().is_some_and(|token| *token != Token::Close) {
        args.push(parse_term(name, tokens)?);
    }
    if args.len() != helper.arity() {
        return Err(TemplateError::parse(
            name,
            format!(
                "`{}` takes {} argument(s), got {}",
                helper.name(),
                helper.arity(),
                args.len()
            ),
        ));
    }
    Ok(Expr::Call { helper, args })
}

fn parse_term(name: &str, tokens: &mut Tokens<'_>) -> Result<Expr, TemplateError> {
    match tokens.next() {
        Some(Token::Word(word)) => Ok(Expr::Lookup(parse_lookup(name, word)?)),
        Some(Token::Literal(text)) => Ok(Expr::Literal(text.to_string())),
        Some(Token::Open) => {
            let expr = parse_call(name, tokens)?;
            match tokens.next() {
                Some(Token::Close) => Ok(expr),
                _ => Err(TemplateError::parse(name, "unclosed `(`")),
            }
        }
        Some(Token::Close) => Err(TemplateError::parse(name, "unexpected `)`")),
        None => Err(TemplateError::parse(name, "missing value name")),
    }
}

fn parse_lookup(name: &str, expression: &str) -> Result<Lookup, TemplateError> {
    let mut segments = expression.split('.');
    let anchored = expression == "this" || expression.starts_with("this.");
    if anchored {
        segments.next();
    }

    let segments = segments
        .map(|segment| {
            let valid = !segment.is_empty()
                && segment
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
            if valid {
                Ok(segment.to_string())
            } else {
                Err(TemplateError::parse(
                    name,
                    format!("invalid value name `{expression}`"),
                ))
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Lookup { anchored, segments })
}

fn collect_dir_arguments<'n>(nodes: &'n [Node], out: &mut Vec<&'n Expr>) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Value { expr, .. } => collect_expr(expr, out),
            Node::Each { expr, body } => {
                collect_expr(expr, out);
                collect_dir_arguments(body, out);
            }
            Node::If {
                expr,
                then,
                otherwise,
                ..
            } => {
                collect_expr(expr, out);
                collect_dir_arguments(then, out);
                collect_dir_arguments(otherwise, out);
            }
        }
    }
}

fn collect_expr<'n>(expr: &'n Expr, out: &mut Vec<&'n Expr>) {
    if let Expr::Call { helper, args } = expr {
        if *helper == Helper::Dir {
            out.extend(args.first());
        }
        for arg in args {
            collect_expr(arg, out);
        }
    }
}

fn render_nodes(nodes: &[Node], scopes: &[&Value], escape: Escape, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Value { expr, raw } => {
                let Some(value) = eval(scopes, expr) else {
                    continue;
                };
                if let Some(text) = display(&value) {
                    if *raw || escape == Escape::Text {
                        out.push_str(&text);
                    } else {
                        out.push_str(&ammonia::clean_text(&text));
                    }
                }
            }
            Node::Each { expr, body } => {
                let Some(list) = eval(scopes, expr) else {
                    continue;
                };
                if let Value::Array(items) = list.as_ref() {
                    for item in items {
                        let mut inner: Vec<&Value> = scopes.to_vec();
                        inner.push(item);
                        render_nodes(body, &inner, escape, out);
                    }
                }
            }
            Node::If {
                expr,
                then,
                otherwise,
                scoped,
            } => match eval(scopes, expr).filter(|value| is_truthy(value)) {
                Some(value) if *scoped => {
                    let mut inner: Vec<&Value> = scopes.to_vec();
                    inner.push(value.as_ref());
                    render_nodes(then, &inner, escape, out);
                }
                Some(_) => render_nodes(then, scopes, escape, out),
                None => render_nodes(otherwise, scopes, escape, out),
            },
        }
    }
}

fn eval<'v>(scopes: &[&'v Value], expr: &Expr) -> Option<Cow<'v, Value>> {
    match expr {
        Expr::Lookup(lookup) => resolve(scopes, lookup).map(Cow::Borrowed),
        Expr::Literal(text) => Some(Cow::Owned(Value::String(text.clone()))),
        Expr::Call { helper, args } => call(scopes, *helper, args),
    }
}

fn call<'v>(scopes: &[&'v Value], helper: Helper, args: &[Expr]) -> Option<Cow<'v, Value>> {
    let first = eval(scopes, args.first()?)?;
    match helper {
        Helper::Dir => {
            let folder = path::folder_from_url(first.as_str()?)?;
            let listings = child(scopes.first().copied()?, FOLDERS_KEY)?;
            child(listings, &folder).map(Cow::Borrowed)
        }
        Helper::SortByName => sorted(first, |a, b| filename(a).cmp(filename(b))),
        Helper::SortByTime => sorted(first, |a, b| date(a).cmp(&date(b))),
        Helper::Reverse => {
            let mut items = first.as_array()?.clone();
            items.reverse();
            Some(Cow::Owned(Value::Array(items)))
        }
        Helper::Prev | Helper::Next => {
            let current = eval(scopes, args.get(1)?)?;
            let current = current.as_str()?;
            let items = first.as_array()?;
            let idx = items.iter().position(|item| filename(item) == current)?;
            let neighbour = match helper {
                Helper::Prev => items.get(idx + 1),
                _ => idx.checked_sub(1).and_then(|idx| items.get(idx)),
            };
            neighbour.cloned().map(Cow::Owned)
        }
    }
}

fn sorted<'v>(
    list: Cow<'v, Value>,
    compare: impl Fn(&Value, &Value) -> Ordering,
) -> Option<Cow<'v, Value>> {
    let mut items = list.as_array()?.clone();
    items.sort_by(compare);
    Some(Cow::Owned(Value::Array(items)))
}

fn filename(item: &Value) -> &str {
    item.get("filename").and_then(Value::as_str).unwrap_or_default()
}

/// Page date of a listing entry. Entries without a readable date sort first.
fn date(item: &Value) -> Option<OffsetDateTime> {
    let text = item.get("front_matter")?.get("date")?.as_str()?;
    OffsetDateTime::parse(text, &Rfc3339).ok()
}

fn resolve<'v>(scopes: &[&'v Value], lookup: &Lookup) -> Option<&'v Value> {
    let (base, rest) = if lookup.anchored {
        (scopes.last().copied()?, lookup.segments.as_slice())
    } else {
        let (first, rest) = lookup.segments.split_first()?;
        let base = scopes
            .iter()
            .rev()
            .find_map(|scope| child(scope, first))?;
        (base, rest)
    };
    rest.iter().try_fold(base, |value, segment| child(value, segment))
}

fn child<'v>(value: &'v Value, segment: &str) -> Option<&'v Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    }
}

fn display(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null | Value::Object(_) => None,
        Value::String(text) => Some(Cow::Borrowed(text)),
        Value::Bool(flag) => Some(Cow::Owned(flag.to_string())),
        Value::Number(number) => Some(Cow::Owned(number.to_string())),
        Value::Array(items) => {
            let parts: Vec<Cow<'_, str>> = items
                .iter()
                .filter(|item| !item.is_array())
                .filter_map(display)
                .collect();
            Some(Cow::Owned(parts.join(", ")))
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
    }
}
