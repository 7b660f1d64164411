//! Symbolic model expressions.
//!
//! A branch set's `uncertaintyModel` cell is a bracketed list of models, each
//! model an arithmetic expression over zone attribute names:
//!
//! ```text
//! ['mmax - stdmmax', 'mmax', 'mmax + stdmmax']
//! [-0.1, 0, 0.1]
//! [['a - stda', 'b + stdb'], ['a', 'b']]
//! ```
//!
//! Quote characters are insignificant and stripped before lexing. The cell is
//! parsed once into an AST; per zone, names the zone lacks are rewritten to
//! zero ([`ModelList::resolve`]) and the remaining names are bound to the
//! zone's values ([`ResolvedModels::evaluate`]).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::MODEL_DECIMALS;
use crate::error::{CollapseError, Result};
use crate::precision::round_decimals;
use crate::zone::{AttributeValue, Zone};

fn malformed(expression: &str, reason: impl Into<String>) -> CollapseError {
    CollapseError::MalformedModel {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

// --- Lexer ---

#[derive(Clone, Debug, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(v) => write!(f, "{v}"),
            TokenKind::Ident(name) => write!(f, "{name}"),
            TokenKind::LBracket => f.write_str("["),
            TokenKind::RBracket => f.write_str("]"),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
            TokenKind::Comma => f.write_str(","),
            TokenKind::Plus => f.write_str("+"),
            TokenKind::Minus => f.write_str("-"),
            TokenKind::Star => f.write_str("*"),
            TokenKind::Slash => f.write_str("/"),
        }
    }
}

/// A token with its byte span in the (quote-stripped) source.
#[derive(Clone, Debug, PartialEq)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

fn scan_number(text: &str, start: usize) -> usize {
    let bytes = text.as_bytes();
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp = end + 1;
        if exp < bytes.len() && matches!(bytes[exp], b'+' | b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            end = exp;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
        }
    }
    end
}

fn scan_ident(text: &str, start: usize) -> usize {
    text[start..]
        .char_indices()
        .find(|&(_, c)| !(c.is_alphanumeric() || c == '_'))
        .map_or(text.len(), |(i, _)| start + i)
}

fn lex(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(c) = text[pos..].chars().next() {
        let start = pos;
        if c.is_whitespace() {
            pos += c.len_utf8();
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            pos = scan_number(text, start);
            let literal = &text[start..pos];
            let value = literal
                .parse::<f64>()
                .map_err(|_| malformed(text, format!("invalid number `{literal}`")))?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                start,
                end: pos,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            pos = scan_ident(text, start);
            tokens.push(Token {
                kind: TokenKind::Ident(text[start..pos].to_string()),
                start,
                end: pos,
            });
            continue;
        }

        let kind = match c {
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            other => {
                return Err(malformed(
                    text,
                    format!("unexpected character `{other}` at offset {start}"),
                ));
            }
        };
        pos += 1;
        tokens.push(Token {
            kind,
            start,
            end: pos,
        });
    }

    Ok(tokens)
}

// --- AST ---

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// Parsed symbolic expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Attribute(String),
    List(Vec<Expr>),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// Result of evaluating an [`Expr`].
#[derive(Clone, Debug, PartialEq)]
enum Value {
    Number(f64),
    List(Vec<Value>),
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            _ => u8::MAX,
        }
    }

    fn collect_attributes(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Attribute(name) => {
                out.insert(name.clone());
            }
            Expr::List(items) => items.iter().for_each(|e| e.collect_attributes(out)),
            Expr::Neg(inner) => inner.collect_attributes(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_attributes(out);
                rhs.collect_attributes(out);
            }
        }
    }

    /// Copy of the expression with every attribute outside `available`
    /// replaced by the literal zero.
    fn zero_missing(&self, available: &BTreeSet<String>) -> Expr {
        match self {
            Expr::Attribute(name) if !available.contains(name) => Expr::Number(0.0),
            Expr::Number(_) | Expr::Attribute(_) => self.clone(),
            Expr::List(items) => Expr::List(items.iter().map(|e| e.zero_missing(available)).collect()),
            Expr::Neg(inner) => Expr::Neg(Box::new(inner.zero_missing(available))),
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op: *op,
                lhs: Box::new(lhs.zero_missing(available)),
                rhs: Box::new(rhs.zero_missing(available)),
            },
        }
    }

    /// Number of scalar elements, flattening lists.
    pub fn size(&self) -> usize {
        match self {
            Expr::List(items) => items.iter().map(Expr::size).sum(),
            _ => 1,
        }
    }

    fn evaluate(&self, source: &str, lookup: &dyn Fn(&str) -> Result<f64>) -> Result<Value> {
        match self {
            Expr::Number(v) => Ok(Value::Number(*v)),
            Expr::Attribute(name) => lookup(name).map(Value::Number),
            Expr::List(items) => items
                .iter()
                .map(|e| e.evaluate(source, lookup))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Expr::Neg(inner) => match inner.evaluate(source, lookup)? {
                Value::Number(v) => Ok(Value::Number(-v)),
                Value::List(_) => Err(malformed(source, "cannot negate a list")),
            },
            Expr::Binary { op, lhs, rhs } => {
                let (Value::Number(l), Value::Number(r)) =
                    (lhs.evaluate(source, lookup)?, rhs.evaluate(source, lookup)?)
                else {
                    return Err(malformed(
                        source,
                        format!("operator `{}` needs numbers on both sides", op.symbol()),
                    ));
                };
                match op {
                    BinaryOp::Add => Ok(Value::Number(l + r)),
                    BinaryOp::Sub => Ok(Value::Number(l - r)),
                    BinaryOp::Mul => Ok(Value::Number(l * r)),
                    BinaryOp::Div if r == 0.0 => Err(malformed(source, "division by zero")),
                    BinaryOp::Div => Ok(Value::Number(l / r)),
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{v}"),
            Expr::Attribute(name) => f.write_str(name),
            Expr::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Expr::Neg(inner) if inner.precedence() < u8::MAX => write!(f, "-({inner})"),
            Expr::Neg(inner) => write!(f, "-{inner}"),
            Expr::Binary { op, lhs, rhs } => {
                if lhs.precedence() < op.precedence() {
                    write!(f, "({lhs})")?;
                } else {
                    write!(f, "{lhs}")?;
                }
                write!(f, " {} ", op.symbol())?;
                if rhs.precedence() <= op.precedence() {
                    write!(f, "({rhs})")
                } else {
                    write!(f, "{rhs}")
                }
            }
        }
    }
}

// --- Parser ---

/// Recursive descent over the token stream:
///
/// ```text
/// expr    := term (('+' | '-') term)*
/// term    := unary (('*' | '/') unary)*
/// unary   := ('-' | '+') unary | primary
/// primary := NUMBER | IDENT | '(' expr ')' | '[' [expr (',' expr)* [',']] ']'
/// ```
struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, reason: impl Into<String>) -> CollapseError {
        malformed(self.source, reason)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        match self.bump() {
            Some(token) if token.kind == kind => Ok(()),
            Some(token) => Err(self.error(format!(
                "expected `{kind}` but found `{}` at offset {}",
                token.kind, token.start
            ))),
            None => Err(self.error(format!("expected `{kind}` but input ended"))),
        }
    }

    fn expect_end(&self) -> Result<()> {
        match self.tokens.get(self.pos) {
            None => Ok(()),
            Some(token) => Err(self.error(format!(
                "unexpected `{}` at offset {}",
                token.kind, token.start
            ))),
        }
    }

    /// Byte span covered by tokens `from..self.pos`.
    fn span_since(&self, from: usize) -> (usize, usize) {
        let start = self.tokens[from].start;
        let end = self.tokens[self.pos - 1].end;
        (start, end)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.parse_term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(TokenKind::Minus) => {
                self.bump();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(TokenKind::Plus) => {
                self.bump();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let Some(token) = self.bump() else {
            return Err(self.error("unexpected end of input"));
        };
        match token.kind {
            TokenKind::Number(v) => Ok(Expr::Number(v)),
            TokenKind::Ident(name) => Ok(Expr::Attribute(name)),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                let items = self.parse_list_items()?;
                Ok(Expr::List(items.into_iter().map(|(e, _)| e).collect()))
            }
            other => Err(self.error(format!("unexpected `{other}` at offset {}", token.start))),
        }
    }

    /// Items of a list whose `[` has been consumed, with their byte spans.
    /// Consumes the closing `]`.
    fn parse_list_items(&mut self) -> Result<Vec<(Expr, (usize, usize))>> {
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(&TokenKind::RBracket) {
                self.bump();
                return Ok(items);
            }
            let from = self.pos;
            let item = self.parse_expr()?;
            items.push((item, self.span_since(from)));
            match self.peek() {
                Some(TokenKind::Comma) => {
                    self.bump();
                }
                Some(TokenKind::RBracket) => {}
                Some(other) => {
                    return Err(self.error(format!("expected `,` or `]` but found `{other}`")));
                }
                None => return Err(self.error("unbalanced `[`")),
            }
        }
    }
}

/// Parse a single expression (no model-list splitting).
pub fn parse_expr(text: &str) -> Result<Expr> {
    let template = strip_quotes(text);
    let tokens = lex(&template)?;
    if tokens.is_empty() {
        return Err(malformed(text, "empty expression"));
    }
    let mut parser = Parser::new(&template, tokens);
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

fn strip_quotes(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '\'' | '"')).collect()
}

// --- Models ---

/// Numeric value of one evaluated model.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelValue {
    Scalar(f64),
    List(Vec<f64>),
}

impl ModelValue {
    pub fn len(&self) -> usize {
        match self {
            ModelValue::Scalar(_) => 1,
            ModelValue::List(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattened numbers, a scalar giving a single element.
    pub fn values(&self) -> Vec<f64> {
        match self {
            ModelValue::Scalar(v) => vec![*v],
            ModelValue::List(values) => values.clone(),
        }
    }
}

impl fmt::Display for ModelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelValue::Scalar(v) => write!(f, "{v}"),
            ModelValue::List(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// One model of a branch set: its source text and parsed expression.
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolicModel {
    pub label: String,
    pub expr: Expr,
}

/// The parsed `uncertaintyModel` cell of a branch set.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelList {
    source: String,
    models: Vec<SymbolicModel>,
}

impl ModelList {
    /// Parse a model list. A cell that is not a bracketed list is a single model.
    pub fn parse(text: &str) -> Result<Self> {
        let template = strip_quotes(text);
        let tokens = lex(&template)?;
        if tokens.is_empty() {
            return Err(malformed(text, "empty model list"));
        }

        let mut parser = Parser::new(&template, tokens);
        let spans = if parser.peek() == Some(&TokenKind::LBracket) {
            parser.bump();
            parser.parse_list_items()?
        } else {
            let expr = parser.parse_expr()?;
            vec![(expr, parser.span_since(0))]
        };
        parser.expect_end()?;

        let models = spans
            .into_iter()
            .map(|(expr, (start, end))| SymbolicModel {
                label: template[start..end].trim().to_string(),
                expr,
            })
            .collect();

        Ok(Self {
            source: text.trim().to_string(),
            models,
        })
    }

    /// Parse a list of opaque model names such as GMPE classes or source
    /// model files. Names are not expressions and may hold dots, slashes or
    /// spaces; each becomes a bare name reference.
    pub fn parse_names(text: &str) -> Self {
        let trimmed = text.trim();
        let inner = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(trimmed);
        let models = inner
            .split(',')
            .map(|name| name.trim().trim_matches(|c: char| matches!(c, '\'' | '"')).trim())
            .filter(|name| !name.is_empty())
            .map(|name| SymbolicModel {
                label: name.to_string(),
                expr: Expr::Attribute(name.to_string()),
            })
            .collect();
        Self {
            source: trimmed.to_string(),
            models,
        }
    }

    /// Build a literal model list from evaluated values.
    pub fn from_values(values: &[ModelValue]) -> Result<Self> {
        let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        Self::parse(&format!("[{}]", parts.join(", ")))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn models(&self) -> &[SymbolicModel] {
        &self.models
    }

    pub fn labels(&self) -> Vec<String> {
        self.models.iter().map(|m| m.label.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Attribute names referenced anywhere in the list.
    pub fn required_attributes(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for model in &self.models {
            model.expr.collect_attributes(&mut out);
        }
        out
    }

    /// Rewrite references to attributes outside `available` as zero.
    pub fn resolve(&self, available: &BTreeSet<String>) -> ResolvedModels {
        let required = self.required_attributes();
        let substituted: BTreeSet<String> = required.difference(available).cloned().collect();
        for name in &substituted {
            tracing::warn!(
                attribute = %name,
                model = %self.source,
                "cannot find attribute in zone table, setting to zero"
            );
        }

        let models = if substituted.is_empty() {
            self.models.clone()
        } else {
            self.models
                .iter()
                .map(|m| SymbolicModel {
                    label: m.label.clone(),
                    expr: m.expr.zero_missing(available),
                })
                .collect()
        };

        ResolvedModels {
            models,
            required: required.intersection(available).cloned().collect(),
            substituted,
        }
    }
}

impl fmt::Display for ModelList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for ModelList {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for ModelList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        ModelList::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// A model list with unresolvable names zeroed, ready to bind to a zone.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedModels {
    models: Vec<SymbolicModel>,
    required: BTreeSet<String>,
    substituted: BTreeSet<String>,
}

impl ResolvedModels {
    /// Attribute names still to be bound at evaluation.
    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

    /// Attribute names that were replaced by zero.
    pub fn substituted(&self) -> &BTreeSet<String> {
        &self.substituted
    }

    pub fn labels(&self) -> Vec<String> {
        self.models.iter().map(|m| m.label.clone()).collect()
    }

    /// Bind the zone's attribute values and evaluate every model, rounding
    /// to six decimals.
    pub fn evaluate(&self, zone: &Zone) -> Result<Vec<ModelValue>> {
        self.models
            .iter()
            .map(|model| {
                let lookup = |name: &str| -> Result<f64> {
                    match zone.get(name) {
                        Some(AttributeValue::Number(v)) if v.is_finite() => Ok(v),
                        Some(AttributeValue::Number(v)) => Err(malformed(
                            &model.label,
                            format!("attribute `{name}` of zone {} is {v}", zone.id),
                        )),
                        Some(AttributeValue::Text(text)) => Err(malformed(
                            &model.label,
                            format!("attribute `{name}` of zone {} is text `{text}`", zone.id),
                        )),
                        None => Err(malformed(
                            &model.label,
                            format!("attribute `{name}` not bound for zone {}", zone.id),
                        )),
                    }
                };
                let value = model.expr.evaluate(&model.label, &lookup)?;
                to_model_value(&model.label, value)
            })
            .collect()
    }
}

fn to_model_value(label: &str, value: Value) -> Result<ModelValue> {
    match value {
        Value::Number(v) => Ok(ModelValue::Scalar(round_decimals(v, MODEL_DECIMALS))),
        Value::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Number(v) => Ok(round_decimals(v, MODEL_DECIMALS)),
                Value::List(_) => Err(malformed(label, "models nest at most one list deep")),
            })
            .collect::<Result<Vec<_>>>()
            .map(ModelValue::List),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> Zone {
        Zone::new("z1", 4.5, 7.8, 4.2, 0.9)
            .with_uncertainty(0.05, 0.3)
            .with_attribute("stda", 0.12)
            .with_attribute("region", "craton")
    }

    fn eval(text: &str, zone: &Zone) -> Result<Vec<ModelValue>> {
        let models = ModelList::parse(text)?;
        models.resolve(&zone.attribute_names()).evaluate(zone)
    }

    #[test]
    fn test_lex_numbers_and_names() {
        let tokens = lex("mmax - 1.5e-1").unwrap();
        let kinds: Vec<_> = tokens.into_iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident("mmax".into()),
                TokenKind::Minus,
                TokenKind::Number(0.15),
            ]
        );
    }

    #[test]
    fn test_lex_rejects_stray_character() {
        let err = lex("mmax @ 2").unwrap_err();
        assert!(matches!(err, CollapseError::MalformedModel { .. }));
    }

    #[test]
    fn test_parse_precedence() {
        let expr = parse_expr("a + b * 2 - 1").unwrap();
        assert_eq!(expr.to_string(), "a + b * 2 - 1");
        let expr = parse_expr("(a + b) * 2").unwrap();
        assert_eq!(expr.to_string(), "(a + b) * 2");
    }

    #[test]
    fn test_parse_unary_minus() {
        let expr = parse_expr("-0.1").unwrap();
        assert_eq!(expr, Expr::Neg(Box::new(Expr::Number(0.1))));
    }

    #[test]
    fn test_model_list_labels_strip_quotes() {
        let models = ModelList::parse("['mmax - stdmmax', 'mmax', 'mmax + stdmmax']").unwrap();
        assert_eq!(models.len(), 3);
        assert_eq!(
            models.labels(),
            vec!["mmax - stdmmax", "mmax", "mmax + stdmmax"]
        );
        let required: Vec<_> = models.required_attributes().into_iter().collect();
        assert_eq!(required, vec!["mmax", "stdmmax"]);
    }

    #[test]
    fn test_model_list_pairs() {
        let models = ModelList::parse("[['a - stda', 'b'], ['a', 'b + stdb']]").unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models.labels(), vec!["[a - stda, b]", "[a, b + stdb]"]);
        assert_eq!(models.models()[0].expr.size(), 2);
    }

    #[test]
    fn test_bare_expression_is_single_model() {
        let models = ModelList::parse("mmax + 0.2").unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models.labels(), vec!["mmax + 0.2"]);
    }

    #[test]
    fn test_trailing_comma_allowed() {
        let models = ModelList::parse("[0.1, 0.2,]").unwrap();
        assert_eq!(models.len(), 2);
    }

    #[test]
    fn test_evaluate_against_zone() {
        let values = eval("['mmax - stdmmax', 'mmax', 'mmax + stdmmax']", &zone()).unwrap();
        assert_eq!(
            values,
            vec![
                ModelValue::Scalar(7.5),
                ModelValue::Scalar(7.8),
                ModelValue::Scalar(8.1),
            ]
        );
    }

    #[test]
    fn test_evaluate_pairs() {
        let values = eval("[['a - stda', 'b'], ['a + stda', 'b']]", &zone()).unwrap();
        assert_eq!(
            values,
            vec![
                ModelValue::List(vec![4.08, 0.9]),
                ModelValue::List(vec![4.32, 0.9]),
            ]
        );
    }

    #[test]
    fn test_evaluate_rounds_to_six_decimals() {
        let values = eval("[1 / 3]", &zone()).unwrap();
        assert_eq!(values, vec![ModelValue::Scalar(0.333_333)]);
    }

    #[test]
    fn test_missing_attribute_becomes_zero() {
        let z = zone();
        let models = ModelList::parse("['a + avalue', 'avalue']").unwrap();
        let resolved = models.resolve(&z.attribute_names());
        assert!(resolved.substituted().contains("avalue"));
        assert!(!resolved.required().contains("avalue"));
        assert!(resolved.required().contains("a"));

        let values = resolved.evaluate(&z).unwrap();
        let explicit = z.clone().with_attribute("avalue", 0.0);
        assert_eq!(values, eval("['a + avalue', 'avalue']", &explicit).unwrap());
        assert_eq!(values, vec![ModelValue::Scalar(4.2), ModelValue::Scalar(0.0)]);
    }

    #[test]
    fn test_unbalanced_brackets_fail() {
        for text in ["[0.1, 0.2", "[[a, b]", "0.1]", "[a b]", "[]]"] {
            let err = ModelList::parse(text).unwrap_err();
            assert!(
                matches!(err, CollapseError::MalformedModel { .. }),
                "{text} should be malformed, got {err:?}"
            );
        }
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(ModelList::parse("  ").is_err());
        assert!(ModelList::parse("''").is_err());
    }

    #[test]
    fn test_text_attribute_fails() {
        let err = eval("['region']", &zone()).unwrap_err();
        match err {
            CollapseError::MalformedModel { reason, .. } => assert!(reason.contains("text")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_arithmetic_on_list_fails() {
        assert!(eval("[[a, b] + 1]", &zone()).is_err());
        assert!(eval("[-[a, b]]", &zone()).is_err());
    }

    #[test]
    fn test_deep_nesting_fails() {
        assert!(eval("[[[a]]]", &zone()).is_err());
    }

    #[test]
    fn test_division_by_zero_fails() {
        assert!(eval("[a / missing]", &zone()).is_err());
    }

    #[test]
    fn test_from_values_roundtrip() {
        let values = vec![ModelValue::Scalar(-0.1), ModelValue::Scalar(0.25)];
        let models = ModelList::from_values(&values).unwrap();
        assert_eq!(models.source(), "[-0.1, 0.25]");
        let evaluated = models.resolve(&BTreeSet::new()).evaluate(&zone()).unwrap();
        assert_eq!(evaluated, values);
    }

    #[test]
    fn test_parse_names_keeps_paths() {
        let models = ModelList::parse_names("['Source Models/areal.xml', \"smoothed.xml\"]");
        assert_eq!(models.labels(), vec!["Source Models/areal.xml", "smoothed.xml"]);
        assert_eq!(ModelList::parse_names("Toro2002").labels(), vec!["Toro2002"]);
        assert!(ModelList::parse_names("[]").is_empty());
        assert!(ModelList::parse("['areal.xml']").is_err());
    }

    #[test]
    fn test_serde_as_source_string() {
        let models = ModelList::parse("['mmax', 'mmax + 0.5']").unwrap();
        let json = serde_json::to_string(&models).unwrap();
        assert_eq!(json, "\"['mmax', 'mmax + 0.5']\"");
        let back: ModelList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, models);
    }
}
