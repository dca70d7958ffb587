//! Shader expression engine.
//!
//! Arithmetic/relational/logical expressions over floats, with table
//! lookups (`flicker[time * 2]`) and runtime variables (`time`,
//! `parm0`..`parm11`, `global0`..`global7`). Parsing never folds
//! constants and every node remembers whether it was written inside
//! parentheses, so the regenerated source preserves the value function
//! of the original text.

use std::collections::VecDeque;
use std::fmt;

use basalt_core::{BasaltError, BasaltResult};

use crate::table::TableDefinition;
use crate::tokens::Tokeniser;

const MAX_PARM_INDEX: usize = 11;
const MAX_GLOBAL_INDEX: usize = 7;

/// Runtime inputs an expression may read. Evaluation is pure; the
/// context is only read, so a shared context can serve several threads.
pub trait EvalContext {
    /// Entity shader parm. Without an entity the colour parms 0..3
    /// default to 1.0, the rest to 0.0.
    fn parm(&self, index: usize) -> f32 {
        if index < 4 {
            1.0
        } else {
            0.0
        }
    }

    /// Global shader parm, 0.0 by default.
    fn global(&self, _index: usize) -> f32 {
        0.0
    }

    /// Resolve a table by name. Lookups against unknown tables
    /// evaluate to 0.0.
    fn table(&self, _name: &str) -> Option<&TableDefinition> {
        None
    }
}

/// Context with no entity and no tables.
pub struct EmptyContext;

impl EvalContext for EmptyContext {}

/// Binary operators, ordered tightest-binding first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Multiply,
    Divide,
    Modulo,
    Add,
    Subtract,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
    NotEqual,
    And,
    Or,
}

impl BinaryOp {
    /// Binding power; larger binds tighter.
    fn binding_power(self) -> u8 {
        match self {
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 6,
            BinaryOp::Add | BinaryOp::Subtract => 5,
            BinaryOp::LessThan
            | BinaryOp::LessThanOrEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterThanOrEqual => 4,
            BinaryOp::Equal | BinaryOp::NotEqual => 3,
            BinaryOp::And => 2,
            BinaryOp::Or => 1,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "*" => BinaryOp::Multiply,
            "/" => BinaryOp::Divide,
            "%" => BinaryOp::Modulo,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Subtract,
            "<" => BinaryOp::LessThan,
            "<=" => BinaryOp::LessThanOrEqual,
            ">" => BinaryOp::GreaterThan,
            ">=" => BinaryOp::GreaterThanOrEqual,
            "==" => BinaryOp::Equal,
            "!=" => BinaryOp::NotEqual,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        })
    }

    fn apply(self, a: f32, b: f32) -> f32 {
        let truth = |v: bool| if v { 1.0 } else { 0.0 };
        match self {
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => a / b,
            BinaryOp::Modulo => a % b,
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::LessThan => truth(a < b),
            BinaryOp::LessThanOrEqual => truth(a <= b),
            BinaryOp::GreaterThan => truth(a > b),
            BinaryOp::GreaterThanOrEqual => truth(a >= b),
            BinaryOp::Equal => truth(a == b),
            BinaryOp::NotEqual => truth(a != b),
            BinaryOp::And => truth(a != 0.0 && b != 0.0),
            BinaryOp::Or => truth(a != 0.0 || b != 0.0),
        }
    }
}

/// Expression node kinds; the tree is closed and immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(f32),
    Time,
    Parm(usize),
    Global(usize),
    TableLookup {
        table: String,
        index: Box<Expression>,
    },
    Negate(Box<Expression>),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

/// A parsed shader expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    kind: ExprKind,
    parenthesised: bool,
}

impl Expression {
    pub fn constant(value: f32) -> Self {
        Self {
            kind: ExprKind::Constant(value),
            parenthesised: false,
        }
    }

    fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            parenthesised: false,
        }
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    /// Parse an expression from free-standing text.
    pub fn parse(text: &str) -> BasaltResult<Self> {
        let mut tok = Tokeniser::new(text);
        Self::parse_from_tokens(&mut tok)
    }

    /// Parse an expression from the current position of a declaration
    /// token stream. Tokens behind the expression are left in place.
    pub fn parse_from_tokens(tok: &mut Tokeniser) -> BasaltResult<Self> {
        let mut stream = ExprTokens::new(tok);
        let expr = parse_binary(&mut stream, 1)?;
        stream.finish();
        Ok(expr)
    }

    /// Evaluate against a time (seconds) and a runtime context. Pure;
    /// never mutates the tree.
    pub fn evaluate(&self, time: f32, ctx: &dyn EvalContext) -> f32 {
        match &self.kind {
            ExprKind::Constant(value) => *value,
            ExprKind::Time => time,
            ExprKind::Parm(index) => ctx.parm(*index),
            ExprKind::Global(index) => ctx.global(*index),
            ExprKind::TableLookup { table, index } => {
                let lookup = index.evaluate(time, ctx);
                match ctx.table(table) {
                    Some(def) => def.get_value(lookup),
                    None => {
                        tracing::warn!("lookup against unknown table '{}'", table);
                        0.0
                    }
                }
            }
            ExprKind::Negate(inner) => -inner.evaluate(time, ctx),
            ExprKind::Binary { op, left, right } => {
                op.apply(left.evaluate(time, ctx), right.evaluate(time, ctx))
            }
        }
    }

    /// Regenerate a textual form that parses back to the same value
    /// function. Operator choice and parentheses are preserved.
    pub fn to_source_string(&self) -> String {
        let inner = match &self.kind {
            ExprKind::Constant(value) => format!("{}", value),
            ExprKind::Time => "time".to_string(),
            ExprKind::Parm(index) => format!("parm{}", index),
            ExprKind::Global(index) => format!("global{}", index),
            ExprKind::TableLookup { table, index } => {
                format!("{}[{}]", table, index.to_source_string())
            }
            ExprKind::Negate(operand) => format!("-{}", operand.to_source_string()),
            ExprKind::Binary { op, left, right } => format!(
                "{} {} {}",
                left.to_source_string(),
                op.symbol(),
                right.to_source_string()
            ),
        };

        if self.parenthesised {
            format!("({})", inner)
        } else {
            inner
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_source_string())
    }
}

/// Fine-grained expression tokens split off the word tokens of the
/// declaration stream.
#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Number(f32),
    Ident(String),
    Symbol(&'static str),
    /// Anything that cannot be part of an expression; never consumed.
    Other(String),
}

impl ExprToken {
    fn raw_text(&self) -> String {
        match self {
            ExprToken::Number(value) => format!("{}", value),
            ExprToken::Ident(text) | ExprToken::Other(text) => text.clone(),
            ExprToken::Symbol(symbol) => (*symbol).to_string(),
        }
    }
}

/// Split one word token into expression fragments. A declaration token
/// like `blinktable[time]` or `3*4` carries several expression tokens
/// without any whitespace between them.
fn split_fragments(raw: &str) -> Vec<ExprToken> {
    let chars: Vec<char> = raw.chars().collect();
    let mut fragments = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let ch = chars[pos];

        if ch.is_ascii_digit() || (ch == '.' && matches!(chars.get(pos + 1), Some(c) if c.is_ascii_digit()))
        {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
                pos += 1;
            }
            let text: String = chars[start..pos].iter().collect();
            match text.parse::<f32>() {
                Ok(value) => fragments.push(ExprToken::Number(value)),
                Err(_) => fragments.push(ExprToken::Other(text)),
            }
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            fragments.push(ExprToken::Ident(chars[start..pos].iter().collect()));
            continue;
        }

        let two: String = chars[pos..(pos + 2).min(chars.len())].iter().collect();
        let symbol = match two.as_str() {
            "==" | "!=" | "<=" | ">=" | "&&" | "||" => {
                pos += 2;
                match two.as_str() {
                    "==" => "==",
                    "!=" => "!=",
                    "<=" => "<=",
                    ">=" => ">=",
                    "&&" => "&&",
                    _ => "||",
                }
            }
            _ => match ch {
                '(' => "(",
                ')' => ")",
                '[' => "[",
                ']' => "]",
                '+' => "+",
                '-' => "-",
                '*' => "*",
                '/' => "/",
                '%' => "%",
                '<' => "<",
                '>' => ">",
                _ => {
                    // Not expression material; keep the rest opaque
                    fragments.push(ExprToken::Other(chars[pos..].iter().collect()));
                    return fragments;
                }
            },
        };
        if symbol.len() == 1 {
            pos += 1;
        }
        fragments.push(ExprToken::Symbol(symbol));
    }

    fragments
}

/// Adapter feeding expression fragments off a declaration token stream.
/// Peeking never consumes the underlying word token, so an expression
/// can end right in front of the next material keyword.
struct ExprTokens<'a> {
    tok: &'a mut Tokeniser,
    buffer: VecDeque<ExprToken>,
}

impl<'a> ExprTokens<'a> {
    fn new(tok: &'a mut Tokeniser) -> Self {
        Self {
            tok,
            buffer: VecDeque::new(),
        }
    }

    fn line(&self) -> usize {
        self.tok.line()
    }

    fn peek(&mut self) -> Option<ExprToken> {
        if let Some(front) = self.buffer.front() {
            return Some(front.clone());
        }
        self.tok
            .peek()
            .and_then(|raw| split_fragments(raw).into_iter().next())
    }

    fn advance(&mut self) -> BasaltResult<ExprToken> {
        if self.buffer.is_empty() {
            let raw = self.tok.next_token()?;
            self.buffer.extend(split_fragments(&raw));
        }
        self.buffer.pop_front().ok_or_else(|| {
            BasaltError::parse("unexpected end of expression", self.tok.line())
        })
    }

    /// Hand unconsumed fragments back to the declaration stream.
    fn finish(mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let fragments = self.buffer.drain(..).map(|t| t.raw_text()).collect();
        self.tok.insert_front(fragments);
    }
}

fn parse_binary(stream: &mut ExprTokens<'_>, min_bp: u8) -> BasaltResult<Expression> {
    let mut left = parse_unary(stream)?;

    loop {
        let op = match stream.peek() {
            Some(ExprToken::Symbol(symbol)) => match BinaryOp::from_symbol(symbol) {
                Some(op) => op,
                None => break,
            },
            _ => break,
        };

        let bp = op.binding_power();
        if bp < min_bp {
            break;
        }

        stream.advance()?; // the operator
        let right = parse_binary(stream, bp + 1)?;
        left = Expression::new(ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        });
    }

    Ok(left)
}

fn parse_unary(stream: &mut ExprTokens<'_>) -> BasaltResult<Expression> {
    match stream.peek() {
        Some(ExprToken::Symbol("-")) => {
            stream.advance()?;
            let operand = parse_unary(stream)?;
            Ok(Expression::new(ExprKind::Negate(Box::new(operand))))
        }
        Some(ExprToken::Symbol("+")) => {
            // A leading +, just ignore it
            stream.advance()?;
            parse_unary(stream)
        }
        _ => parse_primary(stream),
    }
}

fn parse_primary(stream: &mut ExprTokens<'_>) -> BasaltResult<Expression> {
    let line = stream.line();

    match stream.peek() {
        Some(ExprToken::Number(value)) => {
            stream.advance()?;
            Ok(Expression::constant(value))
        }
        Some(ExprToken::Symbol("(")) => {
            stream.advance()?;
            let mut inner = parse_binary(stream, 1)?;
            match stream.advance()? {
                ExprToken::Symbol(")") => {}
                other => {
                    return Err(BasaltError::parse(
                        format!("expected ')', got '{}'", other.raw_text()),
                        line,
                    ))
                }
            }
            inner.parenthesised = true;
            Ok(inner)
        }
        Some(ExprToken::Ident(name)) => {
            stream.advance()?;
            parse_named_term(stream, name, line)
        }
        Some(other) => Err(BasaltError::parse(
            format!("missing operand, got '{}'", other.raw_text()),
            line,
        )),
        None => Err(BasaltError::parse("missing expression", line)),
    }
}

fn parse_named_term(
    stream: &mut ExprTokens<'_>,
    name: String,
    line: usize,
) -> BasaltResult<Expression> {
    let lower = name.to_lowercase();

    if lower == "time" {
        return Ok(Expression::new(ExprKind::Time));
    }

    if let Some(digits) = lower.strip_prefix("parm") {
        if let Ok(index) = digits.parse::<usize>() {
            if index > MAX_PARM_INDEX {
                return Err(BasaltError::parse("shader parm index out of bounds", line));
            }
            return Ok(Expression::new(ExprKind::Parm(index)));
        }
    }

    if let Some(digits) = lower.strip_prefix("global") {
        if let Ok(index) = digits.parse::<usize>() {
            if index > MAX_GLOBAL_INDEX {
                return Err(BasaltError::parse("global parm index out of bounds", line));
            }
            return Ok(Expression::new(ExprKind::Global(index)));
        }
    }

    // Engine options with fixed values
    if lower == "sound" {
        return Ok(Expression::constant(0.0));
    }
    if lower == "fragmentprograms" {
        return Ok(Expression::constant(1.0));
    }

    // Any other name must be a table lookup
    match stream.peek() {
        Some(ExprToken::Symbol("[")) => {
            stream.advance()?;
            let index = parse_binary(stream, 1)?;
            match stream.advance()? {
                ExprToken::Symbol("]") => {}
                other => {
                    return Err(BasaltError::parse(
                        format!("expected ']' after table lookup, got '{}'", other.raw_text()),
                        line,
                    ))
                }
            }
            Ok(Expression::new(ExprKind::TableLookup {
                table: name,
                index: Box::new(index),
            }))
        }
        _ => Err(BasaltError::parse(
            format!("unknown expression term '{}'", name),
            line,
        )),
    }
}
