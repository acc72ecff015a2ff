//! The host expression sublanguage: what a `=>` semantic action may contain.
//!
//! The Python original hands `pythonExpr`'s scanned text straight to
//! `eval()` (spec.md §6(c), §4.2's `pythonExpr`). Rust has no such escape
//! hatch, so this module owns a small, closed expression language instead:
//! literals, bound-name references, tuples, `+ - * /`, unary minus, and
//! calls into a fixed builtin table. SPEC_FULL.md §6 names the exact
//! surface; nothing outside it parses.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum HostExpr {
    IntLit(i64),
    FloatLit(f64),
    StrLit(String),
    BoolLit(bool),
    NilLit,
    Name(String),
    Tuple(Vec<HostExpr>),
    Unary(UnaryOp, Box<HostExpr>),
    Binary(BinOp, Box<HostExpr>, Box<HostExpr>),
    Call(String, Vec<HostExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostExprError {
    UnexpectedEnd,
    UnexpectedChar(char),
    UnboundName(String),
    UnknownBuiltin(String),
    WrongArity { name: String, expected: usize, got: usize },
    NotANumber,
    NotAString,
}

impl fmt::Display for HostExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostExprError::UnexpectedEnd => write!(f, "unexpected end of host expression"),
            HostExprError::UnexpectedChar(c) => write!(f, "unexpected character '{c}' in host expression"),
            HostExprError::UnboundName(n) => write!(f, "unbound name '{n}' in host expression"),
            HostExprError::UnknownBuiltin(n) => write!(f, "unknown builtin '{n}'"),
            HostExprError::WrongArity { name, expected, got } => {
                write!(f, "'{name}' expects {expected} argument(s), got {got}")
            }
            HostExprError::NotANumber => write!(f, "value is not numeric"),
            HostExprError::NotAString => write!(f, "value is not a string"),
        }
    }
}

impl std::error::Error for HostExprError {}

/// Parses the raw text scanned by `Machine::host_expr` (spec.md §4.2) into
/// a `HostExpr` tree. A thin hand-written recursive-descent parser, same
/// shape as the teacher's `parser::parser::Parser`.
pub struct HostExprParser<'a> {
    chars: Vec<char>,
    pos: usize,
    _source: &'a str,
}

impl<'a> HostExprParser<'a> {
    pub fn new(source: &'a str) -> Self {
        HostExprParser { chars: source.chars().collect(), pos: 0, _source: source }
    }

    pub fn parse(mut self) -> Result<HostExpr, HostExprError> {
        self.skip_ws();
        let expr = self.parse_additive()?;
        self.skip_ws();
        Ok(expr)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_additive(&mut self) -> Result<HostExpr, HostExprError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some('+') => {
                    self.advance();
                    self.skip_ws();
                    let rhs = self.parse_multiplicative()?;
                    lhs = HostExpr::Binary(BinOp::Add, Box::new(lhs), Box::new(rhs));
                }
                Some('-') => {
                    self.advance();
                    self.skip_ws();
                    let rhs = self.parse_multiplicative()?;
                    lhs = HostExpr::Binary(BinOp::Sub, Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<HostExpr, HostExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some('*') => {
                    self.advance();
                    self.skip_ws();
                    let rhs = self.parse_unary()?;
                    lhs = HostExpr::Binary(BinOp::Mul, Box::new(lhs), Box::new(rhs));
                }
                Some('/') => {
                    self.advance();
                    self.skip_ws();
                    let rhs = self.parse_unary()?;
                    lhs = HostExpr::Binary(BinOp::Div, Box::new(lhs), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<HostExpr, HostExprError> {
        self.skip_ws();
        if self.peek() == Some('-') {
            self.advance();
            self.skip_ws();
            let inner = self.parse_unary()?;
            return Ok(HostExpr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<HostExpr, HostExprError> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.advance();
                let mut items = Vec::new();
                self.skip_ws();
                if self.peek() != Some(')') {
                    loop {
                        items.push(self.parse_additive()?);
                        self.skip_ws();
                        if self.peek() == Some(',') {
                            self.advance();
                            self.skip_ws();
                            if self.peek() == Some(')') {
                                break;
                            }
                        } else {
                            break;
                        }
                    }
                }
                self.skip_ws();
                match self.advance() {
                    Some(')') => Ok(HostExpr::Tuple(items)),
                    Some(c) => Err(HostExprError::UnexpectedChar(c)),
                    None => Err(HostExprError::UnexpectedEnd),
                }
            }
            Some('"') => self.parse_string(),
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_ident_or_call(),
            Some(c) => Err(HostExprError::UnexpectedChar(c)),
            None => Err(HostExprError::UnexpectedEnd),
        }
    }

    fn parse_string(&mut self) -> Result<HostExpr, HostExprError> {
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some(c) => s.push(c),
                None => break, // unclosed string at EOF: fall through, no panic (fidelity with host_expr scanning)
            }
        }
        Ok(HostExpr::StrLit(s))
    }

    fn parse_number(&mut self) -> Result<HostExpr, HostExprError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some('.') {
            is_float = true;
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_float {
            text.parse::<f64>().map(HostExpr::FloatLit).map_err(|_| HostExprError::NotANumber)
        } else {
            text.parse::<i64>().map(HostExpr::IntLit).map_err(|_| HostExprError::NotANumber)
        }
    }

    fn parse_ident_or_call(&mut self) -> Result<HostExpr, HostExprError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        match name.as_str() {
            "true" => return Ok(HostExpr::BoolLit(true)),
            "false" => return Ok(HostExpr::BoolLit(false)),
            "nil" => return Ok(HostExpr::NilLit),
            _ => {}
        }
        self.skip_ws();
        if self.peek() == Some('(') {
            self.advance();
            let mut args = Vec::new();
            self.skip_ws();
            if self.peek() != Some(')') {
                loop {
                    args.push(self.parse_additive()?);
                    self.skip_ws();
                    if self.peek() == Some(',') {
                        self.advance();
                        self.skip_ws();
                    } else {
                        break;
                    }
                }
            }
            self.skip_ws();
            match self.advance() {
                Some(')') => Ok(HostExpr::Call(name, args)),
                Some(c) => Err(HostExprError::UnexpectedChar(c)),
                None => Err(HostExprError::UnexpectedEnd),
            }
        } else {
            Ok(HostExpr::Name(name))
        }
    }
}

pub fn parse(source: &str) -> Result<HostExpr, HostExprError> {
    HostExprParser::new(source).parse()
}

type Builtin = fn(&[Value]) -> Result<Value, HostExprError>;

static BUILTINS: Lazy<HashMap<&'static str, Builtin>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, Builtin> = HashMap::new();
    m.insert("int", builtin_int);
    m.insert("float", builtin_float);
    m.insert("str", builtin_str);
    m.insert("bool", builtin_bool);
    m.insert("concat", builtin_concat);
    m
});

fn builtin_int(args: &[Value]) -> Result<Value, HostExprError> {
    one_arg(args)?;
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(x) => Ok(Value::Int(*x as i64)),
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| HostExprError::NotANumber),
        v if v.is_char_seq() => v.to_string().trim().parse::<i64>().map(Value::Int).map_err(|_| HostExprError::NotANumber),
        _ => Err(HostExprError::NotANumber),
    }
}

fn builtin_float(args: &[Value]) -> Result<Value, HostExprError> {
    one_arg(args)?;
    match &args[0] {
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Float(x) => Ok(Value::Float(*x)),
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| HostExprError::NotANumber),
        v if v.is_char_seq() => v.to_string().trim().parse::<f64>().map(Value::Float).map_err(|_| HostExprError::NotANumber),
        _ => Err(HostExprError::NotANumber),
    }
}

fn builtin_str(args: &[Value]) -> Result<Value, HostExprError> {
    one_arg(args)?;
    Ok(Value::Str(args[0].to_string()))
}

fn builtin_bool(args: &[Value]) -> Result<Value, HostExprError> {
    one_arg(args)?;
    match &args[0] {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Int(i) => Ok(Value::Bool(*i != 0)),
        Value::Nil => Ok(Value::Bool(false)),
        _ => Ok(Value::Bool(true)),
    }
}

fn builtin_concat(args: &[Value]) -> Result<Value, HostExprError> {
    let mut s = String::new();
    for a in args {
        match a {
            Value::Str(t) => s.push_str(t),
            v if v.is_char_seq() => s.push_str(&v.to_string()),
            _ => return Err(HostExprError::NotAString),
        }
    }
    Ok(Value::Str(s))
}

fn one_arg(args: &[Value]) -> Result<(), HostExprError> {
    if args.len() != 1 {
        return Err(HostExprError::WrongArity { name: "<builtin>".to_string(), expected: 1, got: args.len() });
    }
    Ok(())
}

/// Evaluates a parsed host expression against a rule's local bindings
/// (spec.md §3's Local Environment — the `HashMap<String, Value>` that
/// `Bind` nodes populate during a rule invocation).
pub fn eval(expr: &HostExpr, env: &HashMap<String, Value>) -> Result<Value, HostExprError> {
    match expr {
        HostExpr::IntLit(i) => Ok(Value::Int(*i)),
        HostExpr::FloatLit(x) => Ok(Value::Float(*x)),
        HostExpr::StrLit(s) => Ok(Value::Str(s.clone())),
        HostExpr::BoolLit(b) => Ok(Value::Bool(*b)),
        HostExpr::NilLit => Ok(Value::Nil),
        HostExpr::Name(n) => env.get(n).cloned().ok_or_else(|| HostExprError::UnboundName(n.clone())),
        HostExpr::Tuple(items) => {
            let vals = items.iter().map(|e| eval(e, env)).collect::<Result<Vec<_>, _>>()?;
            if vals.len() == 2 {
                let mut it = vals.into_iter();
                let a = it.next().unwrap();
                let b = it.next().unwrap();
                Ok(Value::pair(a, b))
            } else {
                Ok(Value::Seq(vals))
            }
        }
        HostExpr::Unary(UnaryOp::Neg, inner) => {
            let v = eval(inner, env)?;
            match v {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(x) => Ok(Value::Float(-x)),
                _ => Err(HostExprError::NotANumber),
            }
        }
        HostExpr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, env)?;
            let r = eval(rhs, env)?;
            eval_binary(*op, l, r)
        }
        HostExpr::Call(name, arg_exprs) => {
            let f = BUILTINS.get(name.as_str()).ok_or_else(|| HostExprError::UnknownBuiltin(name.clone()))?;
            let args = arg_exprs.iter().map(|e| eval(e, env)).collect::<Result<Vec<_>, _>>()?;
            f(&args)
        }
    }
}

fn eval_binary(op: BinOp, l: Value, r: Value) -> Result<Value, HostExprError> {
    if op == BinOp::Add {
        if let (Some(a), Some(b)) = (as_string_operand(&l), as_string_operand(&r)) {
            return Ok(Value::Str(format!("{a}{b}")));
        }
    }
    let (lf, rf) = match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(HostExprError::NotANumber),
    };
    let both_int = matches!(l, Value::Int(_)) && matches!(r, Value::Int(_));
    let result = match op {
        BinOp::Add => lf + rf,
        BinOp::Sub => lf - rf,
        BinOp::Mul => lf * rf,
        BinOp::Div => lf / rf,
    };
    if both_int && op != BinOp::Div {
        Ok(Value::Int(result as i64))
    } else {
        Ok(Value::Float(result))
    }
}

fn as_string_operand(v: &Value) -> Option<String> {
    match v {
        Value::Str(s) => Some(s.clone()),
        v if v.is_char_seq() => Some(v.to_string()),
        _ => None,
    }
}
