//! One error kind at the interpreter level (`ParseFailure`, spec.md §7: "this
//! alternative did not match here" — a control-flow signal, not a fatal
//! condition), plus `EngineError` for the handful of things that are fatal
//! at the grammar-factory boundary (trailing garbage, a malformed host
//! expression). Error message formatting for end users is explicitly out of
//! scope (spec.md §1); these carry just enough to name the failing rule and
//! an approximate position, per spec.md §7.

use std::fmt;

use crate::hostexpr::HostExprError;

pub type ParseResult<T> = Result<T, ParseFailure>;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseFailureReason {
    EndOfInput,
    Mismatch,
    UnknownRule(String),
    NoAlternativeMatched,
    NegativeLookaheadMatched,
    ReservedSyntax,
    ExpectedNewline,
    UnbalancedBrackets,
}

/// "This alternative did not match here." Carries the name of the
/// innermost rule that was being attempted and, if known, the farthest
/// position the stream had ever reached — both optional per spec.md §7.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub reason: ParseFailureReason,
    pub rule: Option<String>,
    pub farthest: Option<usize>,
}

impl ParseFailure {
    fn new(reason: ParseFailureReason) -> Self {
        ParseFailure { reason, rule: None, farthest: None }
    }

    pub fn end_of_input() -> Self {
        Self::new(ParseFailureReason::EndOfInput)
    }

    pub fn mismatch() -> Self {
        Self::new(ParseFailureReason::Mismatch)
    }

    pub fn unknown_rule(name: &str) -> Self {
        Self::new(ParseFailureReason::UnknownRule(name.to_string()))
    }

    pub fn no_alternative() -> Self {
        Self::new(ParseFailureReason::NoAlternativeMatched)
    }

    pub fn negative_lookahead_matched() -> Self {
        Self::new(ParseFailureReason::NegativeLookaheadMatched)
    }

    pub fn reserved_syntax() -> Self {
        Self::new(ParseFailureReason::ReservedSyntax)
    }

    pub fn expected_newline() -> Self {
        Self::new(ParseFailureReason::ExpectedNewline)
    }

    pub fn unbalanced_brackets() -> Self {
        Self::new(ParseFailureReason::UnbalancedBrackets)
    }

    /// Tags the failure with the rule that was executing when it first
    /// surfaced. Only the innermost attribution sticks (apply() only calls
    /// this when the failure isn't already attributed to a deeper rule).
    pub fn with_rule(mut self, rule: &str) -> Self {
        if self.rule.is_none() {
            self.rule = Some(rule.to_string());
        }
        self
    }

    pub fn with_farthest(mut self, pos: usize) -> Self {
        self.farthest = Some(pos);
        self
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            ParseFailureReason::EndOfInput => write!(f, "unexpected end of input")?,
            ParseFailureReason::Mismatch => write!(f, "input did not match")?,
            ParseFailureReason::UnknownRule(name) => write!(f, "no such rule '{name}'")?,
            ParseFailureReason::NoAlternativeMatched => write!(f, "no alternative matched")?,
            ParseFailureReason::NegativeLookaheadMatched => {
                write!(f, "negative lookahead matched")?
            }
            ParseFailureReason::ReservedSyntax => write!(f, "reserved syntax is not implemented")?,
            ParseFailureReason::ExpectedNewline => write!(f, "expected a newline")?,
            ParseFailureReason::UnbalancedBrackets => write!(f, "unbalanced brackets or quotes")?,
        }
        if let Some(rule) = &self.rule {
            write!(f, " (in rule '{rule}')")?;
        }
        if let Some(pos) = self.farthest {
            write!(f, " (farthest position reached: {pos})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseFailure {}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    Parse(ParseFailure),
    TrailingGarbage { rule: String, remaining: String },
    HostExpr { rule: String, source: HostExprError },
    /// Grammar source could not be loaded from disk (`compile_file`).
    Io(String),
}

impl From<ParseFailure> for EngineError {
    fn from(e: ParseFailure) -> Self {
        EngineError::Parse(e)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Parse(e) => write!(f, "{e}"),
            EngineError::TrailingGarbage { rule, remaining } => {
                write!(f, "trailing garbage in input after rule '{rule}': {remaining:?}")
            }
            EngineError::HostExpr { rule, source } => {
                write!(f, "invalid host expression in rule '{rule}': {source}")
            }
            EngineError::Io(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
