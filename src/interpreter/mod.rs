//! The interpreter (IN): a fixed set of primitives any compiled rule is
//! built from (spec.md §4.2). `Machine` owns the input stream, the table of
//! compiled rule closures it can `apply` by name, and the local environment
//! of the rule currently executing.
//!
//! Every primitive here returns `ParseResult<Value>` — failure is ordinary
//! control flow (spec.md §7), not a panic. The one exception is `prev`-style
//! stream misuse, which is a programmer error inside this crate, never a
//! grammar-author-facing condition.

use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use crate::error::{ParseFailure, ParseResult};
use crate::hostexpr::HostExpr;
use crate::stream::InputStream;
use crate::value::Value;

/// A compiled rule body: re-executed on every call, never memoized. See
/// SPEC_FULL.md §4.5 — this is what makes `many`/`or`'s repeated
/// invocation correct without any special laziness trick.
pub type Thunk = Rc<dyn Fn(&mut Machine) -> ParseResult<Value>>;

pub struct Machine {
    pub stream: InputStream<Value>,
    rules: HashMap<String, Thunk>,
    /// Stack of local environments, one per nested `apply`. `Bind` writes
    /// into the top frame; `Semantic` reads from it.
    envs: Vec<HashMap<String, Value>>,
    /// Name of the rule currently executing, for error attribution.
    current_rule: Vec<String>,
    /// Gates the `apply` trace log below. Off by default; a grammar
    /// compiled with `GrammarConfig { trace: true, .. }` turns it on via
    /// `with_trace`.
    trace: bool,
}

impl Machine {
    pub fn new(stream: InputStream<Value>, rules: HashMap<String, Thunk>) -> Self {
        Machine { stream, rules, envs: vec![HashMap::new()], current_rule: Vec::new(), trace: false }
    }

    /// Enables or disables the `apply` trace log (SPEC_FULL.md §7).
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }

    fn attach_rule(&self, mut f: ParseFailure) -> ParseFailure {
        if let Some(name) = self.current_rule.last() {
            f = f.with_rule(name);
        }
        f.with_farthest(self.stream.farthest())
    }

    // ---- environment -----------------------------------------------------

    pub fn bind(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.envs.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    pub fn env(&self) -> &HashMap<String, Value> {
        self.envs.last().expect("at least one environment frame always exists")
    }

    // ---- primitives --------------------------------------------------

    /// Matches any single token, binding it as the result. Fails only at
    /// end of input.
    pub fn anything(&mut self) -> ParseResult<Value> {
        match self.stream.next() {
            Some(v) => Ok(v),
            None => Err(self.attach_rule(ParseFailure::end_of_input())),
        }
    }

    /// Matches a single token equal to `expected`.
    pub fn exactly(&mut self, expected: &Value) -> ParseResult<Value> {
        match self.stream.next() {
            Some(v) if &v == expected => Ok(v),
            Some(_) => {
                self.stream.prev();
                Err(self.attach_rule(ParseFailure::mismatch()))
            }
            None => Err(self.attach_rule(ParseFailure::end_of_input())),
        }
    }

    /// Runs `f` under a fresh mark, committing on `Ok` and rewinding on
    /// `Err`. The shared shape behind `or`, `many`, and `token`
    /// (SPEC_FULL.md §4.2).
    pub fn attempt<T>(&mut self, f: impl FnOnce(&mut Machine) -> ParseResult<T>) -> ParseResult<T> {
        let m = self.stream.mark();
        match f(self) {
            Ok(v) => {
                self.stream.unmark(m);
                Ok(v)
            }
            Err(e) => {
                self.stream.rewind(m);
                Err(e)
            }
        }
    }

    /// Applies a named rule, pushing `args` onto the stream (in reverse, so
    /// the callee's first `anything`/binds see them in original order) and
    /// running the rule's own environment frame.
    pub fn apply(&mut self, name: &str, args: Vec<Value>) -> ParseResult<Value> {
        let thunk = self
            .rules
            .get(name)
            .cloned()
            .ok_or_else(|| self.attach_rule(ParseFailure::unknown_rule(name)))?;
        if self.trace {
            trace!("apply {name} ({} args)", args.len());
        }
        for v in args.into_iter().rev() {
            self.stream.push(v);
        }
        self.envs.push(HashMap::new());
        self.current_rule.push(name.to_string());
        let result = thunk(self);
        self.current_rule.pop();
        self.envs.pop();
        result.map_err(|e| {
            if e.rule.is_none() {
                e.with_rule(name)
            } else {
                e
            }
        })
    }

    /// Zero or more repetitions, greedy. Always succeeds, collecting every
    /// repetition that matched into a `Value::Seq`; stops at the first
    /// failure and rewinds just that last attempt.
    pub fn many(&mut self, f: impl Fn(&mut Machine) -> ParseResult<Value>) -> ParseResult<Value> {
        let mut items = Vec::new();
        loop {
            let m = self.stream.mark();
            match f(self) {
                Ok(v) => {
                    self.stream.unmark(m);
                    items.push(v);
                }
                Err(_) => {
                    self.stream.rewind(m);
                    break;
                }
            }
        }
        Ok(Value::Seq(items))
    }

    /// One or more repetitions: same as `many` but fails if zero matched.
    pub fn many1(&mut self, f: impl Fn(&mut Machine) -> ParseResult<Value>) -> ParseResult<Value> {
        let first = f(self)?;
        let rest = self.many(f)?;
        let mut items = vec![first];
        if let Value::Seq(mut more) = rest {
            items.append(&mut more);
        }
        Ok(Value::Seq(items))
    }

    /// Ordered choice: tries each alternative in turn, committing to the
    /// first success. Each attempt is independently marked so a failing
    /// alternative never leaks partial consumption into the next one.
    /// Alternatives are compiled thunks rather than a generic closure type,
    /// since the rule compiler builds a heterogeneous `Vec` of them per
    /// `Node::Or` (SPEC_FULL.md §4.5).
    pub fn or_(&mut self, alts: &[Thunk]) -> ParseResult<Value> {
        for alt in alts {
            let alt = Rc::clone(alt);
            match self.attempt(move |m| alt(m)) {
                Ok(v) => return Ok(v),
                Err(_) => continue,
            }
        }
        Err(self.attach_rule(ParseFailure::no_alternative()))
    }

    /// Negative lookahead: succeeds, consuming nothing, iff `f` fails.
    /// Rewinds unconditionally — even when `f` itself would have succeeded,
    /// `not` must never let that consumption through.
    pub fn not_(&mut self, f: impl FnOnce(&mut Machine) -> ParseResult<Value>) -> ParseResult<Value> {
        let m = self.stream.mark();
        let outcome = f(self);
        self.stream.rewind(m);
        match outcome {
            Ok(_) => Err(self.attach_rule(ParseFailure::negative_lookahead_matched())),
            Err(_) => Ok(Value::Nil),
        }
    }

    /// Positive lookahead: succeeds iff `f` succeeds, but never consumes.
    pub fn lookahead(&mut self, f: impl FnOnce(&mut Machine) -> ParseResult<Value>) -> ParseResult<Value> {
        let m = self.stream.mark();
        let outcome = f(self);
        self.stream.rewind(m);
        outcome
    }

    /// Consumes zero or more whitespace tokens. Never fails.
    pub fn eat_whitespace(&mut self) -> ParseResult<Value> {
        self.many(|m| {
            let v = m.anything()?;
            match v.as_token_char() {
                Some(c) if c.is_whitespace() => Ok(v),
                _ => {
                    m.stream.prev();
                    Err(ParseFailure::mismatch())
                }
            }
        })
    }

    /// Matches a single newline token (`\n`), per spec.md §4.2. CRLF
    /// sequences are matched one token at a time by the grammar author
    /// composing `token("\r")` before this, exactly as the Python original
    /// leaves CR/LF composition to the grammar rather than normalizing it.
    pub fn newline(&mut self) -> ParseResult<Value> {
        match self.stream.next() {
            Some(v) if v.as_token_char() == Some('\n') => Ok(v),
            Some(_) => {
                self.stream.prev();
                Err(self.attach_rule(ParseFailure::expected_newline()))
            }
            None => Err(self.attach_rule(ParseFailure::end_of_input())),
        }
    }

    /// Matches a literal multi-character token after skipping leading
    /// whitespace — OMeta's `token` primitive (spec.md §4.2), used by
    /// grammars for keyword/punctuation matching.
    pub fn token(&mut self, text: &str) -> ParseResult<Value> {
        self.attempt(|m| {
            m.eat_whitespace()?;
            for expected in text.chars() {
                m.exactly(&Value::Token(expected))?;
            }
            Ok(Value::Str(text.to_string()))
        })
    }

    /// Matches an alphabetic character token.
    pub fn letter(&mut self) -> ParseResult<Value> {
        match self.stream.next() {
            Some(v) if matches!(v.as_token_char(), Some(c) if c.is_alphabetic()) => Ok(v),
            Some(_) => {
                self.stream.prev();
                Err(self.attach_rule(ParseFailure::mismatch()))
            }
            None => Err(self.attach_rule(ParseFailure::end_of_input())),
        }
    }

    /// Matches an alphanumeric character token, or an underscore.
    pub fn letter_or_digit(&mut self) -> ParseResult<Value> {
        match self.stream.next() {
            Some(v) if matches!(v.as_token_char(), Some(c) if c.is_alphanumeric() || c == '_') => Ok(v),
            Some(_) => {
                self.stream.prev();
                Err(self.attach_rule(ParseFailure::mismatch()))
            }
            None => Err(self.attach_rule(ParseFailure::end_of_input())),
        }
    }

    /// Matches a decimal-digit character token.
    pub fn digit(&mut self) -> ParseResult<Value> {
        match self.stream.next() {
            Some(v) if matches!(v.as_token_char(), Some(c) if c.is_ascii_digit()) => Ok(v),
            Some(_) => {
                self.stream.prev();
                Err(self.attach_rule(ParseFailure::mismatch()))
            }
            None => Err(self.attach_rule(ParseFailure::end_of_input())),
        }
    }

    /// Evaluates an already-parsed host expression against the current
    /// rule's local environment (spec.md §4.2's `pythonExpr`-successor).
    pub fn semantic(&mut self, expr: &HostExpr) -> ParseResult<Value> {
        crate::hostexpr::eval(expr, self.env()).map_err(|_| self.attach_rule(ParseFailure::mismatch()))
    }

    /// Scans raw host-expression text out of the input stream, the way
    /// `pythonExpr` does in the Python original: tracks bracket depth for
    /// `() [] {}` and quote state for `"..."` so nested calls/tuples don't
    /// terminate the scan early, and stops at a depth-0 newline or
    /// end-of-input. A depth-0 closing bracket with nothing open is a
    /// genuine error (`UnbalancedBrackets`), and so is reaching end-of-input
    /// with a bracket still open — `pythonExpr`'s bracket-stack check runs
    /// unconditionally after its scan loop exits, however it exits. Only an
    /// unclosed *string* is forgiven at end-of-input: quotes are never
    /// pushed onto that stack, so the Python original never raises for them
    /// (SPEC_FULL.md §4.2).
    pub fn host_expr(&mut self) -> ParseResult<String> {
        let mut depth: i32 = 0;
        let mut in_string = false;
        let mut text = String::new();
        loop {
            match self.stream.next() {
                None => break,
                Some(v) => {
                    let c = match v.as_token_char() {
                        Some(c) => c,
                        None => {
                            self.stream.prev();
                            break;
                        }
                    };
                    if in_string {
                        text.push(c);
                        if c == '"' {
                            in_string = false;
                        }
                        continue;
                    }
                    match c {
                        '"' => {
                            in_string = true;
                            text.push(c);
                        }
                        '(' | '[' | '{' => {
                            depth += 1;
                            text.push(c);
                        }
                        ')' | ']' | '}' if depth > 0 => {
                            depth -= 1;
                            text.push(c);
                        }
                        ')' | ']' | '}' => {
                            self.stream.prev();
                            return Err(self.attach_rule(ParseFailure::unbalanced_brackets()));
                        }
                        '\n' if depth == 0 => {
                            self.stream.prev();
                            break;
                        }
                        _ => text.push(c),
                    }
                }
            }
        }
        if depth > 0 {
            return Err(self.attach_rule(ParseFailure::unbalanced_brackets()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(s: &str) -> Machine {
        let tokens = s.chars().map(Value::Token).collect();
        Machine::new(InputStream::new(tokens), HashMap::new())
    }

    #[test]
    fn not_consumes_nothing_on_success_or_failure() {
        let mut m = machine("ab");
        let before = m.stream.farthest();
        assert!(m.not_(|m| m.exactly(&Value::Token('x'))).is_ok());
        assert_eq!(m.stream.farthest(), before);
        assert!(m.not_(|m| m.exactly(&Value::Token('a'))).is_err());
        assert_eq!(m.stream.farthest(), before);
        assert_eq!(m.anything().unwrap(), Value::Token('a'));
    }

    #[test]
    fn or_is_left_biased_and_tries_alternatives_in_order() {
        let mut m = machine("b");
        let alts: Vec<Thunk> = vec![
            Rc::new(|m: &mut Machine| m.exactly(&Value::Token('a'))),
            Rc::new(|m: &mut Machine| m.exactly(&Value::Token('b'))),
        ];
        let result = m.or_(&alts).unwrap();
        assert_eq!(result, Value::Token('b'));
    }

    #[test]
    fn or_commits_to_first_alternative_that_matches() {
        let mut m = machine("a");
        let alts: Vec<Thunk> = vec![
            Rc::new(|m: &mut Machine| m.exactly(&Value::Token('a'))),
            Rc::new(|_: &mut Machine| Err(ParseFailure::mismatch())),
        ];
        assert_eq!(m.or_(&alts).unwrap(), Value::Token('a'));
    }

    #[test]
    fn many_is_greedy_and_always_succeeds() {
        let mut m = machine("aaab");
        let result = m.many(|m| m.exactly(&Value::Token('a'))).unwrap();
        match result {
            Value::Seq(items) => assert_eq!(items.len(), 3),
            _ => panic!("expected Seq"),
        }
        assert_eq!(m.anything().unwrap(), Value::Token('b'));
    }

    #[test]
    fn many_on_immediate_failure_yields_empty_seq() {
        let mut m = machine("b");
        let result = m.many(|m| m.exactly(&Value::Token('a'))).unwrap();
        assert_eq!(result, Value::Seq(vec![]));
    }

    #[test]
    fn many1_fails_when_zero_matched() {
        let mut m = machine("b");
        assert!(m.many1(|m| m.exactly(&Value::Token('a'))).is_err());
    }

    #[test]
    fn apply_passes_arguments_through_the_stream() {
        let mut rules: HashMap<String, Thunk> = HashMap::new();
        rules.insert(
            "echo".to_string(),
            Rc::new(|m: &mut Machine| m.anything()),
        );
        let mut m = Machine::new(InputStream::new(vec![]), rules);
        let result = m.apply("echo", vec![Value::Int(42)]).unwrap();
        assert_eq!(result, Value::Int(42));
    }

    #[test]
    fn apply_unknown_rule_fails() {
        let mut m = machine("a");
        assert!(m.apply("nope", vec![]).is_err());
    }

    #[test]
    fn with_trace_toggles_the_trace_flag() {
        let m = machine("a");
        assert!(!m.trace);
        let m = m.with_trace(true);
        assert!(m.trace);
    }

    #[test]
    fn host_expr_stops_at_depth_zero_newline() {
        let mut m = machine("int(a) + int(b)\nrest");
        let text = m.host_expr().unwrap();
        assert_eq!(text, "int(a) + int(b)");
    }

    #[test]
    fn host_expr_tracks_nested_brackets_and_strings() {
        let mut m = machine("f(\"a)b\", (1, 2))\n");
        let text = m.host_expr().unwrap();
        assert_eq!(text, "f(\"a)b\", (1, 2))");
    }

    #[test]
    fn host_expr_errors_at_eof_with_open_bracket() {
        let mut m = machine("f(1, 2");
        assert!(m.host_expr().is_err());
    }

    #[test]
    fn host_expr_errors_on_stray_closing_bracket() {
        let mut m = machine(")\n");
        assert!(m.host_expr().is_err());
    }

    #[test]
    fn host_expr_ends_silently_at_eof_with_open_string() {
        let mut m = machine("\"unterminated");
        let text = m.host_expr().unwrap();
        assert_eq!(text, "\"unterminated");
    }
}
