//! Grammar Factory (GF): turns grammar source text into a callable object
//! (spec.md §4.6). `CompiledGrammar::apply` runs one named rule against a
//! fresh input, rejects trailing input, and joins a pure-character-sequence
//! result into a plain string the way `HandyWrapper` does in the Python
//! original (SPEC_FULL.md §8).

use std::collections::HashMap;
use std::fs::File;
use std::io::Read as _;
use std::path::Path;
use std::rc::Rc;

use encoding_rs::UTF_8;
use encoding_rs_io::DecodeReaderBytesBuilder;
use log::debug;

use crate::compiler::{self, ensure_rule_exists};
use crate::config::GrammarConfig;
use crate::error::EngineError;
use crate::interpreter::{Machine, Thunk};
use crate::metaparser;
use crate::stream::InputStream;
use crate::value::Value;

/// Compiled, ready-to-run grammar. Cheap to clone (every rule body is an
/// `Rc`-shared closure); each `apply` call builds its own `Machine` so
/// concurrent calls against the same `CompiledGrammar` don't share stream
/// state (spec.md §5).
#[derive(Clone)]
pub struct CompiledGrammar {
    rules: HashMap<String, Thunk>,
    config: GrammarConfig,
}

impl CompiledGrammar {
    pub fn compile(source: &str) -> Result<Self, EngineError> {
        Self::compile_with_config(source, GrammarConfig::default())
    }

    pub fn compile_with_config(source: &str, config: GrammarConfig) -> Result<Self, EngineError> {
        if config.trace {
            debug!("compiling grammar '{}'", config.name);
        }
        let defs = metaparser::parse_grammar(source)?;
        let mut rules = builtin_rules();
        for def in defs {
            rules.insert(def.name.clone(), compiler::compile_rule(def.params, &def.body));
        }
        Ok(CompiledGrammar { rules, config })
    }

    /// Reads grammar source from a file with lossy UTF-8 decoding (the
    /// ambient file-loading convenience named in SPEC_FULL.md §7), then
    /// compiles it the same way `compile` does.
    pub fn compile_file(path: &Path) -> Result<Self, EngineError> {
        let file = File::open(path)
            .map_err(|e| EngineError::Io(format!("could not open {}: {e}", path.display())))?;
        let mut decoder = DecodeReaderBytesBuilder::new().encoding(Some(UTF_8)).build(file);
        let mut source = String::new();
        decoder
            .read_to_string(&mut source)
            .map_err(|e| EngineError::Io(format!("could not read {}: {e}", path.display())))?;
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("grammar").to_string();
        Self::compile_with_config(&source, GrammarConfig { name, trace: false })
    }

    pub fn rule_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rules.keys().cloned().collect();
        names.sort();
        names
    }

    /// Runs `rule` against the whole of `input`. Fails if any input is
    /// left unconsumed (spec.md §4.6's trailing-garbage check); collapses
    /// a pure-character-sequence result into `Value::Str`.
    pub fn apply(&self, rule: &str, input: &str) -> Result<Value, EngineError> {
        ensure_rule_exists(&self.rules, rule)?;
        if self.config.trace {
            debug!("[{}] applying rule '{}'", self.config.name, rule);
        }
        let tokens: Vec<Value> = input.chars().map(Value::Token).collect();
        let mut m = Machine::new(InputStream::new(tokens), self.rules.clone()).with_trace(self.config.trace);
        let result = m.apply(rule, Vec::new())?;
        if m.stream.has_remaining() {
            let preview: String = m.stream.peek_preview(32).iter().filter_map(|v| v.as_token_char()).collect();
            return Err(EngineError::TrailingGarbage { rule: rule.to_string(), remaining: preview });
        }
        Ok(flatten(result))
    }
}

/// Collapses a `Value::Seq` of characters into a plain `Value::Str`;
/// passes every other shape through unchanged. `HandyWrapper`'s join
/// behavior (SPEC_FULL.md §8).
fn flatten(v: Value) -> Value {
    if v.is_char_seq() {
        Value::Str(v.to_string())
    } else {
        v
    }
}

/// The primitive rules every grammar gets for free, mirroring the base
/// `OMeta` class's built-in rule methods in the Python original
/// (`rule_anything`, `rule_letter`, ...). User-defined rules of the same
/// name, inserted after these in `compile_with_config`, take precedence.
fn builtin_rules() -> HashMap<String, Thunk> {
    let mut m: HashMap<String, Thunk> = HashMap::new();
    m.insert("anything".to_string(), Rc::new(|m: &mut Machine| m.anything()));
    m.insert("letter".to_string(), Rc::new(|m: &mut Machine| m.letter()));
    m.insert("letterOrDigit".to_string(), Rc::new(|m: &mut Machine| m.letter_or_digit()));
    m.insert("digit".to_string(), Rc::new(|m: &mut Machine| m.digit()));
    m.insert("spaces".to_string(), Rc::new(|m: &mut Machine| m.eat_whitespace()));
    m.insert("newline".to_string(), Rc::new(|m: &mut Machine| m.newline()));
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_grammar_matches_single_digit() {
        let g = CompiledGrammar::compile("one ::= '7'\n").unwrap();
        assert_eq!(g.apply("one", "7").unwrap(), Value::Token('7'));
        assert!(g.apply("one", "8").is_err());
    }

    #[test]
    fn num_grammar_collects_digits_and_parses_int() {
        let g = CompiledGrammar::compile("num ::= <digit>+:ds => int(ds)\n").unwrap();
        assert_eq!(g.apply("num", "1234").unwrap(), Value::Int(1234));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let g = CompiledGrammar::compile("num ::= <digit>+:ds => int(ds)\n").unwrap();
        assert!(matches!(g.apply("num", "12x"), Err(EngineError::TrailingGarbage { .. })));
    }

    #[test]
    fn pair_grammar_builds_a_pair_value() {
        let g = CompiledGrammar::compile("pair ::= <letter>:a <letter>:b => (a, b)\n").unwrap();
        let result = g.apply("pair", "xy").unwrap();
        assert_eq!(result, Value::pair(Value::Token('x'), Value::Token('y')));
    }

    #[test]
    fn expr_grammar_adds_two_numbers() {
        let src = "num ::= <digit>+:ds => int(ds)\nexpr ::= <num>:a '+' <num>:b => int(a) + int(b)\n";
        let g = CompiledGrammar::compile(src).unwrap();
        assert_eq!(g.apply("expr", "12+7").unwrap(), Value::Int(19));
    }

    #[test]
    fn negative_lookahead_grammar() {
        let g = CompiledGrammar::compile("notA ::= ~'a' <anything>\n").unwrap();
        assert_eq!(g.apply("notA", "b").unwrap(), Value::Token('b'));
        assert!(g.apply("notA", "a").is_err());
    }

    #[test]
    fn whitespace_token_rule_skips_leading_spaces() {
        let g = CompiledGrammar::compile("greet ::= \"hi\"\n").unwrap();
        assert_eq!(g.apply("greet", "  hi").unwrap(), Value::Str("hi".to_string()));
    }

    #[test]
    fn unknown_rule_is_rejected_before_running() {
        let g = CompiledGrammar::compile("one ::= '1'\n").unwrap();
        assert!(g.apply("missing", "1").is_err());
    }

    #[test]
    fn rule_names_lists_user_and_builtin_rules() {
        let g = CompiledGrammar::compile("one ::= '1'\n").unwrap();
        let names = g.rule_names();
        assert!(names.contains(&"one".to_string()));
        assert!(names.contains(&"anything".to_string()));
    }
}
