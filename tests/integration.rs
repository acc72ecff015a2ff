//! End-to-end scenarios exercising the full pipeline (grammar text ->
//! `CompiledGrammar` -> `apply`), covering spec.md §8's worked examples.

use ometa_engine::{CompiledGrammar, EngineError, Value};

#[test]
fn digit_grammar_accepts_and_rejects() {
    let g = CompiledGrammar::compile("digit9 ::= '9'\n").unwrap();
    assert_eq!(g.apply("digit9", "9").unwrap(), Value::Token('9'));
    assert!(g.apply("digit9", "8").is_err());
}

#[test]
fn num_grammar_parses_a_run_of_digits_into_an_int() {
    let g = CompiledGrammar::compile("num ::= <digit>+:ds => int(ds)\n").unwrap();
    assert_eq!(g.apply("num", "2024").unwrap(), Value::Int(2024));
}

#[test]
fn whitespace_skipping_token_grammar() {
    let g = CompiledGrammar::compile("greet ::= \"hello\"\n").unwrap();
    assert_eq!(g.apply("greet", "   hello").unwrap(), Value::Str("hello".to_string()));
    assert!(g.apply("greet", "goodbye").is_err());
}

#[test]
fn pair_grammar_binds_two_letters_into_a_tuple() {
    let g = CompiledGrammar::compile("pair ::= <letter>:a <letter>:b => (a, b)\n").unwrap();
    assert_eq!(g.apply("pair", "xy").unwrap(), Value::pair(Value::Token('x'), Value::Token('y')));
}

#[test]
fn expr_grammar_adds_two_parsed_numbers() {
    let src = "num ::= <digit>+:ds => int(ds)\nexpr ::= <num>:a '+' <num>:b => int(a) + int(b)\n";
    let g = CompiledGrammar::compile(src).unwrap();
    assert_eq!(g.apply("expr", "15+27").unwrap(), Value::Int(42));
}

#[test]
fn not_a_rejects_the_excluded_character_only() {
    let g = CompiledGrammar::compile("notA ::= ~'a' <anything>\n").unwrap();
    assert_eq!(g.apply("notA", "z").unwrap(), Value::Token('z'));
    assert!(g.apply("notA", "a").is_err());
}

#[test]
fn ordered_choice_picks_first_matching_alternative() {
    let g = CompiledGrammar::compile("vowel ::= 'a' | 'e' | 'i' | 'o' | 'u'\n").unwrap();
    for c in ['a', 'e', 'i', 'o', 'u'] {
        assert_eq!(g.apply("vowel", &c.to_string()).unwrap(), Value::Token(c));
    }
    assert!(g.apply("vowel", "x").is_err());
}

#[test]
fn recursive_rule_application_matches_a_run_of_letters() {
    let src = "word ::= <letter>:c <word>:rest => concat(str(c), rest) | <letter>:c => str(c)\n";
    let g = CompiledGrammar::compile(src).unwrap();
    assert_eq!(g.apply("word", "cat").unwrap(), Value::Str("cat".to_string()));
}

#[test]
fn trailing_garbage_after_a_full_match_is_rejected() {
    let g = CompiledGrammar::compile("one ::= '1'\n").unwrap();
    match g.apply("one", "12") {
        Err(EngineError::TrailingGarbage { rule, remaining }) => {
            assert_eq!(rule, "one");
            assert_eq!(remaining, "2");
        }
        other => panic!("expected TrailingGarbage, got {other:?}"),
    }
}

#[test]
fn applying_an_undefined_rule_fails_without_running() {
    let g = CompiledGrammar::compile("one ::= '1'\n").unwrap();
    assert!(g.apply("two", "1").is_err());
}

#[test]
fn rule_with_parameter_receives_its_argument() {
    let src = "echoes(x) ::= <anything> => x\nlit ::= <echoes(true)>\n";
    let g = CompiledGrammar::compile(src).unwrap();
    assert_eq!(g.apply("lit", "z").unwrap(), Value::Bool(true));
}

#[test]
fn meta_grammar_source_round_trips_through_the_full_pipeline() {
    let g = CompiledGrammar::compile(ometa_engine::metaparser::META_GRAMMAR_SOURCE).unwrap();
    assert_eq!(g.apply("num", "42").unwrap(), Value::Int(42));
    assert_eq!(g.apply("pair", "ab").unwrap(), Value::pair(Value::Token('a'), Value::Token('b')));
    assert_eq!(g.apply("expr", "40+2").unwrap(), Value::Int(42));
}
