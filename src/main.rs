use std::env;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process;

use ometa_engine::grammar::CompiledGrammar;

/// Not a polished CLI (that's explicitly out of scope) — just enough to
/// exercise the library by hand, in the spirit of the teacher crate's
/// `run_file`/`run_prompt` pair: one mode reads a grammar file and a rule
/// name from argv and applies it to stdin; with no arguments it drops into
/// a tiny prompt for ad-hoc experiments against a hardcoded demo grammar.
fn main() {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => run_prompt(),
        3 => run_file(&args[1], &args[2]),
        _ => {
            eprintln!("usage: ometa <grammar-file> <rule-name>   (reads input from stdin)");
            process::exit(64);
        }
    }
}

fn run_file(grammar_path: &str, rule: &str) {
    let grammar = match CompiledGrammar::compile_file(Path::new(grammar_path)) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("could not compile {grammar_path}: {e}");
            process::exit(65);
        }
    };
    let mut input = String::new();
    if io::stdin().read_to_string(&mut input).is_err() {
        eprintln!("could not read stdin");
        process::exit(66);
    }
    match grammar.apply(rule, input.trim_end_matches('\n')) {
        Ok(value) => println!("{value}"),
        Err(e) => {
            eprintln!("{e}");
            process::exit(70);
        }
    }
}

const DEMO_GRAMMAR: &str = "num ::= <digit>+:ds => int(ds)\n";

fn run_prompt() {
    let grammar = CompiledGrammar::compile(DEMO_GRAMMAR).expect("demo grammar is well-formed");
    println!("ometa demo prompt - grammar rule 'num' parses a run of digits. Ctrl-D to quit.");
    let mut line = String::new();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        line.clear();
        let bytes = io::stdin().read_line(&mut line).unwrap_or(0);
        if bytes == 0 {
            break;
        }
        let trimmed = line.trim_end_matches('\n');
        if trimmed.is_empty() {
            continue;
        }
        match grammar.apply("num", trimmed) {
            Ok(value) => println!("{value}"),
            Err(e) => println!("error: {e}"),
        }
    }
}
