//! Rule Compiler (RC): lowers IR (`Node`) into the executable `Thunk`
//! closures the interpreter runs (spec.md §4.5). Each `Node` is compiled
//! exactly once, at grammar-compile time; the resulting closure re-does its
//! work on every call, which is what makes repetition (`many`/`or`) replay
//! correctly without any explicit thunk/force distinction — see
//! SPEC_FULL.md §4.5.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::ParseFailure;
use crate::ir::Node;
use crate::interpreter::{Machine, Thunk};
use crate::value::Value;

/// Lowers a single IR node into a `Thunk`. Recursive: compound nodes
/// compile their children first and close over the resulting thunks.
pub fn compile_node(node: &Node) -> Thunk {
    match node {
        Node::Anything => Rc::new(|m: &mut Machine| m.anything()),

        Node::Exactly(v) => {
            let v = v.clone();
            Rc::new(move |m: &mut Machine| m.exactly(&v))
        }

        Node::Tok(text) => {
            let text = text.clone();
            Rc::new(move |m: &mut Machine| m.token(&text))
        }

        Node::Literal(v) => {
            let v = v.clone();
            Rc::new(move |_m: &mut Machine| Ok(v.clone()))
        }

        Node::Apply(name, arg_nodes) => {
            let name = name.clone();
            let arg_thunks: Vec<Thunk> = arg_nodes.iter().map(compile_node).collect();
            Rc::new(move |m: &mut Machine| {
                let mut args = Vec::with_capacity(arg_thunks.len());
                for t in &arg_thunks {
                    args.push(t(m)?);
                }
                m.apply(&name, args)
            })
        }

        Node::Sequence(parts) => {
            let thunks: Vec<Thunk> = parts.iter().map(compile_node).collect();
            Rc::new(move |m: &mut Machine| {
                m.attempt(|m| {
                    let mut last = Value::Nil;
                    for t in &thunks {
                        last = t(m)?;
                    }
                    Ok(last)
                })
            })
        }

        Node::Or(alts) => {
            let thunks: Vec<Thunk> = alts.iter().map(compile_node).collect();
            Rc::new(move |m: &mut Machine| m.or_(&thunks))
        }

        Node::Many(child) => {
            let t = compile_node(child);
            Rc::new(move |m: &mut Machine| {
                let t = Rc::clone(&t);
                m.many(move |m| t(m))
            })
        }

        Node::Many1(child) => {
            let t = compile_node(child);
            Rc::new(move |m: &mut Machine| {
                let t = Rc::clone(&t);
                m.many1(move |m| t(m))
            })
        }

        Node::Not(child) => {
            let t = compile_node(child);
            Rc::new(move |m: &mut Machine| {
                let t = Rc::clone(&t);
                m.not_(move |m| t(m))
            })
        }

        Node::Lookahead(child) => {
            let t = compile_node(child);
            Rc::new(move |m: &mut Machine| {
                let t = Rc::clone(&t);
                m.lookahead(move |m| t(m))
            })
        }

        Node::Bind(name, child) => {
            let name = name.clone();
            let t = compile_node(child);
            Rc::new(move |m: &mut Machine| {
                let v = t(m)?;
                m.bind(&name, v.clone());
                Ok(v)
            })
        }

        Node::Semantic(expr) => {
            let expr = expr.clone();
            Rc::new(move |m: &mut Machine| m.semantic(&expr))
        }
    }
}

/// Lowers a whole grammar's worth of named rule definitions into the rule
/// table `Machine::apply` dispatches through. Parameter binding is
/// prepended to each rule's body: one `anything()` + `bind()` per formal,
/// consuming the arguments `apply` pushed back onto the stream in order.
pub fn compile_rules(defs: Vec<(String, Vec<String>, Node)>) -> HashMap<String, Thunk> {
    let mut table = HashMap::new();
    for (name, params, body_node) in defs {
        table.insert(name, compile_rule(params, &body_node));
    }
    table
}

/// Lowers one rule definition (formal parameters plus body) into a single
/// callable `Thunk`, prepending the parameter-binding prologue described
/// below `bind_params`.
pub fn compile_rule(params: Vec<String>, body_node: &Node) -> Thunk {
    let body = compile_node(body_node);
    bind_params(params, body)
}

fn bind_params(params: Vec<String>, body: Thunk) -> Thunk {
    if params.is_empty() {
        return body;
    }
    Rc::new(move |m: &mut Machine| {
        for p in &params {
            let v = m.anything()?;
            m.bind(p, v);
        }
        body(m)
    })
}

/// Helper used by the grammar factory to report a clean "rule does not
/// exist" failure before even attempting a call, rather than letting
/// `Machine::apply` surface an `UnknownRule` mid-parse.
pub fn ensure_rule_exists(table: &HashMap<String, Thunk>, name: &str) -> Result<(), ParseFailure> {
    if table.contains_key(name) {
        Ok(())
    } else {
        Err(ParseFailure::unknown_rule(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::AstBuilder;
    use crate::stream::InputStream;

    fn run(table: HashMap<String, Thunk>, rule: &str, input: &str) -> Result<Value, ParseFailure> {
        let tokens = input.chars().map(Value::Token).collect();
        let mut m = Machine::new(InputStream::new(tokens), table);
        m.apply(rule, vec![])
    }

    #[test]
    fn compiles_sequence_of_exactly() {
        let body = AstBuilder::sequence(vec![
            AstBuilder::exactly(Value::Token('a')),
            AstBuilder::exactly(Value::Token('b')),
        ]);
        let table = compile_rules(vec![("ab".to_string(), vec![], body)]);
        assert_eq!(run(table, "ab", "ab").unwrap(), Value::Token('b'));
    }

    #[test]
    fn compiles_many1_of_exactly() {
        let table = compile_rules(vec![(
            "num".to_string(),
            vec![],
            AstBuilder::many1(AstBuilder::exactly(Value::Token('1'))),
        )]);
        let result = run(table, "num", "111x").unwrap();
        match result {
            Value::Seq(items) => assert_eq!(items.len(), 3),
            _ => panic!("expected Seq"),
        }
    }

    #[test]
    fn compiles_bind_and_semantic_action() {
        let body = AstBuilder::sequence(vec![
            AstBuilder::bind("a", AstBuilder::exactly(Value::Token('x'))),
            AstBuilder::compile_host_expr("a").unwrap(),
        ]);
        let table = compile_rules(vec![("r".to_string(), vec![], body)]);
        assert_eq!(run(table, "r", "x").unwrap(), Value::Token('x'));
    }

    #[test]
    fn compiles_rule_with_parameters() {
        let body = AstBuilder::compile_host_expr("x").unwrap();
        let table = compile_rules(vec![("identity".to_string(), vec!["x".to_string()], body)]);
        let mut m = Machine::new(InputStream::new(vec![]), table);
        let result = m.apply("identity", vec![Value::Int(7)]).unwrap();
        assert_eq!(result, Value::Int(7));
    }
}
