//! `AstBuilder`: the sole vocabulary the meta-parser uses to construct IR
//! (spec.md §4.3). Mirrors `pymeta.py`'s `AstBuilder` — a stateless bag of
//! factory functions, one per `Node` variant, so the meta-parser never
//! constructs a `Node` by hand.

use crate::hostexpr::HostExpr;
use crate::ir::Node;
use crate::value::Value;

pub struct AstBuilder;

impl AstBuilder {
    pub fn anything() -> Node {
        Node::Anything
    }

    pub fn exactly(v: Value) -> Node {
        Node::Exactly(v)
    }

    pub fn tok(text: impl Into<String>) -> Node {
        Node::Tok(text.into())
    }

    pub fn apply(rule: impl Into<String>, args: Vec<Node>) -> Node {
        Node::Apply(rule.into(), args)
    }

    pub fn sequence(parts: Vec<Node>) -> Node {
        Node::Sequence(parts)
    }

    pub fn or(alts: Vec<Node>) -> Node {
        Node::Or(alts)
    }

    pub fn many(child: Node) -> Node {
        Node::Many(Box::new(child))
    }

    pub fn many1(child: Node) -> Node {
        Node::Many1(Box::new(child))
    }

    pub fn not(child: Node) -> Node {
        Node::Not(Box::new(child))
    }

    pub fn lookahead(child: Node) -> Node {
        Node::Lookahead(Box::new(child))
    }

    pub fn bind(name: impl Into<String>, child: Node) -> Node {
        Node::Bind(name.into(), Box::new(child))
    }

    pub fn semantic(expr: HostExpr) -> Node {
        Node::Semantic(expr)
    }

    pub fn literal(v: Value) -> Node {
        Node::Literal(v)
    }

    /// Parses the raw text of a `=>` action (scanned by
    /// `Machine::host_expr`) into a `Semantic` node in one step, since the
    /// meta-parser only ever has the text, never a pre-built `HostExpr`.
    pub fn compile_host_expr(text: &str) -> Result<Node, crate::hostexpr::HostExprError> {
        crate::hostexpr::parse(text).map(Node::Semantic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_sequence_of_binds() {
        let n = AstBuilder::sequence(vec![
            AstBuilder::bind("a", AstBuilder::apply("letter", vec![])),
            AstBuilder::bind("b", AstBuilder::apply("letter", vec![])),
        ]);
        match n {
            Node::Sequence(parts) => assert_eq!(parts.len(), 2),
            _ => panic!("expected Sequence"),
        }
    }

    #[test]
    fn compiles_host_expr_text_into_semantic_node() {
        let n = AstBuilder::compile_host_expr("int(a) + int(b)").unwrap();
        assert!(matches!(n, Node::Semantic(_)));
    }
}
