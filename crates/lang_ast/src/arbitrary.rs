//! Proptest strategies for random expressions.
//!
//! Strategies build a surface `TestExpr` tree (arena-free, so proptest can
//! own it) which tests then lower into a fresh `Module`. Variable pools are
//! deliberately tiny so that duplicated tree identifiers, the interesting
//! case for the sharing transformer, show up often.

use proptest::prelude::{any, prop, prop_oneof, BoxedStrategy, Just, Strategy};

use crate::{ExprId, Module, NameId};

/// Names starting with `t` denote trees in generated programs; clones keep
/// the prefix, so this predicate survives `unshare`.
pub fn text_is_tree(module: &Module, name: NameId) -> bool {
    module[name].text.starts_with('t')
}

#[derive(Debug, Clone)]
pub enum TestExpr {
    TreeVar(u8),
    NumVar(u8),
    Num(i64),
    Bool(bool),
    Leaf,
    Node(Box<TestExpr>, Box<TestExpr>, Box<TestExpr>),
    Apply(u8, Vec<TestExpr>),
    If(Box<TestExpr>, Box<TestExpr>, Box<TestExpr>),
    LetTree(u8, Box<TestExpr>, Box<TestExpr>),
}

impl TestExpr {
    pub fn lower(&self, module: &mut Module) -> ExprId {
        match self {
            TestExpr::TreeVar(i) => {
                let name = module.name(format!("t{i}"));
                module.ident(name)
            }
            TestExpr::NumVar(i) => {
                let name = module.name(format!("n{i}"));
                module.ident(name)
            }
            TestExpr::Num(n) => module.num(*n),
            TestExpr::Bool(b) => module.bool(*b),
            TestExpr::Leaf => module.leaf(),
            TestExpr::Node(l, v, r) => {
                let l = l.lower(module);
                let v = v.lower(module);
                let r = r.lower(module);
                module.node(&[l, v, r])
            }
            TestExpr::Apply(f, args) => {
                let callee = module.name(format!("f{f}"));
                let args = args.iter().map(|a| a.lower(module)).collect();
                module.apply(callee, args)
            }
            TestExpr::If(c, t, e) => {
                let c = c.lower(module);
                let t = t.lower(module);
                let e = e.lower(module);
                module.ite(c, t, e)
            }
            TestExpr::LetTree(i, v, b) => {
                let name = module.name(format!("t{i}"));
                let v = v.lower(module);
                let b = b.lower(module);
                module.let_in(name, v, b)
            }
        }
    }
}

fn arb_leaf() -> impl Strategy<Value = TestExpr> {
    prop_oneof![
        (0u8..3).prop_map(TestExpr::TreeVar),
        (0u8..2).prop_map(TestExpr::NumVar),
        any::<i64>().prop_map(TestExpr::Num),
        any::<bool>().prop_map(TestExpr::Bool),
        Just(TestExpr::Leaf),
    ]
}

pub fn arb_expr() -> BoxedStrategy<TestExpr> {
    arb_leaf()
        .prop_recursive(5, 48, 3, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone(), inner.clone()).prop_map(|(l, v, r)| {
                    TestExpr::Node(Box::new(l), Box::new(v), Box::new(r))
                }),
                (0u8..2, prop::collection::vec(inner.clone(), 1..4))
                    .prop_map(|(f, args)| TestExpr::Apply(f, args)),
                (inner.clone(), inner.clone(), inner.clone()).prop_map(|(c, t, e)| {
                    TestExpr::If(Box::new(c), Box::new(t), Box::new(e))
                }),
                (0u8..3, inner.clone(), inner.clone()).prop_map(|(i, v, b)| {
                    TestExpr::LetTree(i, Box::new(v), Box::new(b))
                }),
            ]
        })
        .boxed()
}
