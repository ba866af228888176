//! Property-based tests for normalization and sharing.

use proptest::prelude::{proptest, prop_assert, prop_assert_eq};
use rustc_hash::FxHashSet;

use crate::arbitrary::{arb_expr, text_is_tree};
use crate::{normalize, unshare, uniquify, ExprId, ExprKind, Module, NameId};

fn tree_names(module: &Module) -> FxHashSet<NameId> {
    module
        .names()
        .filter(|(id, _)| text_is_tree(module, *id))
        .map(|(id, _)| id)
        .collect()
}

/// Every `Node` reachable from `expr` must hold only immediate slots, and
/// its left/right identifiers must differ.
fn check_shared_form(module: &Module, expr: ExprId) {
    match &module[expr].kind {
        ExprKind::Ident(_) | ExprKind::Lit(_) => {}
        ExprKind::Node { left, value, right } => {
            assert!(module.is_immediate(*left), "left slot not immediate");
            assert!(module.is_immediate(*value), "value slot not immediate");
            assert!(module.is_immediate(*right), "right slot not immediate");
            if let (ExprKind::Ident(l), ExprKind::Ident(r)) =
                (&module[*left].kind, &module[*right].kind)
            {
                assert_ne!(l, r, "node still references the same identifier twice");
            }
        }
        ExprKind::Apply { args, .. } => {
            let mut seen_trees = FxHashSet::default();
            for &arg in args {
                assert!(module.is_immediate(arg), "call argument not immediate");
                if let ExprKind::Ident(name) = module[arg].kind {
                    if text_is_tree(module, name) {
                        assert!(
                            seen_trees.insert(name),
                            "call still references tree {name:?} twice"
                        );
                    }
                }
            }
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            check_shared_form(module, *cond);
            check_shared_form(module, *then_branch);
            check_shared_form(module, *else_branch);
        }
        ExprKind::Let { name, value, body } => {
            let value_free = module.free_names(*value);
            let mut body_free = module.free_names(*body);
            body_free.remove(name);
            for shared_name in value_free.intersection(&body_free) {
                assert!(
                    !text_is_tree(module, *shared_name),
                    "tree {shared_name:?} still free on both sides of a let"
                );
            }
            check_shared_form(module, *value);
            check_shared_form(module, *body);
        }
        ExprKind::Share { body, .. } => check_shared_form(module, *body),
    }
}

proptest! {
    /// `normalize(normalize(e))` is `normalize(e)`, and in fact the very
    /// same arena id thanks to the unchanged-children identity contract.
    #[test]
    fn normalize_idempotent(test_expr in arb_expr()) {
        let mut module = Module::new();
        let expr = test_expr.lower(&mut module);
        let once = normalize(&mut module, expr);
        let twice = normalize(&mut module, once);
        prop_assert_eq!(once, twice);
        prop_assert!(module.structurally_eq(once, twice));
    }

    /// After `unshare(normalize(uniquify(e)))` no tree constructor, call,
    /// or let references the same tree identifier twice, and every slot is
    /// immediate.
    #[test]
    fn unshare_establishes_shared_form(test_expr in arb_expr()) {
        let mut module = Module::new();
        let expr = test_expr.lower(&mut module);
        let expr = uniquify(&mut module, expr);
        let normal = normalize(&mut module, expr);
        let trees = tree_names(&module);
        let shared = unshare(&mut module, normal, &|n| trees.contains(&n)).unwrap();
        check_shared_form(&module, shared);
    }

    /// `unshare` is a no-op on already-shared expressions.
    #[test]
    fn unshare_idempotent(test_expr in arb_expr()) {
        let mut module = Module::new();
        let expr = test_expr.lower(&mut module);
        let normal = normalize(&mut module, expr);
        let trees = tree_names(&module);
        let once = unshare(&mut module, normal, &|n| trees.contains(&n)).unwrap();
        let twice = unshare(&mut module, once, &|n| trees.contains(&n)).unwrap();
        prop_assert_eq!(once, twice);
    }
}
