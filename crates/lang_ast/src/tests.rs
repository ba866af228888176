use rustc_hash::FxHashSet;

use crate::{normalize, unshare, uniquify, ExprKind, Literal, Module, NameId, Source};

/// Everything in the test programs named `t…` is a tree.
fn tree_names(module: &Module) -> FxHashSet<NameId> {
    module
        .names()
        .filter(|(id, _)| crate::arbitrary::text_is_tree(module, *id))
        .map(|(id, _)| id)
        .collect()
}

#[test]
fn normalize_leaves_immediates_alone() {
    let mut module = Module::new();
    let t = module.name("t0");
    let x = module.ident(t);
    assert_eq!(normalize(&mut module, x), x);

    let n = module.num(3);
    assert_eq!(normalize(&mut module, n), n);
}

#[test]
fn normalize_returns_same_id_when_children_immediate() {
    let mut module = Module::new();
    let t = module.name("t0");
    let l = module.ident(t);
    let v = module.num(1);
    let r = module.leaf();
    let node = module.node(&[l, v, r]);
    assert_eq!(normalize(&mut module, node), node);
}

#[test]
fn normalize_binds_compound_children() {
    let mut module = Module::new();
    let t = module.name("t0");
    let l_inner = module.ident(t);
    let v_inner = module.num(1);
    let r_inner = module.leaf();
    let inner = module.node(&[l_inner, v_inner, r_inner]);
    let v = module.num(2);
    let r = module.leaf();
    // node (node t0 1 leaf) 2 leaf: the left slot must be let-bound.
    let outer = module.node(&[inner, v, r]);

    let normal = normalize(&mut module, outer);
    assert_ne!(normal, outer);
    let ExprKind::Let { value, body, .. } = &module[normal].kind else {
        panic!("expected synthesized let, got {:?}", module[normal].kind);
    };
    assert_eq!(*value, inner);
    let ExprKind::Node { left, .. } = &module[*body].kind else {
        panic!("expected rebuilt node, got {:?}", module[*body].kind);
    };
    assert!(matches!(module[*left].kind, ExprKind::Ident(_)));
    assert!(matches!(module[*body].source, Source::Anf { .. }));
}

#[test]
fn normalize_is_idempotent_on_nested_example() {
    let mut module = Module::new();
    let t = module.name("t0");
    let f = module.name("f0");
    let l_inner = module.ident(t);
    let v_inner = module.num(1);
    let r_inner = module.leaf();
    let inner = module.node(&[l_inner, v_inner, r_inner]);
    let arg2 = module.num(7);
    let call = module.apply(f, vec![inner, arg2]);
    let cond = module.bool(true);
    let other = module.leaf();
    let top = module.ite(cond, call, other);

    let once = normalize(&mut module, top);
    let twice = normalize(&mut module, once);
    assert_eq!(once, twice);
}

#[test]
fn unshare_splits_duplicated_node_operand() {
    let mut module = Module::new();
    let t = module.name("t0");
    let l = module.ident(t);
    let v = module.num(0);
    let r = module.ident(t);
    let node = module.node(&[l, v, r]);

    let trees = tree_names(&module);
    let shared = unshare(&mut module, node, &|n| trees.contains(&n)).unwrap();
    let ExprKind::Share {
        original,
        clones,
        body,
    } = &module[shared].kind
    else {
        panic!("expected share node, got {:?}", module[shared].kind);
    };
    assert_eq!(*original, t);
    assert_ne!(clones[0], clones[1]);
    let ExprKind::Node { left, right, .. } = &module[*body].kind else {
        panic!("expected rebuilt node");
    };
    let (ExprKind::Ident(ln), ExprKind::Ident(rn)) = (&module[*left].kind, &module[*right].kind)
    else {
        panic!("expected identifier slots");
    };
    assert_eq!((*ln, *rn), (clones[0], clones[1]));

    // Re-running unshare is a no-op.
    let again = unshare(&mut module, shared, &|n| trees.contains(&n)).unwrap();
    assert_eq!(again, shared);
}

#[test]
fn unshare_leaves_distinct_operands_alone() {
    let mut module = Module::new();
    let t0 = module.name("t0");
    let t1 = module.name("t1");
    let l = module.ident(t0);
    let v = module.num(0);
    let r = module.ident(t1);
    let node = module.node(&[l, v, r]);

    let trees = tree_names(&module);
    let shared = unshare(&mut module, node, &|n| trees.contains(&n)).unwrap();
    assert_eq!(shared, node);
}

#[test]
fn unshare_ignores_scalar_duplicates_in_calls() {
    let mut module = Module::new();
    let f = module.name("f0");
    let n = module.name("n0");
    let a1 = module.ident(n);
    let a2 = module.ident(n);
    let call = module.apply(f, vec![a1, a2]);

    let trees = tree_names(&module);
    let shared = unshare(&mut module, call, &|n| trees.contains(&n)).unwrap();
    assert_eq!(shared, call);
}

#[test]
fn unshare_splits_duplicated_tree_call_argument() {
    let mut module = Module::new();
    let f = module.name("f0");
    let t = module.name("t0");
    let a1 = module.ident(t);
    let a2 = module.ident(t);
    let call = module.apply(f, vec![a1, a2]);

    let trees = tree_names(&module);
    let shared = unshare(&mut module, call, &|n| trees.contains(&n)).unwrap();
    let ExprKind::Share {
        original, clones, body, ..
    } = &module[shared].kind
    else {
        panic!("expected share around call, got {:?}", module[shared].kind);
    };
    assert_eq!(*original, t);
    let ExprKind::Apply { args, .. } = &module[*body].kind else {
        panic!("expected rebuilt call");
    };
    let arg_names: Vec<_> = args
        .iter()
        .map(|&a| match module[a].kind {
            ExprKind::Ident(name) => name,
            ref other => panic!("expected identifier argument, got {other:?}"),
        })
        .collect();
    assert_eq!(arg_names, vec![clones[0], clones[1]]);
}

#[test]
fn unshare_mediates_duplication_across_let() {
    let mut module = Module::new();
    let t = module.name("t0");
    let x = module.name("x0");
    let l1 = module.ident(t);
    let v1 = module.num(0);
    let r1 = module.leaf();
    let first = module.node(&[l1, v1, r1]);
    let l2 = module.ident(t);
    let v2 = module.num(0);
    let r2 = module.leaf();
    let second = module.node(&[l2, v2, r2]);
    // let x0 = node t0 0 leaf in node t0 0 leaf: both sides evaluate, so
    // the two uses of t0 must be split even though no single node holds
    // them both.
    let expr = module.let_in(x, first, second);

    let trees = tree_names(&module);
    let shared = unshare(&mut module, expr, &|n| trees.contains(&n)).unwrap();
    let ExprKind::Share {
        original,
        clones,
        body,
    } = &module[shared].kind
    else {
        panic!("expected share around let, got {:?}", module[shared].kind);
    };
    assert_eq!(*original, t);
    assert_ne!(clones[0], clones[1]);
    let ExprKind::Let {
        value,
        body: let_body,
        ..
    } = &module[*body].kind
    else {
        panic!("expected rebuilt let");
    };
    let ExprKind::Node { left: vl, .. } = &module[*value].kind else {
        panic!("expected bound node");
    };
    let ExprKind::Node { left: bl, .. } = &module[*let_body].kind else {
        panic!("expected body node");
    };
    let (ExprKind::Ident(vn), ExprKind::Ident(bn)) = (&module[*vl].kind, &module[*bl].kind) else {
        panic!("expected identifier slots");
    };
    assert_eq!((*vn, *bn), (clones[0], clones[1]));

    // Re-running unshare is a no-op.
    let again = unshare(&mut module, shared, &|n| trees.contains(&n)).unwrap();
    assert_eq!(again, shared);
}

#[test]
fn unshare_leaves_binder_shadowing_alone() {
    let mut module = Module::new();
    let t = module.name("t0");
    let value = module.ident(t);
    let body = module.ident(t);
    // let t0 = t0 in t0: the body use refers to the binding, not to a
    // second use of the outer tree.
    let expr = module.let_in(t, value, body);

    let trees = tree_names(&module);
    let shared = unshare(&mut module, expr, &|n| trees.contains(&n)).unwrap();
    assert_eq!(shared, expr);
}

#[test]
fn uniquify_freshens_shadowing_binder() {
    let mut module = Module::new();
    let t = module.name("t0");
    let x = module.name("x0");
    let inner_val = module.num(0);
    let inner_use = module.ident(t);
    let inner = module.let_in(t, inner_val, inner_use);
    let outer_use = module.ident(t);
    // let x0 = (let t0 = 0 in t0) in t0: the inner binder must move out of
    // the way of the free t0.
    let expr = module.let_in(x, inner, outer_use);

    let renamed = uniquify(&mut module, expr);
    assert_ne!(renamed, expr);
    let ExprKind::Let { value, body, .. } = &module[renamed].kind else {
        panic!("expected outer let, got {:?}", module[renamed].kind);
    };
    assert!(matches!(module[*body].kind, ExprKind::Ident(name) if name == t));
    let ExprKind::Let {
        name: inner_name,
        body: inner_body,
        ..
    } = &module[*value].kind
    else {
        panic!("expected inner let");
    };
    assert_ne!(*inner_name, t);
    assert!(matches!(module[*inner_body].kind, ExprKind::Ident(name) if name == *inner_name));
    assert!(matches!(module[renamed].source, Source::Renamed { .. }));
}

#[test]
fn uniquify_is_identity_without_shadowing() {
    let mut module = Module::new();
    let t = module.name("t0");
    let x = module.name("x0");
    let v = module.ident(t);
    let b = module.ident(x);
    let expr = module.let_in(x, v, b);
    assert_eq!(uniquify(&mut module, expr), expr);
}

#[test]
fn unshare_rejects_compound_node_slot() {
    let mut module = Module::new();
    let t = module.name("t0");
    let l_inner = module.ident(t);
    let v_inner = module.num(1);
    let r_inner = module.leaf();
    let inner = module.node(&[l_inner, v_inner, r_inner]);
    let v = module.num(2);
    let r = module.leaf();
    let outer = module.node(&[inner, v, r]);

    let trees = tree_names(&module);
    let err = unshare(&mut module, outer, &|n| trees.contains(&n)).unwrap_err();
    assert!(matches!(
        err,
        crate::ImproperFormError::NodeSlotNotImmediate { .. }
    ));
}

#[test]
#[should_panic(expected = "exactly three slots")]
fn node_constructor_rejects_wrong_arity() {
    let mut module = Module::new();
    let l = module.leaf();
    let v = module.num(1);
    module.node(&[l, v]);
}

#[test]
fn free_names_sees_share_original_but_not_clones() {
    let mut module = Module::new();
    let t = module.name("t0");
    let l = module.ident(t);
    let v = module.num(0);
    let r = module.ident(t);
    let node = module.node(&[l, v, r]);
    let trees = tree_names(&module);
    let shared = unshare(&mut module, node, &|n| trees.contains(&n)).unwrap();

    let free = module.free_names(shared);
    assert!(free.contains(&t));
    assert_eq!(free.len(), 1);
}

#[test]
fn literal_leaf_slots_are_not_shared() {
    let mut module = Module::new();
    let l = module.leaf();
    let v = module.num(0);
    let r = module.leaf();
    let node = module.node(&[l, v, r]);

    let trees = tree_names(&module);
    let shared = unshare(&mut module, node, &|n| trees.contains(&n)).unwrap();
    assert_eq!(shared, node);
    assert!(matches!(
        module[node].kind,
        ExprKind::Node { .. }
    ));
    assert!(matches!(module[l].kind, ExprKind::Lit(Literal::Leaf)));
}
