//! Alpha-renaming: make every binder in an expression unique.
//!
//! Downstream tables are keyed by `NameId`, so a binder that reuses an
//! already-known name would make those entries ambiguous under shadowing.
//! `uniquify` freshens every shadowing binder and rewrites its uses;
//! non-shadowing expressions come back as the same `ExprId`.

use log::trace;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{ExprId, ExprKind, Module, NameId, Source};

/// Rename binders apart. Free names of `expr` are kept as-is; a `Let`
/// binder or `Share` clone whose name was already free or already bound is
/// replaced with a fresh name, and its uses follow.
pub fn uniquify(module: &mut Module, expr: ExprId) -> ExprId {
    let mut seen = module.free_names(expr);
    let mut env = FxHashMap::default();
    walk(module, expr, &mut seen, &mut env)
}

fn walk(
    module: &mut Module,
    expr: ExprId,
    seen: &mut FxHashSet<NameId>,
    env: &mut FxHashMap<NameId, NameId>,
) -> ExprId {
    match module[expr].kind.clone() {
        ExprKind::Ident(name) => match env.get(&name) {
            Some(&to) if to != name => {
                module.alloc(ExprKind::Ident(to), Source::Renamed { origin: expr })
            }
            _ => expr,
        },
        ExprKind::Lit(_) => expr,
        ExprKind::Node { left, value, right } => {
            let left2 = walk(module, left, seen, env);
            let value2 = walk(module, value, seen, env);
            let right2 = walk(module, right, seen, env);
            if (left2, value2, right2) == (left, value, right) {
                expr
            } else {
                module.alloc(
                    ExprKind::Node {
                        left: left2,
                        value: value2,
                        right: right2,
                    },
                    Source::Renamed { origin: expr },
                )
            }
        }
        ExprKind::Apply { callee, args } => {
            let args2: Vec<_> = args.iter().map(|&a| walk(module, a, seen, env)).collect();
            if args2 == args {
                expr
            } else {
                module.alloc(
                    ExprKind::Apply {
                        callee,
                        args: args2,
                    },
                    Source::Renamed { origin: expr },
                )
            }
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let cond2 = walk(module, cond, seen, env);
            let then2 = walk(module, then_branch, seen, env);
            let else2 = walk(module, else_branch, seen, env);
            if (cond2, then2, else2) == (cond, then_branch, else_branch) {
                expr
            } else {
                module.alloc(
                    ExprKind::If {
                        cond: cond2,
                        then_branch: then2,
                        else_branch: else2,
                    },
                    Source::Renamed { origin: expr },
                )
            }
        }
        ExprKind::Let { name, value, body } => {
            let value2 = walk(module, value, seen, env);
            let name2 = if seen.insert(name) {
                name
            } else {
                let text = module[name].text.clone();
                let fresh = module.fresh_name(&text);
                trace!("binder {name:?} shadows, renamed to {fresh:?}");
                fresh
            };
            let prev = env.insert(name, name2);
            let body2 = walk(module, body, seen, env);
            restore(env, name, prev);
            if (name2, value2, body2) == (name, value, body) {
                expr
            } else {
                module.alloc(
                    ExprKind::Let {
                        name: name2,
                        value: value2,
                        body: body2,
                    },
                    Source::Renamed { origin: expr },
                )
            }
        }
        ExprKind::Share {
            original,
            clones,
            body,
        } => {
            let original2 = env.get(&original).copied().unwrap_or(original);
            let mut clones2 = clones;
            let mut prev = [None, None];
            for i in 0..2 {
                if !seen.insert(clones[i]) {
                    let text = module[clones[i]].text.clone();
                    clones2[i] = module.fresh_name(&text);
                }
                prev[i] = env.insert(clones[i], clones2[i]);
            }
            let body2 = walk(module, body, seen, env);
            for i in (0..2).rev() {
                restore(env, clones[i], prev[i]);
            }
            if (original2, clones2, body2) == (original, clones, body) {
                expr
            } else {
                module.alloc(
                    ExprKind::Share {
                        original: original2,
                        clones: clones2,
                        body: body2,
                    },
                    Source::Renamed { origin: expr },
                )
            }
        }
    }
}

fn restore(env: &mut FxHashMap<NameId, NameId>, name: NameId, prev: Option<NameId>) {
    match prev {
        Some(p) => {
            env.insert(name, p);
        }
        None => {
            env.remove(&name);
        }
    }
}
