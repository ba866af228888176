//! Administrative normal form.
//!
//! After `normalize`, every argument slot of an `Apply`, `If` condition, and
//! `Node` holds an identifier or a literal. Non-immediate children are bound
//! to fresh names via synthesized lets that wrap the rebuilt expression.
//!
//! A compound whose direct children are already immediate is returned as the
//! *same* `ExprId`. The sharing transformer relies on this identity check to
//! detect that nothing changed, and it makes `normalize` idempotent.

use log::trace;

use crate::{ExprId, ExprKind, Module, NameId, Source};

pub fn normalize(module: &mut Module, expr: ExprId) -> ExprId {
    let mut bindings = Vec::new();
    let head = normalize_children(module, expr, &mut bindings);
    discharge(module, bindings, head, expr)
}

/// Wrap the accumulated `(name, value)` stack as nested lets around `head`.
fn discharge(
    module: &mut Module,
    bindings: Vec<(NameId, ExprId)>,
    head: ExprId,
    origin: ExprId,
) -> ExprId {
    bindings.into_iter().rev().fold(head, |body, (name, value)| {
        module.alloc(
            ExprKind::Let { name, value, body },
            Source::Anf { origin },
        )
    })
}

/// Rebuild `expr` with immediate direct children, pushing bindings for the
/// children that had to be forced. Does not discharge the stack itself; the
/// enclosing compound decides where the lets land.
fn normalize_children(
    module: &mut Module,
    expr: ExprId,
    bindings: &mut Vec<(NameId, ExprId)>,
) -> ExprId {
    match module[expr].kind.clone() {
        ExprKind::Ident(_) | ExprKind::Lit(_) => expr,
        ExprKind::Node { left, value, right } => {
            let left2 = force_immediate(module, left, bindings);
            let value2 = force_immediate(module, value, bindings);
            let right2 = force_immediate(module, right, bindings);
            if (left2, value2, right2) == (left, value, right) {
                expr
            } else {
                module.alloc(
                    ExprKind::Node {
                        left: left2,
                        value: value2,
                        right: right2,
                    },
                    Source::Anf { origin: expr },
                )
            }
        }
        ExprKind::Apply { callee, args } => {
            let args2: Vec<_> = args
                .iter()
                .map(|&arg| force_immediate(module, arg, bindings))
                .collect();
            if args2 == args {
                expr
            } else {
                module.alloc(
                    ExprKind::Apply {
                        callee,
                        args: args2,
                    },
                    Source::Anf { origin: expr },
                )
            }
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            // The condition is hoisted, but each branch keeps its own lets:
            // hoisting a binding above the conditional would evaluate it
            // unconditionally and change the resource cost.
            let cond2 = force_immediate(module, cond, bindings);
            let then2 = normalize(module, then_branch);
            let else2 = normalize(module, else_branch);
            if (cond2, then2, else2) == (cond, then_branch, else_branch) {
                expr
            } else {
                module.alloc(
                    ExprKind::If {
                        cond: cond2,
                        then_branch: then2,
                        else_branch: else2,
                    },
                    Source::Anf { origin: expr },
                )
            }
        }
        ExprKind::Let { name, value, body } => {
            // A let already names its value; normalize both sides in place.
            let value2 = normalize(module, value);
            let body2 = normalize(module, body);
            if (value2, body2) == (value, body) {
                expr
            } else {
                module.alloc(
                    ExprKind::Let {
                        name,
                        value: value2,
                        body: body2,
                    },
                    Source::Anf { origin: expr },
                )
            }
        }
        ExprKind::Share {
            original,
            clones,
            body,
        } => {
            let body2 = normalize(module, body);
            if body2 == body {
                expr
            } else {
                module.alloc(
                    ExprKind::Share {
                        original,
                        clones,
                        body: body2,
                    },
                    Source::Anf { origin: expr },
                )
            }
        }
    }
}

/// Identifiers and literals pass through; anything compound is normalized,
/// bound to a fresh name, and replaced by a reference to that name.
fn force_immediate(
    module: &mut Module,
    expr: ExprId,
    bindings: &mut Vec<(NameId, ExprId)>,
) -> ExprId {
    if module.is_immediate(expr) {
        return expr;
    }
    let value = normalize(module, expr);
    let name = module.fresh_name("anf");
    trace!("forcing {expr:?} immediate as {name:?}");
    bindings.push((name, value));
    module.alloc(ExprKind::Ident(name), Source::Anf { origin: expr })
}
