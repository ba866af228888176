//! Explicit sharing of duplicated tree values.
//!
//! A tree value carries potential; referring to the same tree-typed
//! identifier twice would double-count it. `unshare` rewrites every such
//! duplication into a `Share` node that names two fresh clones, so the
//! constraint generator can split the original's potential between them.
//! Duplications show up in three places: the two tree slots of a `Node`,
//! the argument list of an `Apply`, and across the two sides of a `Let`
//! (both of which evaluate). `If` branches are exempt, only one runs.
//!
//! Precondition: the expression is in ANF. A duplication whose operands are
//! not identifiers means normalization was skipped, which is a fatal input
//! error rather than something to repair here.

use log::trace;
use miette::Diagnostic;
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::{ExprId, ExprKind, Module, NameId, Source};

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ImproperFormError {
    #[error("expression {at:?} is not in administrative normal form: tree constructor slot holds a compound expression")]
    #[diagnostic(code(lang_ast::not_normalized))]
    NodeSlotNotImmediate { at: ExprId },

    #[error("expression {at:?} is not in administrative normal form: call argument holds a compound expression")]
    #[diagnostic(code(lang_ast::not_normalized))]
    ArgNotImmediate { at: ExprId },
}

/// Insert `Share` nodes wherever a tree-typed identifier is duplicated.
///
/// `is_tree` reports whether a name denotes a tree value; scalar duplicates
/// carry no potential and pass through untouched (sharing one would in fact
/// be a type error, since only tree shapes are annotated).
///
/// Idempotent: expressions whose duplications are already mediated by
/// `Share` nodes come back as the same `ExprId`.
pub fn unshare(
    module: &mut Module,
    expr: ExprId,
    is_tree: &dyn Fn(NameId) -> bool,
) -> Result<ExprId, ImproperFormError> {
    let mut unsharer = Unsharer {
        is_tree,
        clone_trees: FxHashSet::default(),
    };
    unsharer.unshare(module, expr)
}

struct Unsharer<'a> {
    is_tree: &'a dyn Fn(NameId) -> bool,
    /// Tree-ness of clones synthesized during this pass; the caller's
    /// predicate only knows about names that existed before it.
    clone_trees: FxHashSet<NameId>,
}

impl Unsharer<'_> {
    fn name_is_tree(&self, name: NameId) -> bool {
        self.clone_trees.contains(&name) || (self.is_tree)(name)
    }

    fn unshare(&mut self, module: &mut Module, expr: ExprId) -> Result<ExprId, ImproperFormError> {
        match module[expr].kind.clone() {
            ExprKind::Ident(_) | ExprKind::Lit(_) => Ok(expr),
            ExprKind::Node { left, value, right } => {
                self.unshare_node(module, expr, left, value, right)
            }
            ExprKind::Apply { callee, args } => self.unshare_apply(module, expr, callee, args),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                // Only one branch ever runs, so a tree used in both branches
                // is not a duplication; branches are unshared independently.
                let then2 = self.unshare(module, then_branch)?;
                let else2 = self.unshare(module, else_branch)?;
                if (then2, else2) == (then_branch, else_branch) {
                    Ok(expr)
                } else {
                    Ok(module.alloc(
                        ExprKind::If {
                            cond,
                            then_branch: then2,
                            else_branch: else2,
                        },
                        Source::Shared { origin: expr },
                    ))
                }
            }
            ExprKind::Let { name, value, body } => {
                let value2 = self.unshare(module, value)?;
                let body2 = self.unshare(module, body)?;
                let rebuilt = if (value2, body2) == (value, body) {
                    expr
                } else {
                    module.alloc(
                        ExprKind::Let {
                            name,
                            value: value2,
                            body: body2,
                        },
                        Source::Shared { origin: expr },
                    )
                };
                Ok(self.share_across_let(module, rebuilt))
            }
            ExprKind::Share {
                original,
                clones,
                body,
            } => {
                self.clone_trees.extend(clones);
                let body2 = self.unshare(module, body)?;
                if body2 == body {
                    Ok(expr)
                } else {
                    Ok(module.alloc(
                        ExprKind::Share {
                            original,
                            clones,
                            body: body2,
                        },
                        Source::Shared { origin: expr },
                    ))
                }
            }
        }
    }

    /// The left and right slots of a node are tree positions. When both name
    /// the same identifier, clone it and route the clones into the rebuilt
    /// node. The middle slot is a scalar and never participates.
    fn unshare_node(
        &mut self,
        module: &mut Module,
        expr: ExprId,
        left: ExprId,
        value: ExprId,
        right: ExprId,
    ) -> Result<ExprId, ImproperFormError> {
        let left_name = slot_ident(module, expr, left)?;
        let right_name = slot_ident(module, expr, right)?;
        if !module.is_immediate(value) {
            return Err(ImproperFormError::NodeSlotNotImmediate { at: expr });
        }

        match (left_name, right_name) {
            (Some(a), Some(b)) if a == b => {
                let c1 = self.clone_name(module, a);
                let c2 = self.clone_name(module, a);
                let left2 = module.alloc(ExprKind::Ident(c1), Source::Shared { origin: left });
                let right2 = module.alloc(ExprKind::Ident(c2), Source::Shared { origin: right });
                let body = module.alloc(
                    ExprKind::Node {
                        left: left2,
                        value,
                        right: right2,
                    },
                    Source::Shared { origin: expr },
                );
                trace!("sharing {a:?} across node {expr:?}");
                Ok(module.alloc(
                    ExprKind::Share {
                        original: a,
                        clones: [c1, c2],
                        body,
                    },
                    Source::Shared { origin: expr },
                ))
            }
            _ => Ok(expr),
        }
    }

    /// Calls may mention the same tree argument several times; every
    /// duplicated tree name is peeled off into a `Share` wrapper, two
    /// occurrences at a time.
    fn unshare_apply(
        &mut self,
        module: &mut Module,
        expr: ExprId,
        callee: NameId,
        args: Vec<ExprId>,
    ) -> Result<ExprId, ImproperFormError> {
        let mut idents = Vec::with_capacity(args.len());
        for &arg in &args {
            if !module.is_immediate(arg) {
                return Err(ImproperFormError::ArgNotImmediate { at: expr });
            }
            idents.push(match module[arg].kind {
                ExprKind::Ident(name) => Some(name),
                _ => None,
            });
        }

        let Some(dup) = self.first_duplicate(&idents) else {
            return Ok(expr);
        };

        let c1 = self.clone_name(module, dup);
        let c2 = self.clone_name(module, dup);
        // First occurrence becomes the first clone; every later occurrence
        // becomes the second. Three or more uses leave the second clone
        // duplicated, which the recursive unshare below peels off in turn.
        let mut first_seen = false;
        let args2: Vec<_> = args
            .iter()
            .zip(&idents)
            .map(|(&arg, &ident)| match ident {
                Some(name) if name == dup => {
                    let clone = if first_seen {
                        c2
                    } else {
                        first_seen = true;
                        c1
                    };
                    module.alloc(ExprKind::Ident(clone), Source::Shared { origin: arg })
                }
                _ => arg,
            })
            .collect();

        trace!("sharing {dup:?} across call {expr:?}");
        let inner = module.alloc(
            ExprKind::Apply {
                callee,
                args: args2,
            },
            Source::Shared { origin: expr },
        );
        let body = self.unshare(module, inner)?;
        Ok(module.alloc(
            ExprKind::Share {
                original: dup,
                clones: [c1, c2],
                body,
            },
            Source::Shared { origin: expr },
        ))
    }

    /// A let evaluates both its value and its body, so a tree name free on
    /// both sides is a duplication even though no single node or call
    /// mentions it twice. Clone it, route one clone into each side, and
    /// wrap the rebuilt let in a `Share`. Repeats until no tree name is
    /// free on both sides.
    fn share_across_let(&mut self, module: &mut Module, expr: ExprId) -> ExprId {
        let ExprKind::Let { name, value, body } = module[expr].kind.clone() else {
            return expr;
        };
        let value_free = module.free_names(value);
        let body_free = module.free_names(body);
        // Body occurrences of the binder itself refer to this binding, not
        // to an outer tree of the same name.
        let dup = module.names().map(|(id, _)| id).find(|&id| {
            id != name
                && self.name_is_tree(id)
                && value_free.contains(&id)
                && body_free.contains(&id)
        });
        let Some(dup) = dup else { return expr };

        let c1 = self.clone_name(module, dup);
        let c2 = self.clone_name(module, dup);
        let value2 = rename(module, value, dup, c1);
        let body2 = rename(module, body, dup, c2);
        trace!("sharing {dup:?} across let {expr:?}");
        let inner = module.alloc(
            ExprKind::Let {
                name,
                value: value2,
                body: body2,
            },
            Source::Shared { origin: expr },
        );
        let inner = self.share_across_let(module, inner);
        module.alloc(
            ExprKind::Share {
                original: dup,
                clones: [c1, c2],
                body: inner,
            },
            Source::Shared { origin: expr },
        )
    }

    fn first_duplicate(&self, idents: &[Option<NameId>]) -> Option<NameId> {
        for (i, ident) in idents.iter().enumerate() {
            let Some(name) = ident else { continue };
            if !self.name_is_tree(*name) {
                continue;
            }
            if idents[i + 1..].contains(&Some(*name)) {
                return Some(*name);
            }
        }
        None
    }

    fn clone_name(&mut self, module: &mut Module, original: NameId) -> NameId {
        let hint = format!("{}'", module[original].text);
        let clone = module.fresh_name(&hint);
        if self.name_is_tree(original) {
            self.clone_trees.insert(clone);
        }
        clone
    }
}

/// Substitute `to` for `from` in every use position of `expr`. A `Let`
/// rebinding `from` shields its body; a `Share` whose clones include `from`
/// does the same, while its `original` field is a use position.
fn rename(module: &mut Module, expr: ExprId, from: NameId, to: NameId) -> ExprId {
    match module[expr].kind.clone() {
        ExprKind::Ident(name) if name == from => {
            module.alloc(ExprKind::Ident(to), Source::Shared { origin: expr })
        }
        ExprKind::Ident(_) | ExprKind::Lit(_) => expr,
        ExprKind::Node { left, value, right } => {
            let left2 = rename(module, left, from, to);
            let value2 = rename(module, value, from, to);
            let right2 = rename(module, right, from, to);
            if (left2, value2, right2) == (left, value, right) {
                expr
            } else {
                module.alloc(
                    ExprKind::Node {
                        left: left2,
                        value: value2,
                        right: right2,
                    },
                    Source::Shared { origin: expr },
                )
            }
        }
        ExprKind::Apply { callee, args } => {
            let args2: Vec<_> = args
                .iter()
                .map(|&arg| rename(module, arg, from, to))
                .collect();
            if args2 == args {
                expr
            } else {
                module.alloc(
                    ExprKind::Apply {
                        callee,
                        args: args2,
                    },
                    Source::Shared { origin: expr },
                )
            }
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let cond2 = rename(module, cond, from, to);
            let then2 = rename(module, then_branch, from, to);
            let else2 = rename(module, else_branch, from, to);
            if (cond2, then2, else2) == (cond, then_branch, else_branch) {
                expr
            } else {
                module.alloc(
                    ExprKind::If {
                        cond: cond2,
                        then_branch: then2,
                        else_branch: else2,
                    },
                    Source::Shared { origin: expr },
                )
            }
        }
        ExprKind::Let { name, value, body } => {
            let value2 = rename(module, value, from, to);
            let body2 = if name == from {
                body
            } else {
                rename(module, body, from, to)
            };
            if (value2, body2) == (value, body) {
                expr
            } else {
                module.alloc(
                    ExprKind::Let {
                        name,
                        value: value2,
                        body: body2,
                    },
                    Source::Shared { origin: expr },
                )
            }
        }
        ExprKind::Share {
            original,
            clones,
            body,
        } => {
            let original2 = if original == from { to } else { original };
            let body2 = if clones.contains(&from) {
                body
            } else {
                rename(module, body, from, to)
            };
            if (original2, body2) == (original, body) {
                expr
            } else {
                module.alloc(
                    ExprKind::Share {
                        original: original2,
                        clones,
                        body: body2,
                    },
                    Source::Shared { origin: expr },
                )
            }
        }
    }
}

/// `Some(name)` for identifier slots, `None` for literal leaves, error for
/// anything compound (ANF precondition violated).
fn slot_ident(
    module: &Module,
    at: ExprId,
    slot: ExprId,
) -> Result<Option<NameId>, ImproperFormError> {
    match &module[slot].kind {
        ExprKind::Ident(name) => Ok(Some(*name)),
        ExprKind::Lit(_) => Ok(None),
        _ => Err(ImproperFormError::NodeSlotNotImmediate { at }),
    }
}
