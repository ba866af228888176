mod normalize;
mod share;
mod uniquify;

#[cfg(any(test, feature = "proptest_support"))]
pub mod arbitrary;

#[cfg(test)]
mod tests;

#[cfg(test)]
mod pbt;

use std::ops;

use derive_more::Debug;
use la_arena::{Arena, Idx};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

pub use normalize::normalize;
pub use share::{unshare, ImproperFormError};
pub use uniquify::uniquify;

pub type ExprId = Idx<Expr>;
pub type NameId = Idx<Name>;

/// An identifier. Interned per `Module`, so two mentions of the same
/// source-level name resolve to the same `NameId`. Names synthesized by the
/// normalizer or the sharing transformer are never interned and therefore
/// never collide with source names.
#[derive(Debug, Clone, PartialEq, Eq)]
#[debug("Name({text:?})")]
pub struct Name {
    pub text: SmolStr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    Num(i64),
    Bool(bool),
    /// The empty tree. Carries zero potential, so it is exempt from sharing.
    Leaf,
}

/// Where an expression came from. Transformations allocate new expressions
/// instead of mutating, and tag them with the expression they derive from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Original,
    Anf { origin: ExprId },
    Shared { origin: ExprId },
    Renamed { origin: ExprId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    Ident(NameId),
    Lit(Literal),
    /// Binary-tree constructor: exactly `{left, value, right}`. Left and
    /// right are trees, the middle slot is a scalar.
    Node {
        left: ExprId,
        value: ExprId,
        right: ExprId,
    },
    /// Call of a top-level function.
    Apply { callee: NameId, args: Vec<ExprId> },
    If {
        cond: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    },
    Let {
        name: NameId,
        value: ExprId,
        body: ExprId,
    },
    /// Explicit duplication of a tree value: `original` is consumed and the
    /// two fresh `clones` become visible inside `body`. The only legal way
    /// for a tree-typed identifier to be used twice.
    Share {
        original: NameId,
        clones: [NameId; 2],
        body: ExprId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub source: Source,
}

/// Owns the arenas behind `ExprId`/`NameId`. Expressions are immutable once
/// allocated; `normalize` and `unshare` grow the arena and return new ids.
#[derive(Debug, Clone, Default)]
pub struct Module {
    exprs: Arena<Expr>,
    names: Arena<Name>,
    interned: FxHashMap<SmolStr, NameId>,
    fresh_counter: u32,
}

impl ops::Index<ExprId> for Module {
    type Output = Expr;
    fn index(&self, index: ExprId) -> &Self::Output {
        &self.exprs[index]
    }
}

impl ops::Index<NameId> for Module {
    type Output = Name;
    fn index(&self, index: NameId) -> &Self::Output {
        &self.names[index]
    }
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: ExprKind, source: Source) -> ExprId {
        self.exprs.alloc(Expr { kind, source })
    }

    /// Intern a source-level name.
    pub fn name(&mut self, text: impl Into<SmolStr>) -> NameId {
        let text = text.into();
        if let Some(&id) = self.interned.get(&text) {
            return id;
        }
        let id = self.names.alloc(Name { text: text.clone() });
        self.interned.insert(text, id);
        id
    }

    /// Allocate a name that is guaranteed not to clash with any interned or
    /// previously synthesized name. Used for ANF bindings and share clones.
    pub fn fresh_name(&mut self, hint: &str) -> NameId {
        let n = self.fresh_counter;
        self.fresh_counter += 1;
        self.names.alloc(Name {
            text: SmolStr::new(format!("{hint}#{n}")),
        })
    }

    pub fn exprs(&self) -> impl Iterator<Item = (ExprId, &Expr)> {
        self.exprs.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = (NameId, &Name)> {
        self.names.iter()
    }

    // -- convenience constructors (all tagged `Source::Original`) -----------

    pub fn ident(&mut self, name: NameId) -> ExprId {
        self.alloc(ExprKind::Ident(name), Source::Original)
    }

    pub fn num(&mut self, n: i64) -> ExprId {
        self.alloc(ExprKind::Lit(Literal::Num(n)), Source::Original)
    }

    pub fn bool(&mut self, b: bool) -> ExprId {
        self.alloc(ExprKind::Lit(Literal::Bool(b)), Source::Original)
    }

    pub fn leaf(&mut self) -> ExprId {
        self.alloc(ExprKind::Lit(Literal::Leaf), Source::Original)
    }

    /// Tree constructor. Takes the slot list to mirror the surface syntax;
    /// anything other than exactly `{left, value, right}` is a programmer
    /// error, not a recoverable condition.
    ///
    /// # Panics
    ///
    /// Panics when `slots.len() != 3`.
    pub fn node(&mut self, slots: &[ExprId]) -> ExprId {
        assert!(
            slots.len() == 3,
            "tree constructor takes exactly three slots (left, value, right), got {}",
            slots.len()
        );
        self.alloc(
            ExprKind::Node {
                left: slots[0],
                value: slots[1],
                right: slots[2],
            },
            Source::Original,
        )
    }

    pub fn apply(&mut self, callee: NameId, args: Vec<ExprId>) -> ExprId {
        self.alloc(ExprKind::Apply { callee, args }, Source::Original)
    }

    pub fn ite(&mut self, cond: ExprId, then_branch: ExprId, else_branch: ExprId) -> ExprId {
        self.alloc(
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            },
            Source::Original,
        )
    }

    pub fn let_in(&mut self, name: NameId, value: ExprId, body: ExprId) -> ExprId {
        self.alloc(ExprKind::Let { name, value, body }, Source::Original)
    }

    // -- queries -------------------------------------------------------------

    /// Immediate expressions need no ANF binding: identifiers and literals.
    pub fn is_immediate(&self, expr: ExprId) -> bool {
        matches!(self[expr].kind, ExprKind::Ident(_) | ExprKind::Lit(_))
    }

    /// The free names of `expr`. `Let` binds its name in the body, `Share`
    /// binds its clones in the body and *uses* its original.
    pub fn free_names(&self, expr: ExprId) -> rustc_hash::FxHashSet<NameId> {
        let mut out = rustc_hash::FxHashSet::default();
        self.free_names_into(expr, &mut out);
        out
    }

    fn free_names_into(&self, expr: ExprId, out: &mut rustc_hash::FxHashSet<NameId>) {
        match &self[expr].kind {
            ExprKind::Ident(name) => {
                out.insert(*name);
            }
            ExprKind::Lit(_) => {}
            ExprKind::Node { left, value, right } => {
                self.free_names_into(*left, out);
                self.free_names_into(*value, out);
                self.free_names_into(*right, out);
            }
            ExprKind::Apply { args, .. } => {
                for arg in args {
                    self.free_names_into(*arg, out);
                }
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.free_names_into(*cond, out);
                self.free_names_into(*then_branch, out);
                self.free_names_into(*else_branch, out);
            }
            ExprKind::Let { name, value, body } => {
                self.free_names_into(*value, out);
                let mut inner = rustc_hash::FxHashSet::default();
                self.free_names_into(*body, &mut inner);
                inner.remove(name);
                out.extend(inner);
            }
            ExprKind::Share {
                original,
                clones,
                body,
            } => {
                out.insert(*original);
                let mut inner = rustc_hash::FxHashSet::default();
                self.free_names_into(*body, &mut inner);
                inner.remove(&clones[0]);
                inner.remove(&clones[1]);
                out.extend(inner);
            }
        }
    }

    /// Structural equality of two expression trees, ignoring provenance tags
    /// and arena indices.
    pub fn structurally_eq(&self, a: ExprId, b: ExprId) -> bool {
        if a == b {
            return true;
        }
        match (&self[a].kind, &self[b].kind) {
            (ExprKind::Ident(x), ExprKind::Ident(y)) => x == y,
            (ExprKind::Lit(x), ExprKind::Lit(y)) => x == y,
            (
                ExprKind::Node {
                    left: l1,
                    value: v1,
                    right: r1,
                },
                ExprKind::Node {
                    left: l2,
                    value: v2,
                    right: r2,
                },
            ) => {
                self.structurally_eq(*l1, *l2)
                    && self.structurally_eq(*v1, *v2)
                    && self.structurally_eq(*r1, *r2)
            }
            (
                ExprKind::Apply {
                    callee: f1,
                    args: a1,
                },
                ExprKind::Apply {
                    callee: f2,
                    args: a2,
                },
            ) => {
                f1 == f2
                    && a1.len() == a2.len()
                    && a1
                        .iter()
                        .zip(a2.iter())
                        .all(|(x, y)| self.structurally_eq(*x, *y))
            }
            (
                ExprKind::If {
                    cond: c1,
                    then_branch: t1,
                    else_branch: e1,
                },
                ExprKind::If {
                    cond: c2,
                    then_branch: t2,
                    else_branch: e2,
                },
            ) => {
                self.structurally_eq(*c1, *c2)
                    && self.structurally_eq(*t1, *t2)
                    && self.structurally_eq(*e1, *e2)
            }
            (
                ExprKind::Let {
                    name: n1,
                    value: v1,
                    body: b1,
                },
                ExprKind::Let {
                    name: n2,
                    value: v2,
                    body: b2,
                },
            ) => n1 == n2 && self.structurally_eq(*v1, *v2) && self.structurally_eq(*b1, *b2),
            (
                ExprKind::Share {
                    original: o1,
                    clones: c1,
                    body: b1,
                },
                ExprKind::Share {
                    original: o2,
                    clones: c2,
                    body: b2,
                },
            ) => o1 == o2 && c1 == c2 && self.structurally_eq(*b1, *b2),
            _ => false,
        }
    }
}
