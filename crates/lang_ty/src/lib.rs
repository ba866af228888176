//! Simple (non-resource) types for the tree language.
//!
//! The resource engine consumes a fully elaborated `TypeTable`; nothing in
//! the annotation scheme touches partially-typed expressions. Trees are the
//! only shape that carries potential downstream, which is why `TypeTable`
//! exposes the `is_tree_*` helpers rather than a general substitution API.

mod unify;

use std::fmt;
use std::sync::Arc;

use lang_ast::{ExprId, NameId};
use rustc_hash::FxHashMap;

pub use unify::{infer_fn, TypeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseTy {
    Num,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimpleTy {
    Base(BaseTy),
    Tree(Arc<SimpleTy>),
}

impl SimpleTy {
    pub fn num() -> Self {
        SimpleTy::Base(BaseTy::Num)
    }

    pub fn bool() -> Self {
        SimpleTy::Base(BaseTy::Bool)
    }

    pub fn tree_of(element: SimpleTy) -> Self {
        SimpleTy::Tree(Arc::new(element))
    }

    /// Shorthand for the common case: a binary tree of numbers.
    pub fn tree() -> Self {
        Self::tree_of(Self::num())
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, SimpleTy::Tree(_))
    }
}

impl fmt::Display for SimpleTy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimpleTy::Base(BaseTy::Num) => write!(f, "num"),
            SimpleTy::Base(BaseTy::Bool) => write!(f, "bool"),
            SimpleTy::Tree(elem) => write!(f, "tree[{elem}]"),
        }
    }
}

/// Declared signature of a top-level function. Functions are first-order
/// and monomorphic at this layer; the polymorphism that matters lives in
/// the resource annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnSig {
    pub params: Vec<SimpleTy>,
    pub result: SimpleTy,
}

/// Output of the unifier: a total typing of one function body.
///
/// `name_tys` is keyed by `NameId`, so it can hold one type per name:
/// rename binders apart (`lang_ast::uniquify`) before inferring, or a
/// shadowing binder would overwrite the outer binding's entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeTable {
    pub expr_tys: FxHashMap<ExprId, SimpleTy>,
    pub name_tys: FxHashMap<NameId, SimpleTy>,
}

impl TypeTable {
    pub fn expr_ty(&self, expr: ExprId) -> Option<&SimpleTy> {
        self.expr_tys.get(&expr)
    }

    pub fn name_ty(&self, name: NameId) -> Option<&SimpleTy> {
        self.name_tys.get(&name)
    }

    pub fn is_tree_name(&self, name: NameId) -> bool {
        self.name_tys.get(&name).is_some_and(SimpleTy::is_tree)
    }

    pub fn is_tree_expr(&self, expr: ExprId) -> bool {
        self.expr_tys.get(&expr).is_some_and(SimpleTy::is_tree)
    }

    /// Merge another table in (used after re-typing an unshared body: the
    /// second pass covers the new nodes, the first pass' entries remain
    /// valid because expressions are immutable).
    pub fn extend(&mut self, other: TypeTable) {
        self.expr_tys.extend(other.expr_tys);
        self.name_tys.extend(other.name_tys);
    }
}
