//! Unification-based simple-type inference for function bodies.
//!
//! Type variables live in a union-find; the `types` map holds the known
//! value of each root key, absent entries are still-unknown variables.

use derive_more::{Debug, From};
use lang_ast::{ExprId, ExprKind, Literal, Module, NameId};
use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use thiserror::Error;
use union_find::{QuickFindUf, UnionByRank, UnionFind};

use crate::{BaseTy, FnSig, SimpleTy, TypeTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, From)]
#[debug("TyKey({_0})")]
pub(crate) struct TyKey(u32);

impl From<usize> for TyKey {
    fn from(value: usize) -> Self {
        TyKey(value as u32)
    }
}

impl From<TyKey> for usize {
    fn from(key: TyKey) -> usize {
        key.0 as usize
    }
}

/// Shallow type constructor over `R`-shaped references to other keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ty<R> {
    Base(BaseTy),
    Tree(R),
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum TypeError {
    #[error("type mismatch: expected {expected}, found {found}")]
    #[diagnostic(code(lang_ty::mismatch))]
    Mismatch { expected: SmolStr, found: SmolStr },

    #[error("unbound identifier `{name}`")]
    #[diagnostic(code(lang_ty::unbound))]
    Unbound { name: SmolStr },

    #[error("call to unknown function `{name}`")]
    #[diagnostic(code(lang_ty::unknown_function))]
    UnknownFunction { name: SmolStr },

    #[error("`{name}` expects {expected} arguments, got {found}")]
    #[diagnostic(code(lang_ty::arity))]
    ArityMismatch {
        name: SmolStr,
        expected: usize,
        found: usize,
    },

    #[error("cyclic type")]
    #[diagnostic(code(lang_ty::cyclic))]
    Cyclic,
}

// ====== storage ==========================================================

#[derive(Debug, Clone)]
pub(crate) struct TyStorage {
    uf: QuickFindUf<UnionByRank>,
    types: FxHashMap<TyKey, Ty<TyKey>>,
}

impl TyStorage {
    fn new() -> Self {
        Self {
            uf: QuickFindUf::new(0),
            types: FxHashMap::default(),
        }
    }

    fn find(&mut self, key: TyKey) -> TyKey {
        self.uf.find(key.into()).into()
    }

    fn new_var(&mut self) -> TyKey {
        self.uf.insert(UnionByRank::default()).into()
    }

    fn insert(&mut self, val: Ty<TyKey>) -> TyKey {
        let key = self.new_var();
        self.types.insert(key, val);
        key
    }

    fn get_root_value(&mut self, key: TyKey) -> (TyKey, Option<Ty<TyKey>>) {
        let root = self.find(key);
        let val = self.types.get(&root).copied();
        (root, val)
    }

    fn union_keep(&mut self, lhs: TyKey, rhs: TyKey, val: Option<Ty<TyKey>>) {
        self.uf.union(lhs.into(), rhs.into());
        self.types.remove(&lhs);
        self.types.remove(&rhs);
        let root = self.find(lhs);
        if let Some(val) = val {
            self.types.insert(root, val);
        }
    }

    fn unify(&mut self, lhs: TyKey, rhs: TyKey) -> Result<(), TypeError> {
        let (lroot, lval) = self.get_root_value(lhs);
        let (rroot, rval) = self.get_root_value(rhs);
        if lroot == rroot {
            return Ok(());
        }
        match (lval, rval) {
            (None, None) => {
                self.union_keep(lroot, rroot, None);
                Ok(())
            }
            (Some(val), None) | (None, Some(val)) => {
                self.union_keep(lroot, rroot, Some(val));
                Ok(())
            }
            (Some(Ty::Base(a)), Some(Ty::Base(b))) if a == b => {
                self.union_keep(lroot, rroot, Some(Ty::Base(a)));
                Ok(())
            }
            (Some(Ty::Tree(a)), Some(Ty::Tree(b))) => {
                self.union_keep(lroot, rroot, Some(Ty::Tree(a)));
                self.unify(a, b)
            }
            (Some(a), Some(b)) => Err(TypeError::Mismatch {
                expected: self.describe(a, &mut FxHashSet::default()),
                found: self.describe(b, &mut FxHashSet::default()),
            }),
        }
    }

    /// Lower a declared type into storage keys.
    fn intern(&mut self, ty: &SimpleTy) -> TyKey {
        match ty {
            SimpleTy::Base(base) => self.insert(Ty::Base(*base)),
            SimpleTy::Tree(elem) => {
                let elem = self.intern(elem);
                self.insert(Ty::Tree(elem))
            }
        }
    }

    /// Read a key back out as a `SimpleTy`. Variables the body never
    /// constrained default to `num`; that only happens for values that do
    /// not flow anywhere observable.
    fn resolve(&mut self, key: TyKey, seen: &mut FxHashSet<TyKey>) -> Result<SimpleTy, TypeError> {
        let (root, val) = self.get_root_value(key);
        if !seen.insert(root) {
            return Err(TypeError::Cyclic);
        }
        let out = match val {
            None => {
                log::debug!("unconstrained type variable {root:?}, defaulting to num");
                SimpleTy::num()
            }
            Some(Ty::Base(base)) => SimpleTy::Base(base),
            Some(Ty::Tree(elem)) => SimpleTy::tree_of(self.resolve(elem, seen)?),
        };
        seen.remove(&root);
        Ok(out)
    }

    /// Best-effort rendering for error messages, `_` for unknowns.
    fn describe(&mut self, ty: Ty<TyKey>, seen: &mut FxHashSet<TyKey>) -> SmolStr {
        match ty {
            Ty::Base(BaseTy::Num) => SmolStr::new_static("num"),
            Ty::Base(BaseTy::Bool) => SmolStr::new_static("bool"),
            Ty::Tree(elem) => {
                let (root, val) = self.get_root_value(elem);
                let inner = match val {
                    Some(inner) if seen.insert(root) => {
                        let text = self.describe(inner, seen);
                        seen.remove(&root);
                        text
                    }
                    _ => SmolStr::new_static("_"),
                };
                SmolStr::new(format!("tree[{inner}]"))
            }
        }
    }
}

// ====== inference ========================================================

struct Infer<'m> {
    module: &'m Module,
    sigs: &'m FxHashMap<NameId, FnSig>,
    storage: TyStorage,
    env: FxHashMap<NameId, TyKey>,
    expr_keys: FxHashMap<ExprId, TyKey>,
    name_keys: FxHashMap<NameId, TyKey>,
}

/// Infer simple types for one function body given the module-wide
/// signatures and the parameter binding of this function. Returns a table
/// covering every expression and every bound name reachable from `body`.
pub fn infer_fn(
    module: &Module,
    sigs: &FxHashMap<NameId, FnSig>,
    params: &[(NameId, SimpleTy)],
    body: ExprId,
) -> Result<TypeTable, TypeError> {
    let mut infer = Infer {
        module,
        sigs,
        storage: TyStorage::new(),
        env: FxHashMap::default(),
        expr_keys: FxHashMap::default(),
        name_keys: FxHashMap::default(),
    };
    for (name, ty) in params {
        let key = infer.storage.intern(ty);
        infer.bind(*name, key);
    }
    infer.infer_expr(body)?;

    let mut table = TypeTable::default();
    for (&expr, &key) in &infer.expr_keys {
        let ty = infer.storage.resolve(key, &mut FxHashSet::default())?;
        table.expr_tys.insert(expr, ty);
    }
    for (&name, &key) in &infer.name_keys {
        let ty = infer.storage.resolve(key, &mut FxHashSet::default())?;
        table.name_tys.insert(name, ty);
    }
    Ok(table)
}

impl Infer<'_> {
    fn bind(&mut self, name: NameId, key: TyKey) -> Option<TyKey> {
        self.name_keys.insert(name, key);
        self.env.insert(name, key)
    }

    fn restore(&mut self, name: NameId, saved: Option<TyKey>) {
        match saved {
            Some(key) => {
                self.env.insert(name, key);
            }
            None => {
                self.env.remove(&name);
            }
        }
    }

    fn infer_expr(&mut self, expr: ExprId) -> Result<TyKey, TypeError> {
        let kind = self.module[expr].kind.clone();
        let key = match kind {
            ExprKind::Ident(name) => match self.env.get(&name) {
                Some(&key) => key,
                None => {
                    return Err(TypeError::Unbound {
                        name: self.module[name].text.clone(),
                    })
                }
            },
            ExprKind::Lit(Literal::Num(_)) => self.storage.insert(Ty::Base(BaseTy::Num)),
            ExprKind::Lit(Literal::Bool(_)) => self.storage.insert(Ty::Base(BaseTy::Bool)),
            ExprKind::Lit(Literal::Leaf) => {
                let elem = self.storage.new_var();
                self.storage.insert(Ty::Tree(elem))
            }
            ExprKind::Node { left, value, right } => {
                let l = self.infer_expr(left)?;
                let v = self.infer_expr(value)?;
                let r = self.infer_expr(right)?;
                let elem = self.storage.new_var();
                self.storage.unify(v, elem)?;
                let tree = self.storage.insert(Ty::Tree(elem));
                self.storage.unify(l, tree)?;
                self.storage.unify(r, tree)?;
                tree
            }
            ExprKind::Apply { callee, args } => {
                let Some(sig) = self.sigs.get(&callee) else {
                    return Err(TypeError::UnknownFunction {
                        name: self.module[callee].text.clone(),
                    });
                };
                let sig = sig.clone();
                if sig.params.len() != args.len() {
                    return Err(TypeError::ArityMismatch {
                        name: self.module[callee].text.clone(),
                        expected: sig.params.len(),
                        found: args.len(),
                    });
                }
                for (&arg, param) in args.iter().zip(&sig.params) {
                    let a = self.infer_expr(arg)?;
                    let p = self.storage.intern(param);
                    self.storage.unify(a, p)?;
                }
                self.storage.intern(&sig.result)
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let c = self.infer_expr(cond)?;
                let b = self.storage.insert(Ty::Base(BaseTy::Bool));
                self.storage.unify(c, b)?;
                let t = self.infer_expr(then_branch)?;
                let e = self.infer_expr(else_branch)?;
                self.storage.unify(t, e)?;
                t
            }
            ExprKind::Let { name, value, body } => {
                let v = self.infer_expr(value)?;
                let saved = self.bind(name, v);
                let b = self.infer_expr(body)?;
                self.restore(name, saved);
                b
            }
            ExprKind::Share {
                original,
                clones,
                body,
            } => {
                // Only trees may be shared; both clones see the original's
                // type unchanged.
                let Some(&orig) = self.env.get(&original) else {
                    return Err(TypeError::Unbound {
                        name: self.module[original].text.clone(),
                    });
                };
                let elem = self.storage.new_var();
                let tree = self.storage.insert(Ty::Tree(elem));
                self.storage.unify(orig, tree)?;
                let saved0 = self.bind(clones[0], orig);
                let saved1 = self.bind(clones[1], orig);
                let b = self.infer_expr(body)?;
                self.restore(clones[1], saved1);
                self.restore(clones[0], saved0);
                b
            }
        };
        self.expr_keys.insert(expr, key);
        Ok(key)
    }
}

// ====== tests ============================================================
