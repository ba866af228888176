//! Resource-annotated typing: walk a normalized, shared, simply-typed
//! expression and emit the constraints relating potential at each program
//! point.
//!
//! Underivable steps never panic and never abort the walk; they embed an
//! `Unsat` with a readable reason so the full constraint tree stays
//! assemblable for diagnostics.

use lang_ast::{ExprId, ExprKind, Literal, Module, NameId};
use lang_ty::{SimpleTy, TypeTable};
use rustc_hash::FxHashMap;

use crate::annotation::{AnnotatedTy, Annotation, Feature, FnAnnotation};
use crate::coefficient::{CoeffArena, Coefficient};
use crate::constraints::{Constraint, ConstraintCtx, Sum};

pub struct InferCtx<'a> {
    module: &'a Module,
    types: &'a TypeTable,
    coeffs: &'a mut CoeffArena,
    signatures: &'a FxHashMap<NameId, FnAnnotation>,
    /// Potential currently assigned to each in-scope tree-typed name.
    context: FxHashMap<NameId, Annotation>,
    constraints: ConstraintCtx,
}

/// Annotate one expression. `params` carries the caller-chosen entry
/// annotations of the tree-typed free names (scalars pass `None`). Returns
/// the annotated type and the assembled constraint tree.
pub fn infer_expr(
    module: &Module,
    types: &TypeTable,
    coeffs: &mut CoeffArena,
    signatures: &FxHashMap<NameId, FnAnnotation>,
    params: &[(NameId, Option<Annotation>)],
    expr: ExprId,
) -> (AnnotatedTy, Constraint) {
    let mut ctx = InferCtx::new(module, types, coeffs, signatures);
    for (name, annotation) in params {
        if let Some(annotation) = annotation {
            ctx.bind(*name, *annotation);
        }
    }
    let ty = ctx.infer(expr);
    let root = ctx.finish();
    log::debug!("generated constraints: {root}");
    (ty, root)
}

impl<'a> InferCtx<'a> {
    pub fn new(
        module: &'a Module,
        types: &'a TypeTable,
        coeffs: &'a mut CoeffArena,
        signatures: &'a FxHashMap<NameId, FnAnnotation>,
    ) -> Self {
        InferCtx {
            module,
            types,
            coeffs,
            signatures,
            context: FxHashMap::default(),
            constraints: ConstraintCtx::new(),
        }
    }

    pub fn bind(&mut self, name: NameId, annotation: Annotation) {
        self.context.insert(name, annotation);
    }

    pub fn finish(self) -> Constraint {
        self.constraints.into_root()
    }

    fn name_text(&self, name: NameId) -> &str {
        &self.module[name].text
    }

    fn expr_ty(&mut self, expr: ExprId) -> SimpleTy {
        match self.types.expr_ty(expr) {
            Some(ty) => ty.clone(),
            None => {
                self.constraints
                    .add(Constraint::unsat("expression reached the generator untyped"));
                SimpleTy::num()
            }
        }
    }

    pub fn infer(&mut self, expr: ExprId) -> AnnotatedTy {
        match self.module[expr].kind.clone() {
            ExprKind::Ident(name) => self.infer_ident(expr, name),
            ExprKind::Lit(Literal::Leaf) => {
                AnnotatedTy::tree(self.expr_ty(expr), Annotation::zero())
            }
            ExprKind::Lit(_) => AnnotatedTy::scalar(self.expr_ty(expr)),
            ExprKind::Node { left, value, right } => self.infer_node(expr, left, value, right),
            ExprKind::Apply { callee, args } => self.infer_apply(expr, callee, &args),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.infer_if(expr, cond, then_branch, else_branch),
            ExprKind::Let { name, value, body } => {
                let value_ty = self.infer(value);
                // Save whatever the name meant outside before (maybe)
                // binding it; a scalar binding must not erase an outer
                // tree's entry.
                let shadowed = self.context.remove(&name);
                if let Some(ann) = value_ty.annotation {
                    self.context.insert(name, ann);
                }
                let body_ty = self.infer(body);
                self.context.remove(&name);
                if let Some(ann) = shadowed {
                    self.context.insert(name, ann);
                }
                body_ty
            }
            ExprKind::Share {
                original,
                clones,
                body,
            } => self.infer_share(original, clones, body),
        }
    }

    /// A tree identifier carries exactly the potential the context assigns
    /// it; the result annotation is a fresh copy tied by equalities so that
    /// downstream substitution never aliases the context entry.
    ///
    /// Tree uses are linear: the lookup consumes the context entry, so a
    /// second use not mediated by a share finds nothing and embeds an
    /// `Unsat` instead of double-counting the potential.
    fn infer_ident(&mut self, expr: ExprId, name: NameId) -> AnnotatedTy {
        let ty = self.expr_ty(expr);
        if !ty.is_tree() {
            return AnnotatedTy::scalar(ty);
        }
        let label = self.name_text(name).to_owned();
        let result = Annotation::fresh(self.coeffs, &label);
        match self.context.remove(&name) {
            Some(entry) => self.constraints.eq_features(&entry, &result),
            None => self.constraints.add(Constraint::unsat(format!(
                "no potential available for `{label}` (unbound, consumed, or duplicated without a share)"
            ))),
        }
        AnnotatedTy::tree(ty, result)
    }

    /// Constructing a node sums the operands' structural potential into the
    /// result and pays one unit of allocation cost out of the constant
    /// slots: available unit potential must cover the result's plus the
    /// cost.
    fn infer_node(
        &mut self,
        expr: ExprId,
        left: ExprId,
        value: ExprId,
        right: ExprId,
    ) -> AnnotatedTy {
        let left_ty = self.infer(left);
        self.infer(value);
        let right_ty = self.infer(right);

        let ty = self.expr_ty(expr);
        let result = Annotation::fresh(self.coeffs, "node");
        let (Some(left_ann), Some(right_ann)) = (left_ty.annotation, right_ty.annotation) else {
            self.constraints.add(Constraint::unsat(
                "tree constructor operand carries no annotation",
            ));
            return AnnotatedTy::tree(ty, result);
        };

        for feature in Feature::STRUCTURAL {
            self.constraints.add(Constraint::eq(
                result[feature],
                vec![left_ann[feature], right_ann[feature]],
            ));
        }
        self.constraints.add(Constraint::ge(
            vec![left_ann[Feature::Unit], right_ann[Feature::Unit]],
            vec![result[Feature::Unit], Coefficient::known(1)],
        ));
        AnnotatedTy::tree(ty, result)
    }

    /// Sharing splits the original's potential between the clones: for
    /// every feature, the clones together may hold at most what the
    /// original held. The original is consumed.
    fn infer_share(&mut self, original: NameId, clones: [NameId; 2], body: ExprId) -> AnnotatedTy {
        match self.context.remove(&original) {
            Some(orig_ann) => {
                let labels = clones.map(|c| self.name_text(c).to_owned());
                let first = Annotation::fresh(self.coeffs, &labels[0]);
                let second = Annotation::fresh(self.coeffs, &labels[1]);
                for feature in Feature::ALL {
                    self.constraints.add(Constraint::le(
                        vec![first[feature], second[feature]],
                        Sum::from(orig_ann[feature]),
                    ));
                }
                self.bind(clones[0], first);
                self.bind(clones[1], second);
            }
            None => self.constraints.add(Constraint::unsat(format!(
                "cannot split potential of unannotated `{}`",
                self.name_text(original)
            ))),
        }
        let body_ty = self.infer(body);
        self.context.remove(&clones[0]);
        self.context.remove(&clones[1]);
        body_ty
    }

    /// Both branches must agree on the potential visible after the
    /// conditional, reconciled against a fresh join annotation.
    fn infer_if(
        &mut self,
        expr: ExprId,
        cond: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    ) -> AnnotatedTy {
        self.infer(cond);
        // Only one branch runs: both start from the same entries, and a
        // name consumed in either branch is unavailable afterwards.
        let before = self.context.clone();
        let then_ty = self.infer(then_branch);
        let after_then = std::mem::replace(&mut self.context, before);
        let else_ty = self.infer(else_branch);
        self.context.retain(|name, _| after_then.contains_key(name));

        let ty = self.expr_ty(expr);
        if !ty.is_tree() {
            return AnnotatedTy::scalar(ty);
        }
        let join = Annotation::fresh(self.coeffs, "join");
        for branch in [then_ty.annotation, else_ty.annotation] {
            match branch {
                Some(ann) => self.constraints.eq_features(&ann, &join),
                None => self
                    .constraints
                    .add(Constraint::unsat("conditional branch carries no annotation")),
            }
        }
        AnnotatedTy::tree(ty, join)
    }

    /// A call instantiates the callee's annotation scheme freshly and ties
    /// the actual arguments to the instantiated parameter annotations.
    fn infer_apply(&mut self, expr: ExprId, callee: NameId, args: &[ExprId]) -> AnnotatedTy {
        let ty = self.expr_ty(expr);
        let Some(scheme) = self.signatures.get(&callee) else {
            self.constraints.add(Constraint::unsat(format!(
                "call to `{}` which has no annotation scheme",
                self.name_text(callee)
            )));
            for &arg in args {
                self.infer(arg);
            }
            return if ty.is_tree() {
                let fallback = Annotation::fresh(self.coeffs, "call");
                AnnotatedTy::tree(ty, fallback)
            } else {
                AnnotatedTy::scalar(ty)
            };
        };
        let site = self.name_text(callee).to_owned();
        let instance = scheme.instantiate(self.coeffs, &site);
        for constraint in instance.constraints {
            self.constraints.add(constraint);
        }
        if instance.params.len() != args.len() {
            self.constraints.add(Constraint::unsat(format!(
                "`{site}` called with {} arguments, scheme has {}",
                args.len(),
                instance.params.len()
            )));
        }
        for (&arg, param) in args.iter().zip(&instance.params) {
            let arg_ty = self.infer(arg);
            match (arg_ty.annotation, param) {
                (Some(arg_ann), Some(param_ann)) => {
                    self.constraints.eq_features(&arg_ann, param_ann);
                }
                (None, None) => {}
                _ => self.constraints.add(Constraint::unsat(format!(
                    "argument shape does not match `{site}`'s scheme"
                ))),
            }
        }
        if ty.is_tree() {
            let result = instance.result.unwrap_or_else(|| {
                self.constraints.add(Constraint::unsat(format!(
                    "`{site}` returns a tree but its scheme has no result annotation"
                )));
                Annotation::fresh(self.coeffs, "call")
            });
            AnnotatedTy::tree(ty, result)
        } else {
            AnnotatedTy::scalar(ty)
        }
    }
}
