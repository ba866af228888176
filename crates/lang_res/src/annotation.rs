//! Annotated types: a simple type plus, for tree-shaped values, one
//! potential coefficient per structural feature.

use std::ops;

use lang_ty::SimpleTy;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::coefficient::{CoeffArena, Coefficient};
use crate::constraints::Constraint;

/// The structural features a tree annotation is indexed by. `Size` counts
/// nodes, the depth classes track the left/right spine contribution, and
/// `Unit` is the constant slot that pays per-operation costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Size,
    LeftDepth,
    RightDepth,
    Unit,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::Size,
        Feature::LeftDepth,
        Feature::RightDepth,
        Feature::Unit,
    ];
    pub const COUNT: usize = 4;

    /// Features whose potential is additive over the two subtrees of a
    /// constructed node. `Unit` is excluded: the constant slot is where
    /// construction cost is paid, through weakening.
    pub const STRUCTURAL: [Feature; 3] =
        [Feature::Size, Feature::LeftDepth, Feature::RightDepth];

    fn index(self) -> usize {
        match self {
            Feature::Size => 0,
            Feature::LeftDepth => 1,
            Feature::RightDepth => 2,
            Feature::Unit => 3,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Feature::Size => "size",
            Feature::LeftDepth => "ldepth",
            Feature::RightDepth => "rdepth",
            Feature::Unit => "unit",
        }
    }
}

/// The potential annotation of one tree-typed program point: exactly one
/// coefficient per feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Annotation([Coefficient; Feature::COUNT]);

impl Annotation {
    /// One fresh unknown per feature, labelled `{label}.{feature}`.
    pub fn fresh(arena: &mut CoeffArena, label: &str) -> Self {
        Annotation(Feature::ALL.map(|f| arena.fresh(format!("{label}.{}", f.suffix()))))
    }

    /// The zero potential, all slots `Known(0)`. The annotation of `leaf`.
    pub fn zero() -> Self {
        Annotation([Coefficient::known(0); Feature::COUNT])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, Coefficient)> + '_ {
        Feature::ALL.into_iter().map(|f| (f, self[f]))
    }

    pub fn replace(&self, target: Coefficient, replacement: Coefficient) -> Self {
        Annotation(self.0.map(|c| if c == target { replacement } else { c }))
    }
}

impl ops::Index<Feature> for Annotation {
    type Output = Coefficient;
    fn index(&self, feature: Feature) -> &Self::Output {
        &self.0[feature.index()]
    }
}

/// A simple type with its potential annotation. `annotation` is `Some`
/// exactly when the type is tree-shaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedTy {
    pub ty: SimpleTy,
    pub annotation: Option<Annotation>,
}

impl AnnotatedTy {
    pub fn scalar(ty: SimpleTy) -> Self {
        AnnotatedTy {
            ty,
            annotation: None,
        }
    }

    pub fn tree(ty: SimpleTy, annotation: Annotation) -> Self {
        AnnotatedTy {
            ty,
            annotation: Some(annotation),
        }
    }
}

/// The annotation scheme of a top-level function: one annotation per
/// tree-typed parameter, one for a tree-typed result, and the constraints
/// the scheme's own coefficients must satisfy. Instantiated freshly at
/// every call site so recursive calls do not alias the definition's
/// unknowns.
#[derive(Debug, Clone, Default)]
pub struct FnAnnotation {
    pub params: Vec<Option<Annotation>>,
    pub result: Option<Annotation>,
    pub constraints: Vec<Constraint>,
}

impl FnAnnotation {
    /// Allocate a scheme for a signature: fresh unknowns for every
    /// tree-shaped position, `None` for scalars.
    pub fn fresh(
        arena: &mut CoeffArena,
        name: &str,
        param_tys: &[SimpleTy],
        result_ty: &SimpleTy,
    ) -> Self {
        let params = param_tys
            .iter()
            .enumerate()
            .map(|(i, ty)| {
                ty.is_tree()
                    .then(|| Annotation::fresh(arena, &format!("{name}.arg{i}")))
            })
            .collect();
        let result = result_ty
            .is_tree()
            .then(|| Annotation::fresh(arena, &format!("{name}.ret")));
        FnAnnotation {
            params,
            result,
            constraints: Vec::new(),
        }
    }

    /// Fresh copy for one call site: every unknown of the scheme is
    /// replaced by a newly allocated unknown, consistently across params,
    /// result, and the scheme's constraints.
    pub fn instantiate(&self, arena: &mut CoeffArena, site: &str) -> FnAnnotation {
        let mut subst: FxHashMap<Coefficient, Coefficient> = FxHashMap::default();
        let mut freshen = |arena: &mut CoeffArena, c: Coefficient| {
            if !c.is_unknown() {
                return;
            }
            subst
                .entry(c)
                .or_insert_with(|| arena.fresh(SmolStr::new(format!("{c}@{site}"))));
        };
        for ann in self.params.iter().flatten() {
            for (_, c) in ann.iter() {
                freshen(arena, c);
            }
        }
        if let Some(ann) = &self.result {
            for (_, c) in ann.iter() {
                freshen(arena, c);
            }
        }
        for constraint in &self.constraints {
            for c in constraint.occurring() {
                freshen(arena, c);
            }
        }

        let apply_ann = |ann: &Annotation| {
            subst
                .iter()
                .fold(*ann, |acc, (&from, &to)| acc.replace(from, to))
        };
        let apply_constraint = |constraint: &Constraint| {
            subst
                .iter()
                .fold(constraint.clone(), |acc, (&from, &to)| acc.replace(from, to))
        };
        FnAnnotation {
            params: self.params.iter().map(|p| p.as_ref().map(apply_ann)).collect(),
            result: self.result.as_ref().map(apply_ann),
            constraints: self.constraints.iter().map(apply_constraint).collect(),
        }
    }
}
