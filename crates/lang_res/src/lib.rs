//! Amortized resource-bound inference.
//!
//! For each analyzed function the engine derives a potential function over
//! the shape of its tree-typed inputs and outputs: a vector of unknown
//! rational coefficients per annotated position, related by arithmetic
//! constraints generated from the function body. A satisfying valuation of
//! the joint constraint system certifies an upper bound on the resource
//! usage of the whole program.
//!
//! Pipeline per function: simple-type the body (`lang_ty`), rewrite it into
//! administrative normal form and make tree duplication explicit
//! (`lang_ast`), then run the annotated typing rules (`generate`) and solve
//! the assembled system (`solve`).

pub mod annotation;
pub mod coefficient;
pub mod constraints;
pub mod generate;
pub mod graph;
pub mod solve;


#[cfg(test)]
mod pbt;

use lang_ast::{normalize, uniquify, unshare, ExprId, Module, NameId};
use lang_ty::{infer_fn, FnSig};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

pub use annotation::{AnnotatedTy, Annotation, Feature, FnAnnotation};
pub use coefficient::{CoeffArena, CoeffId, Coefficient};
pub use constraints::{Constraint, ConstraintCtx, Relation, Sum};
pub use generate::{infer_expr, InferCtx};
pub use graph::{constraint_graph, GraphEdge, GraphError};
pub use solve::{solve, Domain, SolveOutcome, SolverError, Valuation};

/// A top-level function definition. The body is the expression as parsed;
/// the driver normalizes and unshares it.
#[derive(Debug, Clone)]
pub struct FnDef {
    pub name: NameId,
    pub params: Vec<NameId>,
    pub body: ExprId,
}

/// One analyzable program: a module plus its function definitions and
/// declared signatures.
#[derive(Debug, Default)]
pub struct Program {
    pub module: Module,
    pub fns: Vec<FnDef>,
    pub sigs: FxHashMap<NameId, FnSig>,
}

/// The result of one analysis run. `schemes` holds the per-function
/// annotation schemes whose coefficients the valuation (if satisfiable)
/// assigns; `root` is the full constraint tree, kept for diagnostics and
/// graph export.
#[derive(Debug)]
pub struct Analysis {
    pub outcome: SolveOutcome,
    pub schemes: FxHashMap<NameId, FnAnnotation>,
    pub root: Constraint,
    pub coeffs: CoeffArena,
}

#[derive(Debug, Error, Diagnostic)]
pub enum AnalysisError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Type(#[from] lang_ty::TypeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    ImproperForm(#[from] lang_ast::ImproperFormError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Solver(#[from] SolverError),

    #[error("no signature declared for function `{0}`")]
    #[diagnostic(code(lang_res::missing_signature))]
    MissingSignature(SmolStr),

    #[error("function `{name}` binds {declared} parameters but its signature lists {expected}")]
    #[diagnostic(code(lang_res::param_count))]
    ParamCount {
        name: SmolStr,
        declared: usize,
        expected: usize,
    },
}

/// Analyze a whole program: allocate one annotation scheme per function,
/// transform and annotate every body against those schemes, and solve the
/// joint constraint system.
///
/// Schemes are allocated before any body is visited so that calls,
/// recursive ones included, instantiate the callee's scheme.
pub fn analyze_program(mut program: Program, domain: Domain) -> Result<Analysis, AnalysisError> {
    let mut coeffs = CoeffArena::new();

    let mut schemes: FxHashMap<NameId, FnAnnotation> = FxHashMap::default();
    for def in &program.fns {
        let label = program.module[def.name].text.clone();
        let sig = program
            .sigs
            .get(&def.name)
            .ok_or_else(|| AnalysisError::MissingSignature(label.clone()))?;
        if sig.params.len() != def.params.len() {
            return Err(AnalysisError::ParamCount {
                name: label,
                declared: def.params.len(),
                expected: sig.params.len(),
            });
        }
        schemes.insert(
            def.name,
            FnAnnotation::fresh(&mut coeffs, &label, &sig.params, &sig.result),
        );
    }

    let mut all = ConstraintCtx::new();
    let defs = program.fns.clone();
    for def in &defs {
        let label = program.module[def.name].text.clone();
        let sig = program.sigs[&def.name].clone();
        let params: Vec<_> = def
            .params
            .iter()
            .copied()
            .zip(sig.params.iter().cloned())
            .collect();

        // Shape transforms first, then a typing pass per shape so the
        // table also covers synthesized bindings and share clones. Binders
        // are renamed apart up front: the type table and the potential
        // context are keyed by name, so shadowing must not collide.
        let body = uniquify(&mut program.module, def.body);
        let normal = normalize(&mut program.module, body);
        let mut table = infer_fn(&program.module, &program.sigs, &params, normal)?;
        let shared = unshare(&mut program.module, normal, &|n| table.is_tree_name(n))?;
        table.extend(infer_fn(&program.module, &program.sigs, &params, shared)?);
        log::debug!("analyzing `{label}`");

        let scheme = schemes[&def.name].clone();
        let entry: Vec<_> = def
            .params
            .iter()
            .copied()
            .zip(scheme.params.iter().cloned())
            .collect();
        let (result_ty, constraint) = generate::infer_expr(
            &program.module,
            &table,
            &mut coeffs,
            &schemes,
            &entry,
            shared,
        );
        all.add(constraint);

        // The body's result potential is the scheme's result annotation.
        match (result_ty.annotation, scheme.result) {
            (Some(actual), Some(declared)) => all.eq_features(&actual, &declared),
            (None, None) => {}
            _ => all.add(Constraint::unsat(format!(
                "result shape of `{label}` does not match its scheme"
            ))),
        }
    }

    let root = all.into_root();
    let outcome = solve(&root, &coeffs, domain)?;
    Ok(Analysis {
        outcome,
        schemes,
        root,
        coeffs,
    })
}
