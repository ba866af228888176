//! Solver adapter: encode the root constraint into real arithmetic, invoke
//! Z3, and decode a model back into rational coefficient values.
//!
//! Everything solver-specific lives here and in `Constraint::encode`; the
//! rest of the crate sees only `solve` and its outcome types.

use miette::Diagnostic;
use num_rational::Rational64;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;
use z3::ast::Real;
use z3::{SatResult, Solver};

use crate::coefficient::{CoeffArena, CoeffId, Coefficient};
use crate::constraints::Constraint;

/// Numeric domain the constraint system is solved over. Both map onto the
/// solver's real arithmetic; linear constraints over rationals always admit
/// rational models, so decoding is exact either way. The distinction is
/// kept for callers that want to state their intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Rational,
    Real,
}

/// One solver variable per distinct unknown coefficient. Knowns are encoded
/// as literals on the fly and never appear here.
pub struct SolverVars {
    vars: FxHashMap<CoeffId, Real>,
}

impl SolverVars {
    fn for_constraint(root: &Constraint, arena: &CoeffArena) -> Self {
        let mut vars = FxHashMap::default();
        for coeff in root.occurring() {
            if let Coefficient::Unknown(id) = coeff {
                let name = format!("{}_{}", arena[id].label, u32::from(id.into_raw()));
                vars.entry(id).or_insert_with(|| Real::new_const(name));
            }
        }
        SolverVars { vars }
    }

    pub(crate) fn real_of(&self, coeff: Coefficient) -> Real {
        match coeff {
            Coefficient::Unknown(id) => self.vars[&id].clone(),
            Coefficient::Known(value) => real_literal(value),
        }
    }
}

fn real_literal(value: Rational64) -> Real {
    // numer/denom render as plain decimal integers, always a valid literal
    Real::from_real_str(&value.numer().to_string(), &value.denom().to_string())
        .expect("rational renders as a valid real literal")
}

/// A total assignment of the unknowns that occurred in the solved system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Valuation {
    values: FxHashMap<CoeffId, Rational64>,
}

impl Valuation {
    /// The value of a coefficient under this valuation. Knowns evaluate to
    /// themselves; unknowns the system never mentioned have no value.
    pub fn get(&self, coeff: Coefficient) -> Option<Rational64> {
        match coeff {
            Coefficient::Known(value) => Some(value),
            Coefficient::Unknown(id) => self.values.get(&id).copied(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (CoeffId, Rational64)> + '_ {
        self.values.iter().map(|(&id, &v)| (id, v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveOutcome {
    Sat(Valuation),
    /// No solution. `core` is a best-effort minimal explanatory subset of
    /// the atomic constraints; empty when narrowing was unhelpful.
    Unsat { core: Vec<Constraint> },
}

#[derive(Debug, Clone, Error, Diagnostic)]
pub enum SolverError {
    /// The decision procedure gave up (timeout, incompleteness). Callers
    /// treat this as unsatisfiable-with-unknown-reason.
    #[error("solver returned unknown: {0}")]
    #[diagnostic(code(lang_res::solver_unknown))]
    Unknown(String),

    #[error("could not decode a model value for `{0}`")]
    #[diagnostic(code(lang_res::solver_decode))]
    Decode(SmolStr),
}

/// Solve the assembled constraint system.
pub fn solve(
    root: &Constraint,
    arena: &CoeffArena,
    domain: Domain,
) -> Result<SolveOutcome, SolverError> {
    let vars = SolverVars::for_constraint(root, arena);
    log::debug!(
        "solving over {:?}: {} unknowns, root {root}",
        domain,
        vars.vars.len()
    );

    let solver = Solver::new();
    solver.assert(&root.encode(&vars));
    match solver.check() {
        SatResult::Sat => {
            let model = solver
                .get_model()
                .ok_or_else(|| SolverError::Unknown("sat result without a model".into()))?;
            let mut values = FxHashMap::default();
            for (&id, var) in &vars.vars {
                let evaluated = model
                    .eval(var, true)
                    .and_then(|v| v.as_real())
                    .ok_or_else(|| SolverError::Decode(arena[id].label.clone()))?;
                values.insert(id, Rational64::new(evaluated.0, evaluated.1));
            }
            Ok(SolveOutcome::Sat(Valuation { values }))
        }
        SatResult::Unsat => Ok(SolveOutcome::Unsat {
            core: narrow_core(root, arena),
        }),
        SatResult::Unknown => Err(SolverError::Unknown(
            solver
                .get_reason_unknown()
                .unwrap_or_else(|| "no reason given".into()),
        )),
    }
}

/// Incremental relaxation: an atom belongs to the core when dropping it
/// makes the remainder satisfiable. Quality-of-implementation diagnostics,
/// not needed for correctness; solver hiccups during a trial just leave the
/// atom out.
fn narrow_core(root: &Constraint, arena: &CoeffArena) -> Vec<Constraint> {
    let atoms = root.atoms();
    if let Some(unsat) = atoms
        .iter()
        .find(|a| matches!(a, Constraint::Unsat { .. }))
    {
        return vec![(*unsat).clone()];
    }
    if atoms.len() < 2 {
        return atoms.into_iter().cloned().collect();
    }

    let mut core = Vec::new();
    for dropped in 0..atoms.len() {
        let rest: Vec<Constraint> = atoms
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != dropped)
            .map(|(_, a)| (*a).clone())
            .collect();
        let trial = Constraint::conj(rest);
        let vars = SolverVars::for_constraint(&trial, arena);
        let solver = Solver::new();
        solver.assert(&trial.encode(&vars));
        if solver.check() == SatResult::Sat {
            core.push(atoms[dropped].clone());
        }
    }
    core
}
