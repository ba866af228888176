//! The constraint algebra: arithmetic relations over sums of coefficients.
//!
//! Every operation is a total match over the variant set. `Unsat` is the
//! canonical unsolvable constraint; it carries a reason for diagnostics but
//! encodes to `false` no matter what the reason says, and exposes no
//! coefficients to `replace`/`occurring`.

use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use z3::ast::{Ast, Bool};

use crate::annotation::{Annotation, Feature};
use crate::coefficient::Coefficient;
use crate::graph::{GraphEdge, GraphError};
use crate::solve::SolverVars;

/// A non-empty sum of coefficients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sum(Vec<Coefficient>);

impl Sum {
    /// # Panics
    ///
    /// Panics on an empty term list.
    pub fn new(terms: Vec<Coefficient>) -> Self {
        assert!(!terms.is_empty(), "a sum needs at least one term");
        Sum(terms)
    }

    pub fn terms(&self) -> &[Coefficient] {
        &self.0
    }

    fn replace(&self, target: Coefficient, replacement: Coefficient) -> Sum {
        Sum(self
            .0
            .iter()
            .map(|&c| if c == target { replacement } else { c })
            .collect())
    }

    fn encode(&self, vars: &SolverVars) -> z3::ast::Real {
        let mut terms = self.0.iter().map(|&c| vars.real_of(c));
        let first = terms.next().expect("sums are never empty");
        terms.fold(first, |acc, term| acc + term)
    }
}

impl From<Coefficient> for Sum {
    fn from(c: Coefficient) -> Self {
        Sum(vec![c])
    }
}

impl From<Vec<Coefficient>> for Sum {
    fn from(terms: Vec<Coefficient>) -> Self {
        Sum::new(terms)
    }
}

impl fmt::Display for Sum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Le,
    Ge,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::Le => write!(f, "≤"),
            Relation::Ge => write!(f, "≥"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Eq {
        lhs: Sum,
        rhs: Sum,
    },
    Ineq {
        lhs: Sum,
        rhs: Sum,
        rel: Relation,
    },
    /// Non-empty conjunction. An empty one would be a silent `true`, which
    /// is always a bug in the generator, so construction panics instead.
    Conj(Vec<Constraint>),
    Unsat {
        reason: SmolStr,
    },
}

impl Constraint {
    pub fn eq(lhs: impl Into<Sum>, rhs: impl Into<Sum>) -> Self {
        Constraint::Eq {
            lhs: lhs.into(),
            rhs: rhs.into(),
        }
    }

    pub fn le(lhs: impl Into<Sum>, rhs: impl Into<Sum>) -> Self {
        Constraint::Ineq {
            lhs: lhs.into(),
            rhs: rhs.into(),
            rel: Relation::Le,
        }
    }

    pub fn ge(lhs: impl Into<Sum>, rhs: impl Into<Sum>) -> Self {
        Constraint::Ineq {
            lhs: lhs.into(),
            rhs: rhs.into(),
            rel: Relation::Ge,
        }
    }

    /// # Panics
    ///
    /// Panics when `children` is empty.
    pub fn conj(children: Vec<Constraint>) -> Self {
        assert!(!children.is_empty(), "conjunction of no constraints");
        Constraint::Conj(children)
    }

    pub fn unsat(reason: impl Into<SmolStr>) -> Self {
        Constraint::Unsat {
            reason: reason.into(),
        }
    }

    /// Substitute `target` by `replacement` everywhere. `Unsat` has no
    /// coefficients and comes back unchanged.
    pub fn replace(&self, target: Coefficient, replacement: Coefficient) -> Constraint {
        match self {
            Constraint::Eq { lhs, rhs } => Constraint::Eq {
                lhs: lhs.replace(target, replacement),
                rhs: rhs.replace(target, replacement),
            },
            Constraint::Ineq { lhs, rhs, rel } => Constraint::Ineq {
                lhs: lhs.replace(target, replacement),
                rhs: rhs.replace(target, replacement),
                rel: *rel,
            },
            Constraint::Conj(children) => Constraint::Conj(
                children
                    .iter()
                    .map(|c| c.replace(target, replacement))
                    .collect(),
            ),
            Constraint::Unsat { .. } => self.clone(),
        }
    }

    /// The set of coefficients this constraint mentions. Empty for `Unsat`.
    pub fn occurring(&self) -> FxHashSet<Coefficient> {
        let mut out = FxHashSet::default();
        self.occurring_into(&mut out);
        out
    }

    fn occurring_into(&self, out: &mut FxHashSet<Coefficient>) {
        match self {
            Constraint::Eq { lhs, rhs } | Constraint::Ineq { lhs, rhs, .. } => {
                out.extend(lhs.terms().iter().copied());
                out.extend(rhs.terms().iter().copied());
            }
            Constraint::Conj(children) => {
                for child in children {
                    child.occurring_into(out);
                }
            }
            Constraint::Unsat { .. } => {}
        }
    }

    /// The leaves of the constraint tree, in generation order. Used by the
    /// solver's unsat-core narrowing.
    pub fn atoms(&self) -> Vec<&Constraint> {
        let mut out = Vec::new();
        self.atoms_into(&mut out);
        out
    }

    fn atoms_into<'a>(&'a self, out: &mut Vec<&'a Constraint>) {
        match self {
            Constraint::Conj(children) => {
                for child in children {
                    child.atoms_into(out);
                }
            }
            _ => out.push(self),
        }
    }

    /// Encode against the solver variable mapping. `Conj` is the AND of its
    /// children; `Unsat` is the `false` literal regardless of reason.
    pub fn encode(&self, vars: &SolverVars) -> Bool {
        match self {
            Constraint::Eq { lhs, rhs } => lhs.encode(vars)._eq(&rhs.encode(vars)),
            Constraint::Ineq { lhs, rhs, rel } => {
                let lhs = lhs.encode(vars);
                let rhs = rhs.encode(vars);
                match rel {
                    Relation::Le => lhs.le(&rhs),
                    Relation::Ge => lhs.ge(&rhs),
                }
            }
            Constraint::Conj(children) => {
                let encoded: Vec<Bool> = children.iter().map(|c| c.encode(vars)).collect();
                Bool::and(&encoded.iter().collect::<Vec<_>>())
            }
            Constraint::Unsat { .. } => Bool::from_bool(false),
        }
    }

    /// Diagnostic export: one node per coefficient, one edge per
    /// lhs-term/rhs-term pair, labelled with the relation. A conjunction
    /// consisting solely of unsatisfiable children has no structure worth
    /// drawing and is rejected; a bare `Unsat` leaf inside a mixed tree
    /// renders nothing.
    pub fn to_graph(
        &self,
        graph: &mut DiGraph<Coefficient, GraphEdge>,
        nodes: &mut FxHashMap<Coefficient, NodeIndex>,
    ) -> Result<(), GraphError> {
        match self {
            Constraint::Eq { lhs, rhs } => {
                Self::graph_atom(graph, nodes, lhs, rhs, GraphEdge::Eq);
                Ok(())
            }
            Constraint::Ineq { lhs, rhs, rel } => {
                let edge = match rel {
                    Relation::Le => GraphEdge::Le,
                    Relation::Ge => GraphEdge::Ge,
                };
                Self::graph_atom(graph, nodes, lhs, rhs, edge);
                Ok(())
            }
            Constraint::Conj(children) => {
                if children
                    .iter()
                    .all(|c| matches!(c, Constraint::Unsat { .. }))
                {
                    return Err(GraphError::NotRepresentable);
                }
                for child in children {
                    child.to_graph(graph, nodes)?;
                }
                Ok(())
            }
            Constraint::Unsat { .. } => Ok(()),
        }
    }

    fn graph_atom(
        graph: &mut DiGraph<Coefficient, GraphEdge>,
        nodes: &mut FxHashMap<Coefficient, NodeIndex>,
        lhs: &Sum,
        rhs: &Sum,
        edge: GraphEdge,
    ) {
        let mut node_of = |graph: &mut DiGraph<Coefficient, GraphEdge>, c: Coefficient| {
            *nodes.entry(c).or_insert_with(|| graph.add_node(c))
        };
        for &l in lhs.terms() {
            let from = node_of(graph, l);
            for &r in rhs.terms() {
                let to = node_of(graph, r);
                graph.add_edge(from, to, edge);
            }
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Eq { lhs, rhs } => write!(f, "{lhs} = {rhs}"),
            Constraint::Ineq { lhs, rhs, rel } => write!(f, "{lhs} {rel} {rhs}"),
            Constraint::Conj(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ∧ ")?;
                    }
                    write!(f, "({child})")?;
                }
                Ok(())
            }
            Constraint::Unsat { reason } => write!(f, "⊥[{reason}]"),
        }
    }
}

/// Accumulator the generator threads through one analysis. Drained into a
/// single root conjunction at the end.
#[derive(Debug, Default)]
pub struct ConstraintCtx {
    constraints: Vec<Constraint>,
}

impl ConstraintCtx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    /// Per-feature equality between two annotations.
    pub fn eq_features(&mut self, a: &Annotation, b: &Annotation) {
        for feature in Feature::ALL {
            self.add(Constraint::eq(a[feature], b[feature]));
        }
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// The root conjunction. An analysis that generated nothing solves
    /// trivially, so the empty case becomes `0 = 0` rather than tripping
    /// the non-empty `Conj` invariant.
    pub fn into_root(self) -> Constraint {
        if self.constraints.is_empty() {
            Constraint::eq(Coefficient::known(0), Coefficient::known(0))
        } else {
            Constraint::conj(self.constraints)
        }
    }
}
