//! Diagnostic constraint graph.
//!
//! Structure only: nodes are coefficients (keyed by identity), edges carry
//! the relation between a left-hand and a right-hand term. Rendering is the
//! caller's concern.

use miette::Diagnostic;
use petgraph::graph::DiGraph;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::coefficient::Coefficient;
use crate::constraints::Constraint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphEdge {
    Eq,
    Le,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum GraphError {
    #[error("constraint system has no representable structure")]
    #[diagnostic(code(lang_res::graph_not_representable))]
    NotRepresentable,
}

/// Export a constraint tree as a coefficient dependency graph.
pub fn constraint_graph(root: &Constraint) -> Result<DiGraph<Coefficient, GraphEdge>, GraphError> {
    let mut graph = DiGraph::new();
    let mut nodes = FxHashMap::default();
    root.to_graph(&mut graph, &mut nodes)?;
    Ok(graph)
}
