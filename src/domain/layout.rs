//! Incremental constraint layout for capture-graph nodes.
//!
//! Two strength tiers: required constraints (box bounds, parent-below
//! ordering) must hold exactly; strong constraints (dependency sources kept
//! left of their targets) are best effort and may go unsatisfied when the
//! graph's structure makes them infeasible. Solving never fails for
//! well-formed input: rejected constraints degrade layout quality only.

use std::collections::HashMap;

use cassowary::strength::{REQUIRED, STRONG};
use cassowary::WeightedRelation::GE;
use cassowary::{Constraint, Solver, Variable};
use log::debug;
use serde::Serialize;

use crate::domain::graph::{Edge, EdgeKind};

/// Soft maximum node width, enforced as `-1 * width + MAX >= 0`.
pub const MAX_NODE_WIDTH: f64 = 200.0;
/// Hard minimum node height.
pub const MIN_NODE_HEIGHT: f64 = 100.0;

/// Solved coordinates for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NodeBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

struct BoxVars {
    x: Variable,
    y: Variable,
    width: Variable,
    height: Variable,
}

pub struct LayoutSolver {
    solver: Solver,
    boxes: HashMap<String, BoxVars>,
}

impl Default for LayoutSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutSolver {
    pub fn new() -> Self {
        Self {
            solver: Solver::new(),
            boxes: HashMap::new(),
        }
    }

    /// Create the four variables and required box constraints for each id.
    pub fn add_boxes<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in ids {
            let id = id.into();
            if self.boxes.contains_key(&id) {
                continue;
            }
            let x = Variable::new();
            let y = Variable::new();
            let width = Variable::new();
            let height = Variable::new();

            for variable in [x, y, width, height] {
                if let Err(error) = self.solver.add_edit_variable(variable, STRONG) {
                    debug!("layout: edit variable rejected for {}: {:?}", id, error);
                }
            }

            self.apply(width * -1.0 + MAX_NODE_WIDTH | GE(REQUIRED) | 0.0);
            self.apply(height | GE(REQUIRED) | MIN_NODE_HEIGHT);
            self.apply(x | GE(REQUIRED) | 0.0);
            self.apply(y | GE(REQUIRED) | 0.0);

            self.boxes.insert(id, BoxVars { x, y, width, height });
        }
    }

    /// Ordering constraints per edge: children never above their parents
    /// (required), dependency sources preferentially left of their targets
    /// (strong, violable). Edges touching unknown ids are skipped.
    pub fn add_edge_constraints<'a>(&mut self, edges: impl IntoIterator<Item = &'a Edge>) {
        for edge in edges {
            let (Some(source), Some(target)) =
                (self.boxes.get(&edge.source), self.boxes.get(&edge.target))
            else {
                debug!(
                    "layout: skipping edge {} -> {} (unknown box)",
                    edge.source, edge.target
                );
                continue;
            };
            let constraint = match edge.kind {
                EdgeKind::Parent => target.y | GE(REQUIRED) | source.y + source.height,
                EdgeKind::Dependency => source.x + source.width | GE(STRONG) | target.x,
            };
            self.apply(constraint);
        }
    }

    /// Resolve all variables. Infeasible or duplicate constraints were
    /// already dropped at insertion time, so this cannot fail.
    pub fn solve(&mut self) {
        let changed = self.solver.fetch_changes().len();
        debug!("layout: solve updated {} variables", changed);
    }

    /// Concrete coordinates per node id.
    pub fn boxes(&self) -> HashMap<String, NodeBox> {
        self.boxes
            .iter()
            .map(|(id, vars)| {
                (
                    id.clone(),
                    NodeBox {
                        x: self.solver.get_value(vars.x),
                        y: self.solver.get_value(vars.y),
                        width: self.solver.get_value(vars.width),
                        height: self.solver.get_value(vars.height),
                    },
                )
            })
            .collect()
    }

    fn apply(&mut self, constraint: Constraint) {
        if let Err(error) = self.solver.add_constraint(constraint) {
            debug!("layout: constraint rejected: {:?}", error);
        }
    }
}
