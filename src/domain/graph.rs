//! Capture graph construction, pruning, and dependency-edge expansion.
//!
//! The graph is an arena keyed by string ids with a flat edge list, so nodes
//! can be pruned and relinked freely without ownership hazards. Two edge
//! kinds: structural `Parent` edges form a forest rooted at items without a
//! parent, while `Dependency` edges cross-link values used as call arguments.

use std::collections::HashMap;

use log::{debug, warn};
use serde::Serialize;

use crate::domain::capture::CapturedItem;
use crate::domain::value::{RawValue, TypeTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Parent,
    Dependency,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A captured item.
    Captured,
    /// Synthesized from a dependency's untracked value.
    Untracked,
    /// Synthetic anchor decoupling dependency edges from structural layout.
    Routing,
}

/// Node attributes: the captured item's data minus its join keys.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub value: Option<RawValue>,
    pub ephemeral: bool,
    pub kind: NodeKind,
}

#[derive(Default)]
pub struct CaptureGraph {
    order: Vec<String>,
    nodes: HashMap<String, NodeData>,
    edges: Vec<Edge>,
}

impl CaptureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node; returns false (keeping the existing node) on duplicate
    /// ids, which deterministic ids produce for repeated identical accesses.
    pub fn add_node(&mut self, id: impl Into<String>, data: NodeData) -> bool {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return false;
        }
        self.order.push(id.clone());
        self.nodes.insert(id, data);
        true
    }

    /// Insert an edge; returns false if either endpoint is missing.
    pub fn add_edge(
        &mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        kind: EdgeKind,
        label: Option<String>,
    ) -> bool {
        let source = source.into();
        let target = target.into();
        if !self.nodes.contains_key(&source) || !self.nodes.contains_key(&target) {
            return false;
        }
        self.edges.push(Edge {
            source,
            target,
            kind,
            label,
        });
        true
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&NodeData> {
        self.nodes.get(id)
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn in_edges<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |edge| edge.target == id)
    }

    pub fn out_edges<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |edge| edge.source == id)
    }

    pub fn in_neighbors(&self, id: &str) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for edge in self.in_edges(id) {
            if !result.contains(&edge.source) {
                result.push(edge.source.clone());
            }
        }
        result
    }

    pub fn out_neighbors(&self, id: &str) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for edge in self.out_edges(id) {
            if !result.contains(&edge.target) {
                result.push(edge.target.clone());
            }
        }
        result
    }

    /// Drop a node together with its incident edges.
    pub fn remove_node(&mut self, id: &str) {
        if self.nodes.remove(id).is_none() {
            return;
        }
        self.order.retain(|existing| existing != id);
        self.edges
            .retain(|edge| edge.source != id && edge.target != id);
    }
}

/// Build a graph from one run's capture log: a node per item, parent edges
/// labeled with the producing call chain, dependency edges (synthesizing
/// nodes for untracked dependency values). Insertion failures against
/// missing ids are counted and reported once, not fatal.
pub fn build_graph(items: &[CapturedItem]) -> CaptureGraph {
    let mut graph = CaptureGraph::new();
    let mut duplicates = 0usize;
    for item in items {
        let added = graph.add_node(
            item.id.clone(),
            NodeData {
                value: Some(item.value.clone()),
                ephemeral: item.ephemeral,
                kind: NodeKind::Captured,
            },
        );
        if !added {
            duplicates += 1;
        }
    }

    let mut failed = 0usize;
    for item in items {
        if let Some(parent_id) = &item.parent_id {
            let label = Some(item.call_chain.clone());
            if !graph.add_edge(parent_id.clone(), item.id.clone(), EdgeKind::Parent, label) {
                failed += 1;
            }
        }
    }

    for item in items {
        for dependency in &item.dependencies {
            if let Some(value) = &dependency.untracked_value {
                if !graph.has_node(&dependency.id) {
                    graph.add_node(
                        dependency.id.clone(),
                        NodeData {
                            value: Some(value.clone()),
                            ephemeral: item.ephemeral,
                            kind: NodeKind::Untracked,
                        },
                    );
                }
            }
            if !graph.add_edge(
                dependency.id.clone(),
                item.id.clone(),
                EdgeKind::Dependency,
                None,
            ) {
                failed += 1;
            }
        }
    }

    if duplicates > 0 {
        debug!("graph build: {} duplicate item ids kept first occurrence", duplicates);
    }
    if failed > 0 {
        warn!("graph build: {} edge insertions skipped (missing endpoints)", failed);
    }
    debug!(
        "graph build: {} nodes, {} edges from {} items",
        graph.node_count(),
        graph.edges().len(),
        items.len()
    );
    graph
}

/// Which node values are uninteresting enough to prune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrunePolicy {
    /// Remove function-typed nodes only; their effects stay visible.
    #[default]
    Functions,
    /// Additionally remove primitive-valued nodes.
    FunctionsAndPrimitives,
}

fn should_prune(data: &NodeData, policy: PrunePolicy) -> bool {
    let Some(value) = &data.value else {
        return false;
    };
    match (policy, value.type_tag()) {
        (_, TypeTag::Function) => true,
        (
            PrunePolicy::FunctionsAndPrimitives,
            TypeTag::Null | TypeTag::Bool | TypeTag::Number | TypeTag::String,
        ) => true,
        _ => false,
    }
}

/// Remove uninteresting nodes, relinking each pruned node's in-neighbors to
/// its out-neighbors so reachability and relative ordering survive.
pub fn prune_graph(graph: &mut CaptureGraph, policy: PrunePolicy) {
    let snapshot: Vec<String> = graph.node_ids().map(str::to_string).collect();
    for id in snapshot {
        let prune = graph
            .node(&id)
            .map(|data| should_prune(data, policy))
            .unwrap_or(false);
        if !prune {
            continue;
        }
        let relinks: Vec<(String, String, EdgeKind, Option<String>)> = graph
            .in_edges(&id)
            .flat_map(|in_edge| {
                graph.out_edges(&id).map(move |out_edge| {
                    (
                        in_edge.source.clone(),
                        out_edge.target.clone(),
                        in_edge.kind,
                        in_edge.label.clone(),
                    )
                })
            })
            .collect();
        for (source, target, kind, label) in relinks {
            graph.add_edge(source, target, kind, label);
        }
        graph.remove_node(&id);
    }
}

/// Routing-node id for a dependency target.
pub fn routing_id(id: &str) -> String {
    format!("route-{}", id)
}

/// Give every target of at least one dependency edge a synthetic routing
/// node spliced into its parent edge, and retarget those dependency edges to
/// it. Dependency arrows then anchor on the routing node instead of a node
/// whose position is pinned by structural constraints.
pub fn expand_dependency_edges(graph: &mut CaptureGraph) {
    let targets: Vec<String> = graph
        .node_ids()
        .filter(|id| {
            graph
                .in_edges(id)
                .any(|edge| edge.kind == EdgeKind::Dependency)
        })
        .map(str::to_string)
        .collect();

    for id in targets {
        let route = routing_id(&id);
        let ephemeral = graph.node(&id).map(|data| data.ephemeral).unwrap_or(false);
        graph.add_node(
            route.clone(),
            NodeData {
                value: None,
                ephemeral,
                kind: NodeKind::Routing,
            },
        );
        // splice into the structural slot: parent -> route -> node
        for edge in &mut graph.edges {
            if edge.kind == EdgeKind::Parent && edge.target == id {
                edge.target = route.clone();
            }
        }
        graph.add_edge(route.clone(), id.clone(), EdgeKind::Parent, None);
        for edge in &mut graph.edges {
            if edge.kind == EdgeKind::Dependency && edge.target == id {
                edge.target = route.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capture::Dependency;
    use crate::domain::value::{HostFunction, HostObject, RawValue};

    fn item(id: &str, parent_id: Option<&str>, deps: Vec<Dependency>) -> CapturedItem {
        let value = RawValue::Object(HostObject::with_fields(
            "Item",
            vec![("label".to_string(), RawValue::str(id))],
        ));
        CapturedItem {
            id: id.to_string(),
            parent_id: parent_id.map(str::to_string),
            value,
            ephemeral: false,
            dependencies: deps,
            call_chain: format!(".{}", id),
        }
    }

    fn scenario_graph() -> CaptureGraph {
        let items = vec![
            item("0", None, Vec::new()),
            item("1", Some("0"), vec![Dependency::tracked("2")]),
            item("2", None, Vec::new()),
        ];
        let mut graph = build_graph(&items);
        expand_dependency_edges(&mut graph);
        graph
    }

    #[test]
    fn nodes_with_a_dependency_gain_a_routing_node() {
        let graph = scenario_graph();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(
            graph.node("route-1").map(|data| data.kind),
            Some(NodeKind::Routing)
        );
    }

    #[test]
    fn routing_nodes_have_one_parent() {
        let graph = scenario_graph();
        let inbound: Vec<_> = graph
            .in_edges("route-1")
            .filter(|edge| edge.kind == EdgeKind::Parent)
            .collect();
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].source, "0");
    }

    #[test]
    fn routing_nodes_have_one_child() {
        let graph = scenario_graph();
        let outbound: Vec<_> = graph
            .out_edges("route-1")
            .filter(|edge| edge.kind == EdgeKind::Parent)
            .collect();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].target, "1");
    }

    #[test]
    fn dependency_edges_retarget_to_routing_nodes() {
        let graph = scenario_graph();
        let out = graph.out_neighbors("2");
        assert_eq!(out, vec!["route-1".to_string()]);
    }

    #[test]
    fn missing_parent_edges_are_counted_not_fatal() {
        let items = vec![item("a", Some("missing"), Vec::new())];
        let graph = build_graph(&items);
        assert_eq!(graph.node_count(), 1);
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn untracked_dependencies_materialize_nodes() {
        let untracked = RawValue::Object(HostObject::new("Descriptor"));
        let items = vec![item(
            "a",
            None,
            vec![Dependency::untracked("arg-1", untracked)],
        )];
        let graph = build_graph(&items);
        assert_eq!(graph.node("arg-1").map(|data| data.kind), Some(NodeKind::Untracked));
        assert_eq!(graph.out_neighbors("arg-1"), vec!["a".to_string()]);
    }

    #[test]
    fn pruning_functions_preserves_reachability() {
        let func = RawValue::Function(HostFunction::new("f", |_, _| Ok(RawValue::Null)));
        let items = vec![
            item("parent", None, Vec::new()),
            CapturedItem {
                value: func,
                ..item("fn", Some("parent"), Vec::new())
            },
            item("child", Some("fn"), Vec::new()),
        ];
        let mut graph = build_graph(&items);
        prune_graph(&mut graph, PrunePolicy::Functions);
        assert!(!graph.has_node("fn"));
        assert_eq!(graph.out_neighbors("parent"), vec!["child".to_string()]);
    }

    #[test]
    fn aggressive_policy_prunes_primitives_too() {
        let items = vec![
            item("parent", None, Vec::new()),
            CapturedItem {
                value: RawValue::Number(3.0),
                ..item("n", Some("parent"), Vec::new())
            },
        ];
        let mut graph = build_graph(&items);
        prune_graph(&mut graph, PrunePolicy::FunctionsAndPrimitives);
        assert!(!graph.has_node("n"));
        assert!(graph.has_node("parent"));
    }
}
