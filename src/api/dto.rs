use serde::Serialize;

use crate::application::session::Scene;
use crate::domain::graph::{EdgeKind, NodeKind};
use crate::domain::value::{value_info, ValueInfo};

#[derive(Debug, Serialize)]
pub struct SceneDto {
    pub nodes: Vec<SceneNodeDto>,
    pub edges: Vec<SceneEdgeDto>,
}

#[derive(Debug, Serialize)]
pub struct SceneNodeDto {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub kind: NodeKind,
    pub ephemeral: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ValueInfo>,
}

#[derive(Debug, Serialize)]
pub struct SceneEdgeDto {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl From<&Scene> for SceneDto {
    fn from(scene: &Scene) -> Self {
        let nodes = scene
            .graph
            .node_ids()
            .filter_map(|id| {
                let data = scene.graph.node(id)?;
                let solved = scene.boxes.get(id).copied().unwrap_or_default();
                Some(SceneNodeDto {
                    id: id.to_string(),
                    x: solved.x,
                    y: solved.y,
                    width: solved.width,
                    height: solved.height,
                    kind: data.kind,
                    ephemeral: data.ephemeral,
                    info: data.value.as_ref().map(value_info),
                })
            })
            .collect();

        let edges = scene
            .graph
            .edges()
            .iter()
            .map(|edge| SceneEdgeDto {
                source: edge.source.clone(),
                target: edge.target.clone(),
                kind: edge.kind,
                label: edge.label.clone(),
            })
            .collect();

        SceneDto { nodes, edges }
    }
}
