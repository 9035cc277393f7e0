//! Scene Exporters
//!
//! Writes a solved scene as Graphviz DOT (with pinned positions) or as the
//! JSON document the render frontend consumes.

use std::io::Result;

use crate::api::dto::SceneDto;
use crate::application::session::Scene;
use crate::domain::graph::{EdgeKind, NodeKind};
use crate::domain::value::value_info;
use crate::ports::SceneExporter;

/// Points per layout unit when translating solved coordinates to DOT inches.
const DOT_SCALE: f64 = 72.0;

pub struct DotExporter;

impl SceneExporter for DotExporter {
    fn export(&self, scene: &Scene, path: &str) -> Result<()> {
        std::fs::write(path, Self::to_dot(scene))
    }
}

impl DotExporter {
    /// Convert a scene to DOT with solver-pinned positions (`neato -n` input).
    pub fn to_dot(scene: &Scene) -> String {
        let mut lines = Vec::new();

        lines.push("digraph Scene {".to_string());
        lines.push("    splines=ortho;".to_string());
        lines.push("    node [fontname=\"Helvetica\", fontsize=12];".to_string());
        lines.push("    edge [fontname=\"Helvetica\", fontsize=10];".to_string());
        lines.push("".to_string());

        for id in scene.graph.node_ids() {
            let Some(data) = scene.graph.node(id) else {
                continue;
            };
            let (shape, color, style) = Self::node_style(data.kind);
            let label = Self::escape_label(&Self::node_label(id, data.value.as_ref()));
            let pos = scene
                .boxes
                .get(id)
                .map(|b| {
                    format!(
                        ", pos=\"{:.0},{:.0}!\", width={:.2}, height={:.2}",
                        b.x,
                        // DOT y grows upward
                        -b.y,
                        b.width / DOT_SCALE,
                        b.height / DOT_SCALE
                    )
                })
                .unwrap_or_default();
            lines.push(format!(
                "    \"{}\" [label=\"{}\", shape={}, style=\"{}\", fillcolor=\"{}\"{}];",
                id, label, shape, style, color, pos
            ));
        }

        lines.push("".to_string());

        for edge in scene.graph.edges() {
            let label = edge
                .label
                .as_deref()
                .map(Self::escape_label)
                .unwrap_or_default();
            let style = match edge.kind {
                EdgeKind::Parent => "solid",
                EdgeKind::Dependency => "dashed",
            };
            lines.push(format!(
                "    \"{}\" -> \"{}\" [label=\"{}\", style={}];",
                edge.source, edge.target, label, style
            ));
        }

        lines.push("}".to_string());

        lines.join("\n")
    }

    fn node_label(id: &str, value: Option<&crate::domain::value::RawValue>) -> String {
        match value {
            Some(value) => {
                let info = value_info(value);
                match info.label {
                    Some(label) => format!("{}\n{}", info.name, label),
                    None => info.name,
                }
            }
            None => id.to_string(),
        }
    }

    fn node_style(kind: NodeKind) -> (&'static str, &'static str, &'static str) {
        match kind {
            NodeKind::Captured => ("box", "#89b4fa", "filled,rounded"),  // Blue
            NodeKind::Untracked => ("box", "#6c7086", "filled,dashed"),  // Gray
            NodeKind::Routing => ("point", "#9399b2", "filled"),
        }
    }

    fn escape_label(label: &str) -> String {
        label
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
    }
}

pub struct JsonExporter;

impl SceneExporter for JsonExporter {
    fn export(&self, scene: &Scene, path: &str) -> Result<()> {
        let dto = SceneDto::from(scene);
        let content = serde_json::to_string_pretty(&dto)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
