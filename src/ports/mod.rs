use crate::application::session::Scene;

pub mod scene_exporter;

pub trait SceneExporter {
    fn export(&self, scene: &Scene, path: &str) -> std::io::Result<()>;
}
