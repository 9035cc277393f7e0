// Use cases wiring the interception engine to the capture pipeline.

pub mod capture_hooks;
pub mod session;

pub use capture_hooks::{capture_options, CaptureConfig, ItemContext};
pub use session::{FrameFn, Program, Scene, Session, SessionConfig};
