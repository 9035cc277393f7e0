//! Full pipeline: evaluate a program, run frames, build and lay out the
//! scene.

use glassbox::application::{FrameFn, ItemContext, Program, Session, SessionConfig};
use glassbox::domain::graph::{EdgeKind, NodeKind};
use glassbox::domain::layout::{MAX_NODE_WIDTH, MIN_NODE_HEIGHT};
use glassbox::domain::value::{HostError, HostFunction, HostObject, RawValue};
use glassbox::infrastructure::{EngineError, Value};

fn device() -> RawValue {
    let device = HostObject::new("Device");
    device.set(
        "create_buffer",
        RawValue::Function(HostFunction::new("create_buffer", |_, _| {
            Ok(RawValue::Object(HostObject::new("Buffer")))
        })),
    );
    device.set(
        "create_encoder",
        RawValue::Function(HostFunction::new("create_encoder", |_, _| {
            let encoder = HostObject::new("Encoder");
            encoder.set(
                "finish",
                RawValue::Function(HostFunction::new("finish", |_, _| {
                    Ok(RawValue::Object(HostObject::new("CommandBuffer")))
                })),
            );
            Ok(RawValue::Object(encoder))
        })),
    );
    RawValue::Object(device)
}

struct RenderLoop;

impl Program for RenderLoop {
    fn setup(&mut self, roots: &[Value<ItemContext>]) -> Result<Option<FrameFn>, EngineError> {
        let device = roots[0].clone();
        let descriptor = Value::Record(vec![(
            "label".to_string(),
            Value::Raw(RawValue::str("vertices")),
        )]);
        let buffer = device.get("create_buffer").call(&[descriptor])?;

        Ok(Some(Box::new(move || {
            let encoder = device.get("create_encoder").call(&[])?;
            encoder.get("finish").call(&[buffer.clone()])?;
            Ok(())
        })))
    }
}

struct FailingProgram;

impl Program for FailingProgram {
    fn setup(&mut self, _roots: &[Value<ItemContext>]) -> Result<Option<FrameFn>, EngineError> {
        Err(EngineError::Host(HostError::new("shader compilation failed")))
    }
}

#[test]
fn setup_items_survive_frames_and_ephemeral_items_are_replaced() {
    let mut session = Session::new(SessionConfig::default()).unwrap();
    session.evaluate(vec![device()], &mut RenderLoop).unwrap();

    let setup_items = session.items();
    assert_eq!(setup_items.len(), 1, "only the buffer is captured in setup");
    assert!(!setup_items[0].ephemeral);

    assert!(session.tick().unwrap());
    let after_first = session.items();
    assert_eq!(after_first.len(), 3, "buffer + encoder + command buffer");
    assert_eq!(
        after_first.iter().filter(|item| item.ephemeral).count(),
        2
    );

    assert!(session.tick().unwrap());
    let after_second = session.items();
    // frame items were dropped and re-captured, not accumulated
    assert_eq!(after_second.len(), 3);
    assert_eq!(after_second[0].id, setup_items[0].id);
}

#[test]
fn frame_items_link_back_to_their_producers() {
    let mut session = Session::new(SessionConfig::default()).unwrap();
    session.evaluate(vec![device()], &mut RenderLoop).unwrap();
    session.tick().unwrap();

    let items = session.items();
    let buffer = &items[0];
    let encoder = items
        .iter()
        .find(|item| item.call_chain == ".create_encoder.()")
        .unwrap();
    let command = items
        .iter()
        .find(|item| item.call_chain.ends_with(".finish.()"))
        .unwrap();

    assert_eq!(buffer.parent_id, None);
    assert_eq!(command.parent_id, Some(encoder.id.clone()));
    assert_eq!(command.dependencies.len(), 1);
    assert_eq!(command.dependencies[0].id, buffer.id);
}

#[test]
fn scene_expands_dependencies_and_solves_layout() {
    let mut session = Session::new(SessionConfig::default()).unwrap();
    session.evaluate(vec![device()], &mut RenderLoop).unwrap();
    session.tick().unwrap();

    let scene = session.scene();
    let command_id = session
        .items()
        .iter()
        .find(|item| item.call_chain.ends_with(".finish.()"))
        .unwrap()
        .id
        .clone();
    let route = format!("route-{}", command_id);
    assert_eq!(
        scene.graph.node(&route).map(|data| data.kind),
        Some(NodeKind::Routing)
    );
    // the untracked descriptor argument materialized as its own node
    assert!(scene
        .graph
        .node_ids()
        .any(|id| scene.graph.node(id).map(|d| d.kind) == Some(NodeKind::Untracked)));

    // every node has a solved box within bounds
    assert_eq!(scene.boxes.len(), scene.graph.node_count());
    for (id, solved) in &scene.boxes {
        assert!(solved.x >= 0.0 && solved.y >= 0.0, "node {} off-canvas", id);
        assert!(solved.width <= MAX_NODE_WIDTH);
        assert!(solved.height >= MIN_NODE_HEIGHT || scene.graph.node(id).is_none());
    }

    // structural edges keep children strictly below their parents
    for edge in scene.graph.edges() {
        if edge.kind != EdgeKind::Parent {
            continue;
        }
        let source = scene.boxes[&edge.source];
        let target = scene.boxes[&edge.target];
        assert!(
            target.y >= source.y + source.height,
            "{} not below {}",
            edge.target,
            edge.source
        );
    }
}

#[test]
fn reevaluation_invalidates_the_previous_liveness_flag() {
    let mut session = Session::new(SessionConfig::default()).unwrap();
    session.evaluate(vec![device()], &mut RenderLoop).unwrap();
    let first = session.liveness();
    assert!(first.get());

    session.evaluate(vec![device()], &mut RenderLoop).unwrap();
    assert!(!first.get(), "superseded run must stop scheduling frames");
    assert!(session.liveness().get());

    // the capture log was rebuilt, not appended to
    assert_eq!(session.items().len(), 1);
}

#[test]
fn failed_setup_leaves_the_session_idle_but_usable() {
    let mut session = Session::new(SessionConfig::default()).unwrap();
    assert!(session.evaluate(vec![device()], &mut FailingProgram).is_err());
    assert!(!session.liveness().get());
    assert!(!session.tick().unwrap(), "no frame work after a failed setup");

    // a later evaluation recovers
    session.evaluate(vec![device()], &mut RenderLoop).unwrap();
    assert!(session.tick().unwrap());
}
