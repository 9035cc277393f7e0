//! Program evaluation lifecycle.
//!
//! One evaluation runs the user program's setup synchronously against the
//! wrapped roots, then repeatedly invokes the returned per-frame closure
//! under an external animation driver. Re-evaluating supersedes the previous
//! run: its liveness flag flips, and the driver must stop rescheduling.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use log::{error, info};

use crate::application::capture_hooks::{capture_options, CaptureConfig, ItemContext};
use crate::domain::capture::{CaptureStore, CapturedItem};
use crate::domain::graph::{
    build_graph, expand_dependency_edges, prune_graph, CaptureGraph, PrunePolicy,
};
use crate::domain::layout::{LayoutSolver, NodeBox};
use crate::domain::value::RawValue;
use crate::infrastructure::intercept::{Engine, EngineError, Value};

/// Closure invoked once per external frame tick.
pub type FrameFn = Box<dyn FnMut() -> Result<(), EngineError>>;

/// A user program: invoked once per (re-)evaluation with the wrapped roots;
/// may return a closure to be run every frame.
pub trait Program {
    fn setup(&mut self, roots: &[Value<ItemContext>]) -> Result<Option<FrameFn>, EngineError>;
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub capture: CaptureConfig,
    pub prune_policy: PrunePolicy,
}

/// What the render layer consumes: the pruned, expanded graph plus solved
/// coordinates per node id.
pub struct Scene {
    pub graph: CaptureGraph,
    pub boxes: HashMap<String, NodeBox>,
}

pub struct Session {
    engine: Engine<ItemContext>,
    store: Rc<RefCell<CaptureStore>>,
    render: Option<FrameFn>,
    live: Rc<Cell<bool>>,
    prune_policy: PrunePolicy,
}

impl Session {
    pub fn new(config: SessionConfig) -> Result<Self, EngineError> {
        let store = Rc::new(RefCell::new(CaptureStore::new()));
        let engine = Engine::new(capture_options(Rc::clone(&store), &config.capture))?;
        Ok(Self {
            engine,
            store,
            render: None,
            live: Rc::new(Cell::new(false)),
            prune_policy: config.prune_policy,
        })
    }

    /// (Re-)evaluate a program against fresh roots.
    ///
    /// Setup errors are surfaced once here, with position information
    /// preserved for source translation; the evaluation is abandoned (no
    /// render closure installed) but the session stays usable for the next
    /// attempt.
    pub fn evaluate(
        &mut self,
        roots: Vec<RawValue>,
        program: &mut dyn Program,
    ) -> Result<(), EngineError> {
        info!("reloading program");
        self.live.set(false);
        self.live = Rc::new(Cell::new(true));
        self.render = None;
        self.store.borrow_mut().reset();
        self.engine.reset();

        let wrapped: Vec<Value<ItemContext>> = roots
            .into_iter()
            .map(|root| self.engine.wrap(root))
            .collect();
        match program.setup(&wrapped) {
            Ok(render) => {
                self.store.borrow_mut().finish_setup();
                self.render = render;
                Ok(())
            }
            Err(err) => {
                self.live.set(false);
                error!("program setup failed: {}", err);
                Err(err)
            }
        }
    }

    /// Liveness flag for the current evaluation. The external animation
    /// driver must check it on every iteration and stop rescheduling once it
    /// reads false.
    pub fn liveness(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.live)
    }

    /// Run one frame: drop the previous frame's ephemeral items, then invoke
    /// the render closure. Returns false when there is nothing to run.
    pub fn tick(&mut self) -> Result<bool, EngineError> {
        if !self.live.get() {
            return Ok(false);
        }
        let Some(render) = self.render.as_mut() else {
            return Ok(false);
        };
        self.store.borrow_mut().begin_frame();
        render()?;
        Ok(true)
    }

    pub fn items(&self) -> Vec<CapturedItem> {
        self.store.borrow().items().to_vec()
    }

    /// Build, prune, expand, and lay out the current capture log.
    pub fn scene(&self) -> Scene {
        let mut graph = build_graph(self.store.borrow().items());
        prune_graph(&mut graph, self.prune_policy);
        expand_dependency_edges(&mut graph);

        let mut solver = LayoutSolver::new();
        let ids: Vec<String> = graph.node_ids().map(str::to_string).collect();
        solver.add_boxes(ids);
        solver.add_edge_constraints(graph.edges());
        solver.solve();
        Scene {
            boxes: solver.boxes(),
            graph,
        }
    }
}
