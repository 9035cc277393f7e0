// Command-line entry point for Glassbox.
//
// Runs a small synthetic rendering-style program against an instrumented
// host object graph and exports the resulting scene.

use anyhow::bail;
use clap::Parser;

use glassbox::application::{FrameFn, ItemContext, Program, Session, SessionConfig};
use glassbox::domain::value::{HostFunction, HostObject, RawValue};
use glassbox::infrastructure::{EngineError, Value};
use glassbox::ports::scene_exporter::{DotExporter, JsonExporter};
use glassbox::ports::SceneExporter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of frames to run after setup
    #[arg(short = 'n', long, default_value_t = 3)]
    frames: u32,

    /// Output file path
    #[arg(short, long)]
    output: String,

    /// Output format (dot, json)
    #[arg(short, long, default_value = "dot")]
    format: String,
}

/// A toy GPU-like host API: objects returned from factory methods, a frame
/// encoder minted per frame.
fn demo_device() -> RawValue {
    let device = HostObject::new("Device");
    device.set(
        "create_buffer",
        RawValue::Function(HostFunction::new("create_buffer", |_, args| {
            let buffer = HostObject::new("Buffer");
            if let Some(RawValue::Object(descriptor)) = args.first() {
                if let Some(label) = descriptor.get("label") {
                    buffer.set("label", label);
                }
            }
            Ok(RawValue::Object(buffer))
        })),
    );
    device.set(
        "create_pipeline",
        RawValue::Function(HostFunction::new("create_pipeline", |_, _| {
            Ok(RawValue::Object(HostObject::new("Pipeline")))
        })),
    );
    device.set(
        "create_encoder",
        RawValue::Function(HostFunction::new("create_encoder", |_, _| {
            let encoder = HostObject::new("Encoder");
            encoder.set(
                "begin_pass",
                RawValue::Function(HostFunction::new("begin_pass", |_, _| {
                    let pass = HostObject::new("Pass");
                    pass.set(
                        "draw",
                        RawValue::Function(HostFunction::new("draw", |_, _| Ok(RawValue::Null))),
                    );
                    Ok(RawValue::Object(pass))
                })),
            );
            Ok(RawValue::Object(encoder))
        })),
    );
    RawValue::Object(device)
}

struct DemoProgram;

impl Program for DemoProgram {
    fn setup(&mut self, roots: &[Value<ItemContext>]) -> Result<Option<FrameFn>, EngineError> {
        let device = roots[0].clone();

        let descriptor = Value::Record(vec![
            ("label".to_string(), Value::Raw(RawValue::str("vertices"))),
            ("size".to_string(), Value::Raw(RawValue::Number(256.0))),
        ]);
        let buffer = device.get("create_buffer").call(&[descriptor])?;
        let pipeline = device.get("create_pipeline").call(&[])?;

        Ok(Some(Box::new(move || {
            let encoder = device.get("create_encoder").call(&[])?;
            let pass = encoder.get("begin_pass").call(&[pipeline.clone()])?;
            pass.get("draw").call(&[buffer.clone()])?;
            Ok(())
        })))
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut session = Session::new(SessionConfig::default())?;
    session.evaluate(vec![demo_device()], &mut DemoProgram)?;
    for _ in 0..cli.frames {
        session.tick()?;
    }

    let scene = session.scene();
    match cli.format.as_str() {
        "dot" => DotExporter.export(&scene, &cli.output)?,
        "json" => JsonExporter.export(&scene, &cli.output)?,
        other => bail!("unknown format: {}", other),
    }
    println!(
        "Captured {} nodes over {} frame(s). Output written to {} (format: {})",
        scene.graph.node_count(),
        cli.frames,
        cli.output,
        cli.format
    );
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
