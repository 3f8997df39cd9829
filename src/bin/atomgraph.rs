use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use atomgraph::{Environment, Gfx, LinkState, Pipeline, PipelineDef, Size2, SoftGfx};

#[derive(Parser, Debug)]
#[command(name = "atomgraph", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse, validate and negotiate a pipeline without running it.
    Validate(ValidateArgs),
    /// Run a pipeline on the software backend.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Input pipeline JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Print the router topology after negotiation.
    #[arg(long)]
    dump: bool,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Input pipeline JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Number of ticks to run.
    #[arg(long, default_value_t = 1)]
    ticks: u64,

    /// Default framebuffer width.
    #[arg(long, default_value_t = 256)]
    width: u32,

    /// Default framebuffer height.
    #[arg(long, default_value_t = 256)]
    height: u32,

    /// Tick rate in Hz, drives the time uniforms.
    #[arg(long, default_value_t = 60.0)]
    rate: f64,

    /// Write the last presented frame as PNG.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Print router port and connection tables after the run.
    #[arg(long)]
    dump: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Validate(args) => cmd_validate(args),
        Command::Run(args) => cmd_run(args),
    }
}

fn read_def(path: &Path) -> anyhow::Result<PipelineDef> {
    let def = PipelineDef::from_path(path)?;
    def.validate()
        .with_context(|| format!("validate pipeline '{}'", path.display()))?;
    Ok(def)
}

/// Register every `target` the description's keyboard and capture atoms attach to.
fn environment_for(def: &PipelineDef) -> anyhow::Result<Environment> {
    let mut env = Environment::new();
    for atom in &def.atoms {
        let Some(target) = atom.config.get_str("target")? else {
            continue;
        };
        match atom.kind.as_str() {
            "keyboard" => {
                env.add_keyboard(target);
            }
            "capture" => {
                env.add_capture(target);
            }
            _ => {}
        }
    }
    Ok(env)
}

fn assemble(def: &PipelineDef, size: Size2) -> anyhow::Result<Pipeline<SoftGfx>> {
    let env = environment_for(def)?;
    let mut pipeline = Pipeline::from_def(SoftGfx::new(size), env, def)?;
    pipeline.initialize()?;
    Ok(pipeline)
}

fn print_links(pipeline: &Pipeline<SoftGfx>) -> usize {
    let mut failed = 0;
    for link in pipeline.links() {
        let from = pipeline.atom_id(link.from.atom).unwrap_or("?");
        let to = pipeline.atom_id(link.to.atom).unwrap_or("?");
        match &link.state {
            LinkState::Failed(reason) => {
                failed += 1;
                println!(
                    "  {from}:{} -> {to}:{}  FAILED ({reason})",
                    link.from.port, link.to.port
                );
            }
            state => println!(
                "  {from}:{} -> {to}:{}  {state:?} {}",
                link.from.port, link.to.port, link.format
            ),
        }
    }
    failed
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let def = read_def(&args.in_path)?;
    let pipeline = assemble(&def, Size2::new(1, 1))?;
    println!(
        "{}: {} atoms, {} links",
        args.in_path.display(),
        pipeline.atom_count(),
        pipeline.links().len()
    );
    let failed = print_links(&pipeline);
    if args.dump {
        print!("{}", pipeline.router().dump_topology());
    }
    if failed > 0 {
        anyhow::bail!("{failed} link(s) failed negotiation");
    }
    Ok(())
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    if args.width == 0 || args.height == 0 {
        anyhow::bail!("--width and --height must be positive");
    }
    let def = read_def(&args.in_path)?;
    let size = Size2::new(args.width, args.height);
    let mut pipeline = assemble(&def, size)?;
    pipeline.set_tick_rate(args.rate)?;

    let stats = pipeline.run(args.ticks)?;
    let routed: usize = stats.iter().map(|s| s.routed).sum();
    eprintln!("ran {} ticks, routed {routed} packets", stats.len());

    for atom in &def.atoms {
        if atom.kind != "capture" {
            continue;
        }
        if let Some(target) = atom.config.get_str("target")?
            && let Some(handle) = pipeline.environment().capture(target)
        {
            let count = handle.lock().map_or(0, |p| p.len());
            println!("capture '{target}': {count} packets");
        }
    }

    if args.dump {
        print!("{}", pipeline.router().dump_ports());
        print!("{}", pipeline.router().dump_connections());
    }

    if let Some(out) = &args.out {
        let gfx = &pipeline.context().gfx;
        let frame = gfx
            .presented_frame()
            .context("pipeline presented no frame (is there a 'present' atom?)")?;
        let size = gfx.default_size();
        if let Some(parent) = out.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir '{}'", parent.display()))?;
        }
        image::save_buffer_with_format(
            out,
            frame,
            size.w,
            size.h,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write png '{}'", out.display()))?;
        eprintln!("wrote {}", out.display());
    }

    pipeline.uninitialize();
    Ok(())
}
