#![deny(unsafe_code)]
//! CLI binary for inspecting flowfield compositions.
//!
//! Subcommands:
//! - `flow`: derive a flow from a filtered pattern and print it as arrows
//! - `steer`: walk one agent along that flow under a turn-rate limit

mod error;

use std::f64::consts::FRAC_PI_4;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use error::CliError;
use flowfield_core::{
    CombinedFlowMap, CompositionConfig, ConstantFlow, ConvolvingPotentialMap, CoordCache, Derived,
    EdgePolicy, FilterConfig, FlowMap, GridCoord, GridDomain, GridPotential, PotentialPattern,
    TurnLimiter, UpdateMode,
};
use glam::DVec2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "flowfield", about = "Potential and flow field composition CLI")]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derive a flow from a filtered potential pattern and print it.
    Flow {
        #[command(flatten)]
        field: FieldArgs,

        /// Also write the direction grid as JSON to this path.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Walk one agent along the derived flow.
    Steer {
        #[command(flatten)]
        field: FieldArgs,

        /// Number of steps to walk.
        #[arg(short, long, default_value_t = 32)]
        steps: usize,

        /// Starting column (defaults to the centre).
        #[arg(long)]
        start_x: Option<usize>,

        /// Starting row (defaults to the centre).
        #[arg(long)]
        start_y: Option<usize>,

        /// Largest heading change per step, in degrees.
        #[arg(long, default_value_t = 30.0)]
        max_turn: f64,

        /// PRNG seed for wandering where the flow is neutral.
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

/// How the composition is built. Shared by both subcommands.
#[derive(Args)]
struct FieldArgs {
    /// Grid width in cells.
    #[arg(short = 'W', long, default_value_t = 24)]
    width: usize,

    /// Grid height in cells.
    #[arg(short = 'H', long, default_value_t = 12)]
    height: usize,

    /// Potential pattern as JSON.
    #[arg(
        long,
        default_value = r#"{"kind": "attractor", "x": 18, "y": 4, "strength": 10, "radius": 3}"#
    )]
    pattern: String,

    /// Filter config as JSON (kernel, edge, mode).
    #[arg(long, default_value = "{}")]
    filter: String,

    /// Edge policy of the flow derivation: clamp, mirror or {"constant": v}.
    #[arg(long, default_value = "clamp")]
    edge: String,

    /// How changes propagate through the composition.
    #[arg(long, value_enum, default_value_t = ModeArg::Lazy)]
    mode: ModeArg,

    /// Heading of a constant drift flow, in degrees (0 = east, 90 = south).
    #[arg(long, requires = "drift_weight")]
    drift: Option<f64>,

    /// Weight of the drift flow relative to the potential.
    #[arg(long, requires = "drift")]
    drift_weight: Option<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Lazy,
    Eager,
}

impl From<ModeArg> for UpdateMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Lazy => UpdateMode::Lazy,
            ModeArg::Eager => UpdateMode::Eager,
        }
    }
}

/// The maps a run keeps alive. Derived maps only hold their sources, so the
/// raw potential is kept here to match.
struct Composition {
    config: CompositionConfig,
    _raw: Rc<GridPotential>,
    filtered: Rc<ConvolvingPotentialMap>,
    flow: CombinedFlowMap,
}

impl Composition {
    fn build(args: &FieldArgs) -> Result<Self, CliError> {
        let config = CompositionConfig {
            width: args.width,
            height: args.height,
            mode: args.mode.into(),
            edge: parse_edge(&args.edge)?,
        };
        let domain = config.domain()?;

        let pattern = PotentialPattern::from_json(&parse_json("--pattern", &args.pattern)?)?;
        let filter = FilterConfig::from_json(&parse_json("--filter", &args.filter)?)?;

        let raw = GridPotential::new(pattern.render(domain), config.mode);
        let filtered = filter.build(raw.clone())?;
        let flow = CombinedFlowMap::new(domain, config.mode, config.edge);
        flow.add_potential(filtered.clone(), 1.0)?;
        if let (Some(degrees), Some(weight)) = (args.drift, args.drift_weight) {
            let drift = DVec2::from_angle(degrees.to_radians());
            flow.add_flow(Rc::new(ConstantFlow::new(domain, drift)), weight)?;
        }

        info!(
            width = domain.width(),
            height = domain.height(),
            sources = flow.source_count(),
            "composition built"
        );
        Ok(Self {
            config,
            _raw: raw,
            filtered,
            flow,
        })
    }

    fn directions(&self) -> Vec<DVec2> {
        let domain = self.flow.domain();
        domain
            .cells()
            .map(|(x, y)| self.flow.direction(x, y))
            .collect()
    }
}

fn parse_json(flag: &str, raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw).map_err(|e| CliError::Input(format!("invalid {flag} JSON: {e}")))
}

// Accepts a bare policy name as well as JSON.
fn parse_edge(raw: &str) -> Result<EdgePolicy, CliError> {
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    serde_json::from_value(value).map_err(|e| CliError::Input(format!("invalid --edge: {e}")))
}

/// One of eight arrows for a direction, or `·` when neutral. `y` grows downward.
fn arrow(v: DVec2) -> char {
    const ARROWS: [char; 8] = ['→', '↘', '↓', '↙', '←', '↖', '↑', '↗'];
    if v == DVec2::ZERO {
        return '·';
    }
    let octant = (v.y.atan2(v.x) / FRAC_PI_4).round() as i64;
    ARROWS[octant.rem_euclid(8) as usize]
}

fn run_flow(json: bool, field: &FieldArgs, output: Option<PathBuf>) -> Result<(), CliError> {
    let composition = Composition::build(field)?;
    let (width, height) = (composition.config.width, composition.config.height);
    let directions = composition.directions();

    let report = serde_json::json!({
        "width": width,
        "height": height,
        "mode": composition.config.mode,
        "edge": composition.config.edge,
        "filter_recomputes": composition.filtered.recompute_count(),
        "directions": directions.iter().map(|v| [v.x, v.y]).collect::<Vec<_>>()
    });
    if let Some(path) = &output {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        info!(path = %path.display(), "direction grid written");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for row in directions.chunks(width) {
            println!("{}", row.iter().copied().map(arrow).collect::<String>());
        }
    }
    Ok(())
}

fn run_steer(
    json: bool,
    field: &FieldArgs,
    steps: usize,
    start: (Option<usize>, Option<usize>),
    max_turn: f64,
    seed: u64,
) -> Result<(), CliError> {
    let composition = Composition::build(field)?;
    let (width, height) = (composition.config.width, composition.config.height);
    let coords = CoordCache::with_capacity(width, height);
    let limiter = TurnLimiter::new(max_turn.to_radians());
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let start_x = start.0.unwrap_or(width / 2).min(width - 1);
    let start_y = start.1.unwrap_or(height / 2).min(height - 1);
    let mut pos = DVec2::new(start_x as f64, start_y as f64);
    let mut heading = DVec2::ZERO;
    let mut path = Vec::with_capacity(steps);

    for step in 0..steps {
        let cell = cell_of(&coords, pos);
        let desired = composition.flow.direction(cell.x, cell.y);
        heading = limiter.steer(heading, desired, &mut rng);
        pos = (pos + heading).clamp(DVec2::ZERO, DVec2::new((width - 1) as f64, (height - 1) as f64));
        path.push((step, cell, heading));
    }
    info!(steps, seed, "walk finished");

    if json {
        let visited: Vec<Value> = path
            .iter()
            .map(|(step, cell, heading)| {
                serde_json::json!({
                    "step": step,
                    "cell": cell,
                    "heading": [heading.x, heading.y]
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&visited)?);
    } else {
        for (step, cell, heading) in &path {
            println!(
                "{step:>4}  ({:>3}, {:>3})  {}",
                cell.x,
                cell.y,
                arrow(*heading)
            );
        }
    }
    Ok(())
}

// `pos` is clamped to the domain, so the lookup always hits.
fn cell_of(coords: &CoordCache, pos: DVec2) -> GridCoord {
    let (x, y) = (pos.x.round() as usize, pos.y.round() as usize);
    coords.get(x, y).copied().unwrap_or(GridCoord::new(x, y))
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Flow { field, output } => run_flow(cli.json, &field, output),
        Command::Steer {
            field,
            steps,
            start_x,
            start_y,
            max_turn,
            seed,
        } => run_steer(cli.json, &field, steps, (start_x, start_y), max_turn, seed),
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flowfield=info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let json_mode = cli.json;
    if let Err(e) = run(cli) {
        if json_mode {
            let j = serde_json::json!({"error": e.to_string(), "exit_code": e.exit_code()});
            eprintln!("{}", serde_json::to_string_pretty(&j).unwrap_or_default());
        } else {
            eprintln!("error: {e}");
        }
        process::exit(e.exit_code());
    }
}
