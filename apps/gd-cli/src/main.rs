use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use gd_components::SolverMode;
use gd_project::{ProjectError, Scenario, load_yaml};
use gd_solver::{ComponentHost, DriverOptions, OffsetRegistry, SolverError, assembly, run};
use gd_system::{System, SystemError};
use tracing_subscriber::EnvFilter;

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    System(#[from] SystemError),

    #[error(transparent)]
    Solver(#[from] SolverError),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "gd-cli")]
#[command(about = "Dynamic simulation of power-system component models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate scenario file syntax and structure
    Validate {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
    },
    /// Initialize the system and print its offset table and starting state
    Init {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
        /// State layout to print
        #[arg(long, value_enum, default_value_t = ModeArg::Full)]
        mode: ModeArg,
    },
    /// Run the fixed-step reference driver
    Run {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
        /// End time in seconds (overrides the scenario)
        #[arg(long)]
        t_end: Option<f64>,
        /// Time step in seconds (overrides the scenario)
        #[arg(long)]
        dt: Option<f64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Algebraic,
    Differential,
    Full,
}

impl From<ModeArg> for SolverMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Algebraic => SolverMode::AlgebraicOnly,
            ModeArg::Differential => SolverMode::DifferentialOnly,
            ModeArg::Full => SolverMode::Full,
        }
    }
}

fn main() -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { scenario_path } => cmd_validate(&scenario_path),
        Commands::Init {
            scenario_path,
            mode,
        } => cmd_init(&scenario_path, mode.into()),
        Commands::Run {
            scenario_path,
            t_end,
            dt,
        } => cmd_run(&scenario_path, t_end, dt),
    }
}

fn cmd_validate(scenario_path: &Path) -> CliResult<()> {
    println!("Validating scenario: {}", scenario_path.display());
    let scenario = load_yaml(scenario_path)?;
    println!("✓ Scenario is valid");
    for bus in &scenario.buses {
        println!(
            "  {} ({} generators, {} loads, {} relays)",
            bus.name,
            bus.generators.len(),
            bus.loads.len(),
            bus.relays.len()
        );
    }
    for clone in &scenario.clones {
        println!("  {} (copy of {})", clone.name, clone.source);
    }
    Ok(())
}

/// Load, build and initialize a scenario.
fn prepare(scenario_path: &Path) -> CliResult<(Scenario, System)> {
    let scenario = load_yaml(scenario_path)?;
    let built = gd_project::build_system(&scenario)?;
    for key in &built.skipped {
        println!("! skipped parameter {key}");
    }
    let mut system = built.system;
    system.initialize(0.0)?;
    Ok((scenario, system))
}

fn cmd_init(scenario_path: &Path, mode: SolverMode) -> CliResult<()> {
    let (_, mut system) = prepare(scenario_path)?;
    let mut registry = OffsetRegistry::new();
    registry.assign(&mut system)?;
    let totals = registry.require(mode)?;
    let (x, xp) = assembly::guess_state(&system, &registry, 0.0, mode)?;

    println!(
        "\nOffsets ({mode}): {} states ({} differential, {} algebraic), {} roots, {} jacobian",
        totals.states(),
        totals.diff,
        totals.alg,
        totals.roots,
        totals.jac
    );
    println!(
        "{:<20} {:<10} {:>10} {:>10} {:>8}",
        "component", "kind", "diff", "alg", "roots"
    );
    for i in 0..system.len() {
        let comp = system.component(i);
        let Some(block) = comp.core().block(mode) else {
            println!("{:<20} {:<10} (inactive)", comp.name(), comp.kind().as_str());
            continue;
        };
        println!(
            "{:<20} {:<10} {:>10} {:>10} {:>8}",
            comp.name(),
            comp.kind().as_str(),
            format_range(block.diff_range()),
            format_range(block.alg_range()),
            format_range(block.root_range())
        );
    }

    println!("\nInitial state:");
    for (i, (v, d)) in x.iter().zip(&xp).enumerate() {
        println!("  x[{i:>3}] = {v:>14.6e}   x'[{i:>3}] = {d:>12.4e}");
    }
    Ok(())
}

fn cmd_run(scenario_path: &Path, t_end: Option<f64>, dt: Option<f64>) -> CliResult<()> {
    let (scenario, mut system) = prepare(scenario_path)?;
    let opts = DriverOptions {
        dt: dt.unwrap_or(scenario.run.dt),
        t_end: t_end.unwrap_or(scenario.run.t_end),
        record_every: scenario.run.record_every,
        check_level: scenario.run.check_level.into(),
        ..DriverOptions::default()
    };
    println!("Running scenario: {}", scenario.name);
    println!("  dt = {:.4} s, t_end = {:.3} s", opts.dt, opts.t_end);

    let mut registry = OffsetRegistry::new();
    let traj = run(&mut system, &mut registry, &opts)?;

    println!("✓ Finished after {} steps", traj.steps);
    println!("  Recorded points: {}", traj.t.len());
    for event in &traj.events {
        println!(
            "  t = {:.4} s: {} root passes, {} structural changes",
            event.time, event.outcome.passes, event.outcome.structure_changes
        );
    }

    println!("\nBuses:");
    for bus in system.buses() {
        let status = if bus.in_service() { "in service" } else { "disconnected" };
        println!("  {:<12} v = {:.4} pu  {status}", bus.name, bus.v);
    }

    let Some(x) = traj.x.last() else {
        return Ok(());
    };
    println!("\nFinal state:");
    for i in 0..system.len() {
        let comp = system.component(i);
        if let Some(block) = comp.core().block(SolverMode::DifferentialOnly) {
            match x.get(block.diff_range()) {
                Some(values) if !values.is_empty() => println!("  {:<20} {values:?}", comp.name()),
                _ => {}
            }
        }
    }
    Ok(())
}

fn format_range(r: std::ops::Range<usize>) -> String {
    if r.is_empty() {
        "-".to_string()
    } else {
        format!("{}..{}", r.start, r.end)
    }
}
