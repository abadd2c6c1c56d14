use std::{
    fs::{File, OpenOptions},
    io::{BufReader, Write},
    path::PathBuf,
};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;
use shoebot::{
    Configuration, Settings,
    io::{read_configuration, write_path},
    search,
    snake::{SnakeOutcome, StageReport, reconfig_through_snake, reconfig_to_snake},
};

#[derive(Parser)]
#[command(about = "Reconfiguration planner for two-shoe modular robots")]
struct Cli {
    /// Planner settings file (TOML); defaults apply when absent.
    #[arg(long)]
    settings: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plans a path between two assemblies and prints it to stdout.
    Reconfig {
        init: PathBuf,
        goal: PathBuf,
        #[arg(long, value_enum, default_value = "snake")]
        algorithm: Algorithm,
    },
    /// Reduces an assembly to the canonical snake chain.
    Snake {
        init: PathBuf,
        /// Output file; stdout when absent.
        out: Option<PathBuf>,
        /// Appends one JSON progress record per run.
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Algorithm {
    /// Reduce both assemblies to the canonical snake and splice the paths.
    Snake,
    /// Plain A* over configuration space; viable for small assemblies only.
    Astar,
    /// Breadth-first search; exhaustive, viable for tiny assemblies only.
    Bfs,
}

#[derive(Serialize)]
struct ProgressRecord<'a> {
    timestamp: String,
    input: String,
    finished: bool,
    path_len: usize,
    stages: &'a [StageReport],
}

fn load_configuration(path: &PathBuf) -> anyhow::Result<Configuration> {
    let file = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    let mut cfg = read_configuration(&mut BufReader::new(file))
        .with_context(|| format!("could not parse {}", path.display()))?
        .with_context(|| format!("{} holds no configuration", path.display()))?;
    if !cfg.prepare() {
        bail!("{} holds an invalid configuration", path.display());
    }
    Ok(cfg)
}

fn append_progress(
    log_path: &PathBuf,
    input: &PathBuf,
    outcome: &SnakeOutcome,
) -> anyhow::Result<()> {
    let record = ProgressRecord {
        timestamp: chrono::Utc::now().to_rfc3339(),
        input: input.display().to_string(),
        finished: outcome.finished,
        path_len: outcome.path.len(),
        stages: &outcome.stages,
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("could not open log file {}", log_path.display()))?;
    writeln!(file, "{}", serde_json::to_string(&record)?)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match cli.cmd {
        Command::Reconfig { init, goal, algorithm } => {
            let init_cfg = load_configuration(&init)?;
            let goal_cfg = load_configuration(&goal)?;
            let path = match algorithm {
                Algorithm::Snake => reconfig_through_snake(&init_cfg, &goal_cfg),
                Algorithm::Astar => {
                    search::astar(&init_cfg, &goal_cfg, settings.step_deg, settings.heuristic)
                }
                Algorithm::Bfs => search::bfs(&init_cfg, &goal_cfg, settings.step_deg),
            };
            let Some(path) = path else {
                bail!("no reconfiguration path found");
            };
            info!("found a path of {} configurations", path.len());
            print!("{}", write_path(&path));
        }
        Command::Snake { init, out, log } => {
            let init_cfg = load_configuration(&init)?;
            let outcome = reconfig_to_snake(&init_cfg);
            if let Some(log_path) = &log {
                append_progress(log_path, &init, &outcome)?;
            }
            let text = write_path(&outcome.path);
            match &out {
                Some(out_path) => std::fs::write(out_path, text)
                    .with_context(|| format!("could not write {}", out_path.display()))?,
                None => print!("{text}"),
            }
            if !outcome.finished {
                bail!("planner exhausted before reaching the snake; partial path written");
            }
        }
    }
    Ok(())
}
