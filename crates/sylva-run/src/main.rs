//! sylva-run — load an entity from a source file and execute it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sylva_assets::AssetManager;
use sylva_runtime::{LoadEntityParams, Machine, PrintListener};

#[derive(Parser, Debug)]
#[command(name = "sylva-run")]
#[command(about = "Run a Sylva source file or stored entity")]
struct Cli {
    /// Path to the source file (.amlg, .caml, .json, .yaml, .csv)
    file: PathBuf,

    /// Label to execute instead of the root
    #[arg(long)]
    label: Option<String>,

    /// Worker threads for parallel evaluation (0 = sequential only)
    #[arg(long, default_value = "4")]
    threads: usize,

    /// Execution-step budget (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_steps: u64,

    /// Random seed for the entity
    #[arg(long, default_value = "")]
    seed: String,

    /// Load and mirror the entity persistently
    #[arg(long)]
    persistent: bool,
}

struct StdoutPrinter;

impl PrintListener for StdoutPrinter {
    fn print(&mut self, text: &str) {
        print!("{text}");
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sylva_run=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut machine = Machine::new(cli.threads);
    machine.install_assets(Box::new(AssetManager::new()));
    machine.print_listener = Some(Box::new(StdoutPrinter));

    let params = LoadEntityParams {
        path: cli.file.to_string_lossy().into_owned(),
        format_hint: String::new(),
        persistent: cli.persistent,
        load_contained: true,
        escape_root: false,
        escape_contained: true,
        default_seed: cli.seed.clone(),
    };
    let Some((entity, status)) = machine.with_assets(|m, a| a.load_entity(m, &params)) else {
        error!("no asset system installed");
        return ExitCode::FAILURE;
    };
    let Some(entity) = entity else {
        error!(
            path = %cli.file.display(),
            message = %status.message,
            "failed to load entity"
        );
        return ExitCode::FAILURE;
    };

    // the top-level entity gets the privileged surface
    machine.with_assets(|m, a| a.set_root_permission(m, entity, true));

    let constraints = (cli.max_steps > 0).then(|| sylva_runtime::PerformanceConstraints {
        max_execution_steps: cli.max_steps,
        ..Default::default()
    });

    info!(path = %cli.file.display(), "executing");
    let result = machine.execute_entity(entity, cli.label.as_deref(), None, constraints);
    let rendered = sylva_lang::unparse(machine.entities.pool(entity), result.id, true, false);
    println!("{rendered}");
    ExitCode::SUCCESS
}
