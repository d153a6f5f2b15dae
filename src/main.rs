use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use ratatui::DefaultTerminal;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod aggregate;
mod controller;
mod domain;
mod filter;
mod model;
mod table;
mod ui;

use aggregate::ColumnSelector;
use controller::Controller;
use domain::{DEFAULT_DATA_PATH, DashConfig, DashError};
use model::{Model, Status};
use table::{LoadOutcome, TableCache};
use ui::DashUI;

#[derive(Parser, Debug)]
#[command(version, about = "Filter and average chilled water measurements in the terminal.")]
struct Args {
    /// Delimited data file to load (.csv or .tsv)
    #[arg(default_value = DEFAULT_DATA_PATH)]
    path: String,

    /// Columns to show and average: START:END positions or a comma separated list of names
    #[arg(long, default_value = "5:20")]
    columns: ColumnSelector,

    /// Event poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    /// Write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log filter directive, RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run(args: Args) -> Result<(), DashError> {
    let cfg = config_from_args(&args)?;
    init_logging(&args)?;
    info!("Starting chw-dash with {:?}", cfg);

    let cache = TableCache::new(cfg.data_path.clone());
    let loaded = cache.load();

    let mut terminal = ratatui::init();
    let result = event_loop(&cfg, &loaded, &mut terminal);
    ratatui::restore();
    result
}

fn event_loop(
    cfg: &DashConfig,
    loaded: &LoadOutcome,
    terminal: &mut DefaultTerminal,
) -> Result<(), DashError> {
    let size = terminal.size()?;
    let mut model = Model::init(
        cfg,
        Arc::clone(&loaded.table),
        loaded.error.as_ref(),
        size.width as usize,
        size.height as usize,
    );
    let mut ui = DashUI::new(cfg);
    let controller = Controller::new(cfg);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        if let Some(message) = controller.handle_event()? {
            model.update(Some(message))?;
        };
    }

    Ok(())
}

fn config_from_args(args: &Args) -> Result<DashConfig, DashError> {
    let path = shellexpand::full(&args.path).map_err(|e| DashError::InvalidConfig(e.to_string()))?;
    Ok(DashConfig::default()
        .with_data_path(PathBuf::from(path.as_ref()))
        .with_columns(args.columns.clone())
        .with_event_poll_time(args.poll_ms))
}

// The terminal belongs to the UI, so logs only go to a file.
fn init_logging(args: &Args) -> Result<(), DashError> {
    let Some(path) = &args.log_file else {
        return Ok(());
    };
    let file = File::create(path)?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .map_err(|e| DashError::InvalidConfig(e.to_string()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Arc::new(file)).with_ansi(false))
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|e| DashError::InvalidConfig(e.to_string()))
}
