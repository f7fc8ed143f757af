// main.rs - CLI entry point

use std::io::{self, Write};

use log::{debug, info};

use rsd::cli::{validate_insert, Cli, InsertArgs};
use rsd::commands;
use rsd::core::{ExternalBackend, ToolPaths, ToolRunner};
use rsd::db::SnpDistDb;
use rsd::error::{Result, RsdError};

fn main() {
    let cli = match Cli::try_parse_from(std::env::args_os()) {
        Ok(cli) => cli,
        // Help and version print and exit 0; usage errors exit 2
        Err(e) => e.exit(),
    };
    init_logging(cli.debug());

    if let Err(e) = run_main(cli) {
        eprintln!("❌ ERROR: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run_main(cli: Cli) -> Result<()> {
    match cli {
        Cli::Insert(args) => run_insert(args),
        Cli::Matrix(args) => {
            let store = SnpDistDb::open_existing(&args.input_db)?;
            commands::matrix::run(&store, &args, io::stdout().lock())?;
            Ok(())
        }
        Cli::Link(args) => {
            let store = SnpDistDb::open_existing(&args.input_db)?;
            commands::link::run(&store, &args, io::stdout().lock())?;
            Ok(())
        }
        Cli::Help(help) => {
            writeln!(io::stdout().lock(), "{}", help).map_err(|e| RsdError::Output(e.to_string()))?;
            Ok(())
        }
    }
}

fn run_insert(args: InsertArgs) -> Result<()> {
    info!("🚀 rsd v{}", rsd::VERSION);

    // Load configuration file if specified
    let (args, tools) = match args.config.clone() {
        Some(config_path) => args.with_config_file(&config_path)?,
        None => (args, ToolPaths::default()),
    };
    validate_insert(&args)?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .map_err(|e| RsdError::invalid_option("--threads", e.to_string()))?;
    info!("🧵 Threads: {}", args.threads);
    debug!("Arguments: {:?}", args);

    let log_path = args.work_dir.join(format!("{}.tools.log", args.sample_name));
    let backend = ExternalBackend::new(ToolRunner::new(tools, &log_path), &args.work_dir);
    let mut store = SnpDistDb::open(&args.output_db)?;

    commands::insert::run(&args, &backend, &mut store)?;
    info!("📝 Tool output logged to: {}", log_path.display());
    Ok(())
}
