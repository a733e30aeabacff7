use std::path::PathBuf;

use clap::Parser;

use gatehouse_core::error::{ConfigError, ErrorKind, GatehouseError};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "gatehouse",
    version,
    about = "Manage menus, permissions and roles in a transactional access-control store"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Configuration file (default: ./gatehouse.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file; overrides the config file and GATEHOUSE_DB_PATH
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Map an error to the process exit code.
///
///   0: success
///   1: general/unknown error
///   2: configuration error
///   3: validation error (cycle, level, unknown ids, bad snapshot)
///   4: conflict (duplicate code)
///   5: entity not found
///   6: store error
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return 2;
        }
        if let Some(err) = cause.downcast_ref::<GatehouseError>() {
            return match (err, err.kind()) {
                (GatehouseError::Config(_), _) => 2,
                (_, ErrorKind::Conflict) => 4,
                (GatehouseError::Store(_), _) | (_, ErrorKind::Transient) => 6,
                (_, ErrorKind::Validation) => 3,
                (_, ErrorKind::NotFound) => 5,
            };
        }
    }
    1
}

fn main() {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    let context = commands::Context {
        config_path: cli.config,
        db_override: cli.db,
        quiet: cli.quiet,
    };
    match runtime.block_on(commands::run(cli.command, context)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}
