pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use loadquote_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "loadquote",
    about = "Loadquote pricing CLI",
    long_about = "Price saved freight quote lines and inspect the effective pricing configuration.",
    after_help = "Examples:\n  loadquote price quote.json\n  loadquote price quote.json --refresh-rates --catalog products.json\n  loadquote config"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read configuration from this file instead of loadquote.toml")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Recompute saved lines and print per-line amounts with quote totals")]
    Price {
        #[arg(help = "JSON document of the form {\"lines\": [...]}")]
        file: PathBuf,
        #[arg(long, help = "Re-resolve every foreign-currency rate from the configured table")]
        refresh_rates: bool,
        #[arg(long, help = "Product catalog JSON used to back-fill missing snapshots")]
        catalog: Option<PathBuf>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let load_options = load_options(cli.config.clone());

    if let Ok(config) = AppConfig::load(load_options.clone()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Price { file, refresh_rates, catalog } => {
            commands::price::run(commands::price::PriceRequest {
                input: file,
                catalog,
                refresh_rates,
                load_options,
            })
        }
        Command::Config => commands::config::run(load_options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// An explicit `--config` path must exist; otherwise the default lookup applies.
pub fn load_options(config_path: Option<PathBuf>) -> LoadOptions {
    LoadOptions { require_file: config_path.is_some(), config_path, ..LoadOptions::default() }
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    // Logs go to stderr; stdout is reserved for the JSON payload.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
