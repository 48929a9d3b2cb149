pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use cartwise_core::config::{AppConfig, LoadOptions};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "cartwise",
    about = "Cartwise operator CLI",
    long_about = "Operate the Cartwise personalization engine: migrations, config inspection, \
                  catalog analysis, ranking previews, and tree cache maintenance.",
    after_help = "Examples:\n  cartwise migrate\n  cartwise config\n  cartwise analyze --catalog catalog.json --category Televisions\n  cartwise rank --catalog catalog.json --category Snacks --user shopper-1\n  cartwise cache-cleanup"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Report discriminating attributes and suggested questions for a category")]
    Analyze {
        #[arg(long, help = "Path to a catalog JSON file (product array or category map)")]
        catalog: PathBuf,
        #[arg(long, help = "Category to analyze")]
        category: String,
    },
    #[command(about = "Rank a category for a shopper using stored preferences and history")]
    Rank {
        #[arg(long, help = "Path to a catalog JSON file (product array or category map)")]
        catalog: PathBuf,
        #[arg(long, help = "Category to rank")]
        category: String,
        #[arg(long, help = "Shopper id; without it the ranking is cold-start")]
        user: Option<String>,
        #[arg(long, help = "Maximum number of products to return")]
        limit: Option<usize>,
    },
    #[command(about = "Delete cached trees whose expiry is older than the cleanup grace period")]
    CacheCleanup,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        logging::init(&config.logging);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Analyze { catalog, category } => commands::analyze::run(&catalog, &category),
        Command::Rank { catalog, category, user, limit } => {
            commands::rank::run(&catalog, &category, user.as_deref(), limit)
        }
        Command::CacheCleanup => commands::cache_cleanup::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
