//! Seawall Inspect - declaration checker
//!
//! Validates repository method declarations against entity metadata ahead of
//! time and prints the compiled query plans, or the declaration errors.
//! Exits with status 1 when any declaration is rejected.

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use seawall_inspect::{load_dir, load_entity, load_file, Inspection, Report};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "seawall-inspect")]
#[command(about = "Check repository method declarations and print their query plans")]
#[command(version = "0.1.0")]
struct Cli {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every declaration and report plans or errors
    Check {
        /// Manifest (.toml/.json), Rust source (.rs) or a directory of them
        input: PathBuf,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Print the entity model resolved from an input, as JSON
    Entity {
        /// Model file (.toml/.json) or Rust source (.rs)
        input: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Check { input, format } => handle_check(&input, format),
        Commands::Entity { input } => handle_entity(&input).map(|()| true),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red());
            process::exit(2);
        }
    }
}

/// Returns whether every declaration compiled.
fn handle_check(input: &Path, format: Format) -> anyhow::Result<bool> {
    let inspections: Vec<(PathBuf, anyhow::Result<Inspection>)> = if input.is_dir() {
        load_dir(input)?
    } else {
        vec![(input.to_path_buf(), load_file(input))]
    };
    if inspections.is_empty() {
        anyhow::bail!("No inputs found in {}", input.display());
    }

    let mut clean = true;
    let mut reports = Vec::new();
    for (path, loaded) in inspections {
        let report = match loaded.and_then(|inspection| Report::build(&inspection)) {
            Ok(report) => report,
            Err(e) => {
                eprintln!("{} {}: {e:#}", "✗".red(), path.display());
                clean = false;
                continue;
            }
        };
        clean &= report.is_clean();
        reports.push(report);
    }

    match format {
        Format::Text => {
            for report in &reports {
                print!("{}", report.to_text());
            }
        }
        Format::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }
    Ok(clean)
}

fn handle_entity(input: &Path) -> anyhow::Result<()> {
    let entity = load_entity(input)?;
    entity
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid entity model: {e}"))?;
    println!("{}", serde_json::to_string_pretty(&entity)?);
    Ok(())
}
