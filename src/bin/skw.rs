use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use skw::config::BuilderConfig;
use skw::error::SkwError;
use skw::executer::ExecuteOptions;
use skw::{book, executer, parser, scaffold, scripter};

#[derive(Parser)]
#[command(name = "skw", about = "ScratchKit builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to builder.toml (skips layered config lookup)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Reduce log output (show warnings/errors only)
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List known books
    ListBooks,
    /// List profiles of a book
    ListProfiles {
        #[arg(long)]
        book: String,
    },
    /// Create a book directory from the skeleton
    AddBook {
        #[arg(long)]
        name: String,
    },
    /// Create a profile directory from the skeleton
    AddProfile {
        #[arg(long)]
        book: String,
        #[arg(long)]
        name: String,
    },
    /// Clone or update a book's sources and run its make command
    InstallBook {
        #[arg(long)]
        book: String,
    },
    /// Extract the build plan from the book XML
    Parse {
        #[arg(long)]
        book: String,
        #[arg(long)]
        profile: String,
    },
    /// Compile the build plan into numbered shell scripts
    Script {
        #[arg(long)]
        book: String,
        #[arg(long)]
        profile: String,
    },
    /// Run the scripts: build, package, cache, install, publish
    Execute {
        #[arg(long)]
        book: String,
        #[arg(long)]
        profile: String,
        /// Answer yes to the root-install confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose > 1 {
        EnvFilter::new("trace")
    } else if cli.verbose > 0 {
        EnvFilter::new("debug")
    } else if cli.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::new("info")
    };

    if cli.verbose > 0 {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .without_time()
            .with_target(false)
            .with_level(true)
            .with_env_filter(filter)
            .init();
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let tag = e
                .downcast_ref::<SkwError>()
                .map(SkwError::category)
                .unwrap_or("error");
            eprintln!("error[{}]: {:#}", tag, e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config =
        BuilderConfig::load(cli.config.as_deref()).context("failed to load builder.toml")?;

    match cli.command {
        Commands::ListBooks => {
            for name in scaffold::list_books(&config)? {
                println!("{}", name);
            }
        }
        Commands::ListProfiles { book } => {
            for name in scaffold::list_profiles(&config, &book)? {
                println!("{}", name);
            }
        }
        Commands::AddBook { name } => scaffold::add_book(&config, &name)?,
        Commands::AddProfile { book, name } => scaffold::add_profile(&config, &book, &name)?,
        Commands::InstallBook { book } => book::install(&config, &book)?,
        Commands::Parse { book, profile } => {
            parser::run(&config, &book, &profile)?;
        }
        Commands::Script { book, profile } => {
            scripter::run(&config, &book, &profile)?;
        }
        Commands::Execute { book, profile, yes } => {
            executer::run(&config, &book, &profile, ExecuteOptions { auto_confirm: yes })?;
        }
    }

    Ok(())
}
