mod cli;
mod commands;
mod config;
mod control;
mod devops;
mod error;
mod fsutil;
mod package;
mod paths;
mod progress;
mod template;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Application root every relative path is anchored at
    pub root: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            ui::error(&format!("{err:#}"));
            if let Some(azure) = err.downcast_ref::<azkit::Error>() {
                ui::dim(azure.category().advice());
            }
            error::exit_code(&err)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        root: paths::app_root(cli.root.as_deref())?,
    };

    match cli.command {
        Command::Build(args) => commands::build::run(&ctx, args),
        Command::Upload(args) => commands::deploy::upload(&ctx, args),
        Command::Deploy(args) => commands::deploy::deploy(&ctx, args),
        Command::Variables { variable, prefix } => {
            commands::variables::run(&ctx, &variable, &prefix)
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "amakit", &mut io::stdout());
            Ok(())
        }
    }
}
