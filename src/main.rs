mod commands;
mod config;
mod detector;
mod diagnostics;
mod error;
mod hasher;
mod index;
mod lockfile;
mod logging;
mod orchestrator;
mod parser;
mod paths;
mod rewriter;
mod scanner;
mod types;
mod watch;
mod workspace;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use crate::commands::Invocation;
use crate::config::Overrides;

#[derive(Parser)]
#[command(name = "linkmend", version, about = "Keep file references valid while files move around a project tree")]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
    /// Config file to use instead of `<root>/.linkmend.toml`.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Minimum log level: error, warn, info, debug, trace.
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,
}

/// Flags that change how files are written.
#[derive(Args)]
struct WriteFlags {
    /// Copy each file to `<name>.linkbak` before rewriting it.
    #[arg(long)]
    backups: bool,
    /// Report what would change without writing anything.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List references whose target does not exist (exit 2 if any)
    Check {
        /// Project root.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Move a file or directory and update every reference to it
    Mv {
        /// Path to move, relative to the project root.
        from: PathBuf,
        /// Destination, relative to the project root.
        to: PathBuf,
        /// Project root.
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Write behaviour.
        #[command(flatten)]
        write: WriteFlags,
    },
    /// Print every reference found in the tree
    Scan {
        /// Print a JSON array instead of one line per reference.
        #[arg(long)]
        json: bool,
        /// Project root.
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Watch the tree and repair references as files move
    Watch {
        /// Skip indexing the tree before watching.
        #[arg(long)]
        no_initial_scan: bool,
        /// Project root.
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Write behaviour.
        #[command(flatten)]
        write: WriteFlags,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let invocation = |root: PathBuf, write: Option<&WriteFlags>, skip_initial_scan: bool| {
        return Invocation {
            config: cli.config.clone(),
            overrides: Overrides {
                create_backups: write.is_some_and(|w| return w.backups),
                dry_run_mode: write.is_some_and(|w| return w.dry_run),
                log_level: cli.log_level.clone(),
                skip_initial_scan,
            },
            root,
        };
    };

    let outcome = match &cli.command {
        Commands::Check { root } => commands::check(&invocation(root.clone(), None, false)),
        Commands::Mv { from, to, root, write } => commands::mv(&invocation(root.clone(), Some(write), false), from, to),
        Commands::Scan { json, root } => commands::scan(&invocation(root.clone(), None, false), *json),
        Commands::Watch {
            no_initial_scan,
            root,
            write,
        } => commands::watch(&invocation(root.clone(), Some(write), *no_initial_scan)),
    };

    return match outcome {
        Ok(code) => code,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::FAILURE
        },
    };
}
