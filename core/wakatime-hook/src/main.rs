//! wakatime-hook: host adapter between an editor plugin shim and wakatime-core.
//!
//! The editor side stays a thin script that forwards callbacks as JSON lines;
//! everything stateful (debounce, batching, CLI install) runs here.
//!
//! ## Subcommands
//!
//! - `listen`: Long-running session, events on stdin, host commands on stdout
//! - `install`: Download or update wakatime-cli now
//! - `status`: Print resolved settings, CLI location and cached version

mod host;
mod install;
mod listen;
mod logging;
mod status;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use wakatime_core::Paths;

#[derive(Parser)]
#[command(name = "wakatime-hook")]
#[command(about = "WakaTime editor bridge")]
#[command(version)]
struct Cli {
    /// Settings file to use instead of the platform default
    #[arg(long, global = true, value_name = "PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an editor session (reads events from stdin)
    Listen {
        /// Editor name reported in the user agent
        #[arg(long, default_value = "Sublime Text")]
        editor_name: String,

        /// Editor version reported in the user agent
        #[arg(long)]
        editor_version: String,
    },

    /// Download or update wakatime-cli
    Install,

    /// Show where settings and wakatime-cli were found
    Status,
}

fn main() {
    let cli = Cli::parse();

    let paths = match resolve_paths(cli.settings) {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("wakatime-hook: {}", e);
            std::process::exit(1);
        }
    };
    let _logging_guard = logging::init(&paths);

    match cli.command {
        Commands::Listen {
            editor_name,
            editor_version,
        } => {
            if let Err(e) = listen::run(paths, &editor_name, &editor_version) {
                tracing::error!(error = %e, "wakatime-hook listen failed");
                std::process::exit(1);
            }
        }
        Commands::Install => match install::run(&paths) {
            Ok(path) => println!("{}", path.display()),
            Err(e) => {
                tracing::error!(error = %e, "wakatime-hook install failed");
                eprintln!("wakatime-hook: {}", e);
                std::process::exit(1);
            }
        },
        Commands::Status => {
            if let Err(e) = status::run(&paths) {
                tracing::error!(error = %e, "wakatime-hook status failed");
                eprintln!("wakatime-hook: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn resolve_paths(settings: Option<PathBuf>) -> Result<Paths, String> {
    let paths = Paths::discover()?;
    Ok(match settings {
        Some(path) => paths.with_settings_file(path),
        None => paths,
    })
}
