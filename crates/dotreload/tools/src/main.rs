// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! DotReload CLI Tool
//!
//! Main entry point for the dotreload command-line interface.

use clap::{Parser, Subcommand};
use dotreload_tools::{InspectArgs, InstrumentArgs, RunArgs, inspect_module, run_instrument, run_modules};
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser)]
#[command(name = "dotreload")]
#[command(about = "DotReload - static state reload instrumentation")]
#[command(version = "0.1.0")]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Instrument module images for reloading
    Instrument(InstrumentArgs),
    /// Print the contents of a module image
    Inspect(InspectArgs),
    /// Run a module and perform reload cycles
    Run(RunArgs),
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Instrument(args) => {
            let summary = run_instrument(&args)?;
            if args.json {
                println!("{}", summary.render_json()?);
            } else {
                print!("{}", summary.render_text());
            }
            if summary.has_failures() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Inspect(args) => {
            print!("{}", inspect_module(&args.input)?);
        }
        Commands::Run(args) => {
            let summary = run_modules(&args)?;
            match &summary.result {
                Some(value) => println!("Result: {value}"),
                None => println!("Result: (void)"),
            }
            println!("Reloadable modules: {}", summary.reloadable_modules);
            println!("Reload cycles: {}", summary.reload_cycles);
        }
    }

    Ok(ExitCode::SUCCESS)
}
