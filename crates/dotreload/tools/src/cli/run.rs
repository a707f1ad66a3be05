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

//! Run command: loads module images, invokes an entry routine and drives reload cycles

use crate::error::{ToolError, ToolResult};
use clap::Args;
use dotreload_core::read_module;
use dotreload_core::vm::{Runtime, Value, VmConfig};
use dotreload_runtime::TypeReloader;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Arguments for the run command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Module images to load, in order
    #[arg(value_name = "MODULE", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Static routine to invoke, as `Type::Method`
    #[arg(short, long)]
    pub entry: String,

    /// Number of reload cycles to perform after the entry routine returns
    #[arg(long, default_value = "0")]
    pub reload: u32,

    /// Maximum call depth
    #[arg(long, default_value = "256")]
    pub max_call_depth: usize,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub result: Option<Value>,
    pub reloadable_modules: usize,
    pub reload_cycles: u32,
}

/// Split `Namespace.Type::Method` at the last `::`
pub fn parse_entry(entry: &str) -> ToolResult<(&str, &str)> {
    match entry.rsplit_once("::") {
        Some((ty, method)) if !ty.is_empty() && !method.is_empty() => Ok((ty, method)),
        _ => Err(ToolError::InvalidEntry(entry.to_string())),
    }
}

/// Execute the run command
pub fn run_modules(args: &RunArgs) -> ToolResult<RunSummary> {
    let config = VmConfig {
        max_call_depth: args.max_call_depth,
    };
    config.validate().map_err(ToolError::Config)?;
    let (type_name, method_name) = parse_entry(&args.entry)?;

    let runtime = Arc::new(Runtime::new(config));
    let mut handles = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let image = fs::read(input).map_err(|e| ToolError::io(input, e))?;
        handles.push(runtime.load_module(read_module(&image)?)?);
    }

    let (handle, method) = handles
        .iter()
        .find_map(|&handle| runtime.find_method(handle, type_name, method_name).ok().map(|m| (handle, m)))
        .ok_or_else(|| ToolError::EntryNotFound(args.entry.clone()))?;

    let start = Instant::now();
    let result = runtime.invoke_static(handle, method, &[], Vec::new())?;
    info!(entry = %args.entry, elapsed = ?start.elapsed(), "entry routine returned");

    let reloader = TypeReloader::new(runtime.clone());
    let reloadable_modules = reloader.reloadable_modules()?.len();
    for cycle in 1..=args.reload {
        let report = reloader.reload_dirty_types()?;
        info!(cycle, modules = report.modules, "reload cycle complete");
    }

    Ok(RunSummary {
        result,
        reloadable_modules,
        reload_cycles: args.reload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        assert_eq!(parse_entry("Game.Main::Start").unwrap(), ("Game.Main", "Start"));
        assert_eq!(parse_entry("Game.World/Cache::Fill").unwrap(), ("Game.World/Cache", "Fill"));
        assert!(matches!(parse_entry("Start"), Err(ToolError::InvalidEntry(_))));
        assert!(matches!(parse_entry("Game::"), Err(ToolError::InvalidEntry(_))));
    }
}
