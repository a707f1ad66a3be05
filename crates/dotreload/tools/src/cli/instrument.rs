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

//! Instrument command: runs the engine over module images on disk

use crate::error::{ToolError, ToolResult};
use clap::Args;
use dotreload_common::modules;
use dotreload_compiler::{CompiledModule, Diagnostic, EngineConfig, PostProcessResult, ReloadPostProcessor};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Arguments for the instrument command
#[derive(Args, Debug, Clone)]
pub struct InstrumentArgs {
    /// Module images to process
    #[arg(value_name = "MODULE", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory receiving instrumented modules
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: PathBuf,

    /// Active build symbols
    #[arg(short = 'D', long = "define", default_value = modules::HOST_DEFINE)]
    pub defines: Vec<String>,

    /// Modules referenced by the inputs
    #[arg(short, long = "reference", default_value = modules::MARKER_MODULE)]
    pub references: Vec<String>,

    /// Engine configuration (TOML)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print diagnostics as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Unchanged,
    Instrumented,
    Failed,
}

/// Outcome for one input
#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    pub module: String,
    pub input: PathBuf,
    pub status: ModuleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InstrumentSummary {
    pub reports: Vec<ModuleReport>,
}

impl InstrumentSummary {
    pub fn count(&self, status: ModuleStatus) -> usize {
        self.reports.iter().filter(|r| r.status == status).count()
    }

    pub fn has_failures(&self) -> bool {
        self.count(ModuleStatus::Failed) > 0
    }

    /// Human-readable listing, one line per module followed by its diagnostics
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for report in &self.reports {
            let status = match report.status {
                ModuleStatus::Unchanged => "unchanged",
                ModuleStatus::Instrumented => "instrumented",
                ModuleStatus::Failed => "FAILED",
            };
            out.push_str(&format!("{}: {}\n", report.module, status));
            for diagnostic in &report.diagnostics {
                out.push_str(&format!("  {}\n", diagnostic));
            }
        }
        out.push_str(&format!(
            "{} instrumented, {} unchanged, {} failed\n",
            self.count(ModuleStatus::Instrumented),
            self.count(ModuleStatus::Unchanged),
            self.count(ModuleStatus::Failed)
        ));
        out
    }

    pub fn render_json(&self) -> ToolResult<String> {
        Ok(serde_json::to_string_pretty(&self.reports)?)
    }
}

/// Load an engine configuration, falling back to the defaults
pub fn load_config(path: Option<&Path>) -> ToolResult<EngineConfig> {
    let config = match path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| ToolError::io(path, e))?;
            toml::from_str::<EngineConfig>(&text).map_err(|e| ToolError::Config(format!("{}: {}", path.display(), e)))?
        }
        None => EngineConfig::default(),
    };
    config.validate().map_err(ToolError::Config)?;
    Ok(config)
}

/// Execute the instrument command
pub fn run_instrument(args: &InstrumentArgs) -> ToolResult<InstrumentSummary> {
    let processor = ReloadPostProcessor::new(load_config(args.config.as_deref())?);
    fs::create_dir_all(&args.out_dir).map_err(|e| ToolError::io(&args.out_dir, e))?;

    let inputs = args
        .inputs
        .iter()
        .map(|path| read_compiled(path, args))
        .collect::<ToolResult<Vec<_>>>()?;
    reject_duplicate_modules(&inputs)?;

    let results: Vec<PostProcessResult> = inputs.par_iter().map(|(_, compiled)| processor.process(compiled)).collect();

    let mut summary = InstrumentSummary::default();
    for ((input, compiled), result) in inputs.into_iter().zip(results) {
        let status = if result.has_errors() {
            ModuleStatus::Failed
        } else if result.is_unchanged() {
            ModuleStatus::Unchanged
        } else {
            ModuleStatus::Instrumented
        };
        let output = match &result.output {
            Some(module) => Some(write_output(&input, &args.out_dir, &module.image, module.symbols.as_deref())?),
            None => None,
        };
        debug!(module = %compiled.name, ?status, "processed");
        summary.reports.push(ModuleReport {
            module: compiled.name,
            input,
            status,
            output,
            diagnostics: result.diagnostics,
        });
    }

    info!(
        instrumented = summary.count(ModuleStatus::Instrumented),
        failed = summary.count(ModuleStatus::Failed),
        "instrumentation finished"
    );
    Ok(summary)
}

/// Outputs are named after their input, so two inputs naming the same module
/// would overwrite each other in the output directory.
fn reject_duplicate_modules(inputs: &[(PathBuf, CompiledModule)]) -> ToolResult<()> {
    let mut seen: HashMap<&str, &Path> = HashMap::new();
    for (path, compiled) in inputs {
        if let Some(first) = seen.insert(compiled.name.as_str(), path.as_path()) {
            return Err(ToolError::DuplicateModule {
                name: compiled.name.clone(),
                first: first.to_path_buf(),
                second: path.clone(),
            });
        }
    }
    Ok(())
}

/// Read an image and its optional symbol side-stream. The module name is the file stem.
fn read_compiled(path: &Path, args: &InstrumentArgs) -> ToolResult<(PathBuf, CompiledModule)> {
    let image = fs::read(path).map_err(|e| ToolError::io(path, e))?;
    let symbols_path = path.with_extension(modules::SYMBOLS_EXTENSION);
    let symbols = if symbols_path.is_file() {
        Some(fs::read(&symbols_path).map_err(|e| ToolError::io(&symbols_path, e))?)
    } else {
        None
    };
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok((
        path.to_path_buf(),
        CompiledModule {
            name,
            references: args.references.clone(),
            defines: args.defines.clone(),
            image,
            symbols,
        },
    ))
}

fn write_output(input: &Path, out_dir: &Path, image: &[u8], symbols: Option<&[u8]>) -> ToolResult<PathBuf> {
    let file_name = input.file_name().ok_or_else(|| ToolError::io(input, std::io::ErrorKind::InvalidInput.into()))?;
    let output = out_dir.join(file_name);
    fs::write(&output, image).map_err(|e| ToolError::io(&output, e))?;
    if let Some(symbols) = symbols {
        let symbols_path = output.with_extension(modules::SYMBOLS_EXTENSION);
        fs::write(&symbols_path, symbols).map_err(|e| ToolError::io(&symbols_path, e))?;
    }
    Ok(output)
}
