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

//! Pipeline driver
//!
//! [`ReloadPostProcessor`] is the boundary the build integration talks to. It
//! decides whether a compiled module is eligible, decodes it, runs the passes
//! through [`instrument_module`] and re-encodes the result. Any failure leaves
//! the module untouched and is reported as an error diagnostic.

use crate::config::EngineConfig;
use crate::diagnostics::{Diagnostic, Severity};
use crate::error::{EngineError, EngineResult, PostProcessError};
use crate::passes::{
    CandidateScanner, DispatcherHandles, DispatcherSynthesizer, InitializerDuplicator, InitializerRewriter, LoadUnloadSynthesizer, SynthesizedRoutines,
};
use dotreload_core::{DebugSymbols, MethodId, Module, TypeId, bytecode, check_nesting, validate_module};
use metrics::counter;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use tracing::{debug, error, info, instrument, warn};

/// Name under which engine failures are reported
pub const PROCESSOR_NAME: &str = "ReloadPostProcessor";

/// A module as produced by the host build
#[derive(Debug, Clone, Default)]
pub struct CompiledModule {
    pub name: String,
    /// Names (or file names) of referenced modules
    pub references: Vec<String>,
    /// Active build symbols
    pub defines: Vec<String>,
    pub image: Vec<u8>,
    pub symbols: Option<Vec<u8>>,
}

/// Re-encoded module handed back to the build
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryModule {
    pub image: Vec<u8>,
    pub symbols: Option<Vec<u8>>,
}

/// Outcome of processing one module. `output` is `None` when the module is
/// unchanged or could not be processed.
#[derive(Debug, Clone, Default)]
pub struct PostProcessResult {
    pub output: Option<InMemoryModule>,
    pub diagnostics: Vec<Diagnostic>,
}

impl PostProcessResult {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn is_unchanged(&self) -> bool {
        self.output.is_none()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Members added to one hooked type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookedType {
    pub ty: TypeId,
    pub full_name: String,
    pub initializer: MethodId,
    pub initializer_copy: Option<MethodId>,
    pub load: Option<MethodId>,
    pub unload: Option<MethodId>,
}

#[derive(Debug, Clone)]
pub struct InstrumentedModule {
    pub module: Module,
    pub symbols: Option<DebugSymbols>,
    pub dispatcher: DispatcherHandles,
    pub hooked: Vec<HookedType>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
pub enum Instrumentation {
    /// No type qualified; the input stays as it was
    Unchanged,
    Instrumented(Box<InstrumentedModule>),
}

/// Run every pass over a decoded module.
///
/// Consumes the module so a failed run can never hand back a partially
/// instrumented graph.
#[instrument(skip_all, fields(module = %module.name))]
pub fn instrument_module(mut module: Module, mut symbols: Option<DebugSymbols>, config: &EngineConfig) -> EngineResult<Instrumentation> {
    config.validate().map_err(EngineError::invalid_configuration)?;
    let markers = &config.markers;
    check_nesting(&module)?;

    let report = CandidateScanner::new(markers).scan(&module, symbols.as_ref())?;
    if report.candidates.is_empty() {
        debug!("no reloadable types");
        return Ok(Instrumentation::Unchanged);
    }
    validate_module(&module)?;

    let dispatcher = DispatcherSynthesizer::new(markers).synthesize(&mut module)?;
    let duplicator = InitializerDuplicator::new(markers);
    let synthesizer = LoadUnloadSynthesizer::new(markers);
    let rewriter = InitializerRewriter::new();

    let mut hooked = Vec::with_capacity(report.candidates.len());
    for candidate in &report.candidates {
        let initializer_copy = duplicator.duplicate(&mut module, symbols.as_mut(), candidate.ty)?;
        let unload = synthesizer.synthesize_unload(&mut module, candidate)?;
        let load = synthesizer.synthesize_load(&mut module, candidate, initializer_copy)?;
        let routines = SynthesizedRoutines { load, unload };
        let initializer = rewriter.rewrite(&mut module, symbols.as_mut(), candidate.ty, initializer_copy, routines, &dispatcher)?;

        debug!(
            ty = %candidate.full_name,
            fields = candidate.fields.len(),
            callbacks = candidate.callbacks.len(),
            "hooked type"
        );
        hooked.push(HookedType {
            ty: candidate.ty,
            full_name: candidate.full_name.clone(),
            initializer,
            initializer_copy,
            load,
            unload,
        });
    }

    if config.validate_output {
        validate_module(&module)?;
    }
    counter!("dotreload_hooked_types", hooked.len() as u64);
    info!(types = hooked.len(), "module instrumented");

    Ok(Instrumentation::Instrumented(Box::new(InstrumentedModule {
        module,
        symbols,
        dispatcher,
        hooked,
        diagnostics: report.diagnostics,
    })))
}

/// Build-facing driver
#[derive(Debug, Clone, Default)]
pub struct ReloadPostProcessor {
    config: EngineConfig,
}

impl ReloadPostProcessor {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the module should go through the engine at all
    pub fn will_process(&self, compiled: &CompiledModule) -> bool {
        let config = &self.config;
        if !compiled.defines.iter().any(|d| *d == config.host_define) {
            return false;
        }
        if config.excluded_modules.iter().any(|m| *m == compiled.name) {
            return false;
        }
        let references_markers = compiled
            .references
            .iter()
            .any(|r| Path::new(r).file_stem().is_some_and(|stem| stem == config.marker_module.as_str()));
        if !references_markers {
            return false;
        }
        match &config.module_allow_list {
            Some(allowed) => allowed.iter().any(|m| *m == compiled.name),
            None => true,
        }
    }

    /// Process one module. Never fails: errors, panics included, become error diagnostics.
    pub fn process(&self, compiled: &CompiledModule) -> PostProcessResult {
        if !self.will_process(compiled) {
            return PostProcessResult::unchanged();
        }
        counter!("dotreload_modules_processed", 1);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.try_process(compiled))).unwrap_or_else(|payload| {
            Err(PostProcessError::new(PROCESSOR_NAME, &compiled.name, EngineError::Panic(panic_message(payload.as_ref()))))
        });

        match outcome {
            Ok(result) => result,
            Err(failure) => {
                error!(module = %compiled.name, "{}", failure);
                counter!("dotreload_modules_failed", 1);
                PostProcessResult {
                    output: None,
                    diagnostics: vec![Diagnostic::error(failure.to_string())],
                }
            }
        }
    }

    /// Process one module, returning engine failures as errors
    pub fn try_process(&self, compiled: &CompiledModule) -> Result<PostProcessResult, PostProcessError> {
        let wrap = |source: EngineError| PostProcessError::new(PROCESSOR_NAME, &compiled.name, source);
        let mut diagnostics = Vec::new();
        let (module, symbols) = self.read(compiled, &mut diagnostics).map_err(wrap)?;

        let instrumented = match instrument_module(module, symbols, &self.config).map_err(wrap)? {
            Instrumentation::Unchanged => return Ok(PostProcessResult { output: None, diagnostics }),
            Instrumentation::Instrumented(instrumented) => instrumented,
        };

        diagnostics.extend(instrumented.diagnostics.iter().cloned());
        if self.config.warnings_as_errors && diagnostics.iter().any(|d| d.severity == Severity::Warning) {
            warn!(module = %compiled.name, "warnings treated as errors");
            let diagnostics = diagnostics.into_iter().map(Diagnostic::promoted).collect();
            return Ok(PostProcessResult { output: None, diagnostics });
        }

        let image = bytecode::write_module(&instrumented.module).map_err(|e| wrap(e.into()))?;
        let symbols = match (&instrumented.symbols, self.config.emit_symbols) {
            (Some(symbols), true) => Some(bytecode::write_symbols(symbols).map_err(|e| wrap(e.into()))?),
            _ => None,
        };
        counter!("dotreload_modules_instrumented", 1);

        Ok(PostProcessResult {
            output: Some(InMemoryModule { image, symbols }),
            diagnostics,
        })
    }

    /// Decode the image and its symbols. Unreadable symbols are dropped with a
    /// warning and the image is read again on its own.
    fn read(&self, compiled: &CompiledModule, diagnostics: &mut Vec<Diagnostic>) -> EngineResult<(Module, Option<DebugSymbols>)> {
        match bytecode::read_module_with_symbols(&compiled.image, compiled.symbols.as_deref()) {
            Ok(decoded) => Ok(decoded),
            Err(first) if compiled.symbols.is_some() => {
                let module = bytecode::read_module(&compiled.image)?;
                warn!(module = %compiled.name, error = %first, "retrying without debug symbols");
                diagnostics.push(Diagnostic::warning(format!(
                    "Could not read debug symbols for {}: {}. The module was processed without symbols.",
                    compiled.name, first
                )));
                Ok((module, None))
            }
            Err(error) => Err(error.into()),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
