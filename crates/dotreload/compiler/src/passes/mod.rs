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

//! Instrumentation passes
//!
//! Passes run in this order for every module: [`scanner`] once, [`dispatcher`]
//! once, then [`duplicator`], [`synthesizer`] and [`rewriter`] for each hooked type.

pub mod dispatcher;
pub mod duplicator;
pub mod rewriter;
pub mod scanner;
pub mod synthesizer;

pub use dispatcher::{DispatcherHandles, DispatcherSynthesizer};
pub use duplicator::InitializerDuplicator;
pub use rewriter::InitializerRewriter;
pub use scanner::{CandidateScanner, ReloadCandidate, ScanReport, ScanVerdict, StaticFieldCandidate, TeardownCallback};
pub use synthesizer::{LoadUnloadSynthesizer, SynthesizedRoutines};

use crate::config::MarkerNames;
use crate::error::EngineResult;
use dotreload_core::{BindingContext, CustomAttribute, Instruction, MethodId, Module};

/// Attribute placed on every routine the engine adds
pub(crate) fn compiler_generated(markers: &MarkerNames) -> CustomAttribute {
    CustomAttribute::new(markers.compiler_generated.as_str())
}

/// `call` through the declaring type's own generic parameters
pub(crate) fn open_call(module: &Module, method: MethodId) -> EngineResult<Instruction> {
    Ok(Instruction::Call(module.bind_method(method, BindingContext::Open)?))
}
