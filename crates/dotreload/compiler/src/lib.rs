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

//! DotReload instrumentation engine
//!
//! Rewrites compiled modules so that types marked for reload can have their
//! static state reset and re-initialized while the host keeps running. The
//! passes live in [`passes`]; [`pipeline`] decides which modules to touch and
//! runs the passes in order.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod passes;
pub mod pipeline;

pub use config::{EngineConfig, MarkerNames};
pub use diagnostics::{Diagnostic, Severity};
pub use error::{EngineError, EngineResult, PostProcessError};
pub use pipeline::{
    CompiledModule, HookedType, InMemoryModule, Instrumentation, InstrumentedModule, PROCESSOR_NAME, PostProcessResult, ReloadPostProcessor,
    instrument_module,
};
