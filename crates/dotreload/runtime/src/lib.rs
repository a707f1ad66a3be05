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

//! Host-side reload coordination
//!
//! Instrumented modules carry a dispatcher type whose `Unload` and `Load`
//! entry points reset every hooked type. [`TypeReloader`] finds those entry
//! points in the modules loaded into a [`Runtime`](dotreload_core::vm::Runtime)
//! and drives the unload, garbage pass, load cycle.

pub mod error;
pub mod reloader;

pub use error::{ReloadError, ReloadResult};
pub use reloader::{ReloadReport, ReloadableModule, TypeReloader};
