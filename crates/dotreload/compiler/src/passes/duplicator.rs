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

//! Initializer duplicator

use super::compiler_generated;
use crate::config::MarkerNames;
use crate::error::{EngineError, EngineResult};
use dotreload_common::generated;
use dotreload_core::{DebugSymbols, MethodDef, MethodId, Module, TypeId, TypeSig, Visibility};
use tracing::debug;

/// Copies a type's static initializer into a private routine that can be
/// called again on every load.
pub struct InitializerDuplicator<'a> {
    markers: &'a MarkerNames,
}

impl<'a> InitializerDuplicator<'a> {
    pub fn new(markers: &'a MarkerNames) -> Self {
        Self { markers }
    }

    /// Returns the copy, or `None` when the type has no static initializer.
    /// The original initializer is left untouched.
    pub fn duplicate(&self, module: &mut Module, symbols: Option<&mut DebugSymbols>, ty: TypeId) -> EngineResult<Option<MethodId>> {
        let Some(initializer) = module.type_initializer(ty) else {
            return Ok(None);
        };
        let body = module
            .method(initializer)
            .body
            .clone()
            .ok_or_else(|| EngineError::MissingBody(module.method_name(initializer)))?;

        let name = generated::initializer_copy(&module.ty(ty).name);
        let copy = MethodDef::new_static(name, TypeSig::Void)
            .with_visibility(Visibility::Private)
            .with_body(body)
            .with_attribute(compiler_generated(self.markers));
        let copy = module.add_method(ty, copy)?;

        if let Some(symbols) = symbols {
            symbols.copy_method(initializer, copy);
        }
        debug!(ty = %module.full_name(ty), %copy, "duplicated type initializer");
        Ok(Some(copy))
    }
}
