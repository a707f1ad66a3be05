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

//! Candidate scanner
//!
//! Walks every type of a module and decides which ones opt into reload support,
//! which of their static fields get reset and which teardown routines run first.

use crate::config::MarkerNames;
use crate::diagnostics::Diagnostic;
use crate::error::{EngineError, EngineResult};
use dotreload_core::{AttributeSet, DebugSymbols, FieldId, MethodId, Module, ModuleError, TypeId};
use tracing::{debug, trace};

/// Static field reset by the load routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticFieldCandidate {
    pub field: FieldId,
    pub name: String,
    pub is_read_only: bool,
    /// Carries the override marker
    pub force_reload: bool,
}

/// Routine run by the unload routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownCallback {
    pub method: MethodId,
    pub name: String,
    pub order: i32,
}

/// A type confirmed for instrumentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadCandidate {
    pub ty: TypeId,
    pub full_name: String,
    /// In declaration order
    pub fields: Vec<StaticFieldCandidate>,
    /// Ascending by order key, declaration order on ties
    pub callbacks: Vec<TeardownCallback>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    NotCandidate,
    Candidate(ReloadCandidate),
}

/// Outcome of scanning a whole module
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub candidates: Vec<ReloadCandidate>,
    pub diagnostics: Vec<Diagnostic>,
    pub types_visited: usize,
}

pub struct CandidateScanner<'a> {
    markers: &'a MarkerNames,
}

impl<'a> CandidateScanner<'a> {
    pub fn new(markers: &'a MarkerNames) -> Self {
        Self { markers }
    }

    /// Scan every type of the module, nested types included
    pub fn scan(&self, module: &Module, symbols: Option<&DebugSymbols>) -> EngineResult<ScanReport> {
        let mut report = ScanReport::default();
        let mut pending: Vec<TypeId> = module.top_level_types().iter().rev().copied().collect();
        let mut visited = vec![false; module.type_count()];

        while let Some(ty) = pending.pop() {
            match visited.get_mut(ty.index()) {
                Some(seen) if !*seen => *seen = true,
                _ => continue,
            }
            report.types_visited += 1;
            pending.extend(module.ty(ty).nested_types.iter().rev().copied());
            if let ScanVerdict::Candidate(candidate) = self.inspect_type(module, ty, symbols, &mut report.diagnostics)? {
                report.candidates.push(candidate);
            }
        }

        debug!(
            module = %module.name,
            visited = report.types_visited,
            candidates = report.candidates.len(),
            "scan complete"
        );
        Ok(report)
    }

    /// Verdict for a single type. Warnings for its read-only fields go to `diagnostics`.
    pub fn inspect_type(&self, module: &Module, ty: TypeId, symbols: Option<&DebugSymbols>, diagnostics: &mut Vec<Diagnostic>) -> EngineResult<ScanVerdict> {
        let def = module.get_type(ty).ok_or(ModuleError::UnknownType(ty))?;
        if !def.attributes.has_attribute(&self.markers.reload_on_enter) {
            return Ok(ScanVerdict::NotCandidate);
        }
        let full_name = module.full_name(ty);

        let mut fields = Vec::new();
        for &id in &def.fields {
            let field = module.get_field(id).ok_or(ModuleError::UnknownField(id))?;
            if !field.is_static || field.is_literal {
                continue;
            }
            fields.push(StaticFieldCandidate {
                field: id,
                name: field.name.clone(),
                is_read_only: field.is_init_only,
                force_reload: field.attributes.has_attribute(&self.markers.force_reload),
            });
        }

        let mut callbacks = Vec::new();
        for &id in &def.methods {
            let method = module.get_method(id).ok_or(ModuleError::UnknownMethod(id))?;
            let Some(marker) = method.attributes.find_attribute(&self.markers.run_before_reload) else {
                continue;
            };
            let qualifies = method.is_static
                && method.params.is_empty()
                && method.return_type.is_void()
                && !method.is_generic()
                && !method.is_type_initializer()
                && method.body.is_some();
            if !qualifies {
                trace!(method = %module.method_name(id), "teardown marker on a routine that cannot run before reload");
                continue;
            }
            let order = match marker.property(&self.markers.order_property) {
                None => 0,
                Some(value) => value.as_i32().ok_or_else(|| EngineError::InvalidOrderKey {
                    method: module.method_name(id),
                    property: self.markers.order_property.clone(),
                    found: value.to_string(),
                })?,
            };
            callbacks.push(TeardownCallback {
                method: id,
                name: method.name.clone(),
                order,
            });
        }
        callbacks.sort_by_key(|c| c.order);

        if fields.is_empty() && callbacks.is_empty() {
            debug!(ty = %full_name, "opt-in type has nothing to reload");
            return Ok(ScanVerdict::NotCandidate);
        }

        for field in fields.iter().filter(|f| f.is_read_only && !f.force_reload) {
            let location = symbols.and_then(|s| s.field_location(field.field)).cloned();
            diagnostics.push(Diagnostic::warning(self.read_only_warning(&field.name, &full_name)).with_location(location));
        }

        Ok(ScanVerdict::Candidate(ReloadCandidate {
            ty,
            full_name,
            fields,
            callbacks,
        }))
    }

    fn read_only_warning(&self, field: &str, type_name: &str) -> String {
        format!(
            "Static field '{field}' of type '{type_name}' is read-only but will be reset on reload. \
             Read-only fields initialized from it will keep stale values. \
             Remove the read-only modifier, make it a constant, or mark it [{}] to accept the reset.",
            self.markers.force_reload_short_name()
        )
    }
}
