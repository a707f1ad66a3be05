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

//! Debug symbols
//!
//! Symbols travel next to a module image and are tied to it by the module's
//! identity. Sequence points map instruction indices to source positions.

use crate::module::{FieldId, MethodId, ModuleUid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.file, self.line, self.column)
    }
}

/// Source position of the instruction at `offset`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencePoint {
    pub offset: u32,
    pub location: SourceLocation,
}

/// Debug symbols of one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugSymbols {
    pub module_id: ModuleUid,
    methods: BTreeMap<MethodId, Vec<SequencePoint>>,
    fields: BTreeMap<FieldId, SourceLocation>,
}

impl DebugSymbols {
    pub fn new(module_id: ModuleUid) -> Self {
        Self {
            module_id,
            methods: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn add_sequence_point(&mut self, method: MethodId, offset: u32, location: SourceLocation) {
        let points = self.methods.entry(method).or_default();
        points.push(SequencePoint { offset, location });
        points.sort_by_key(|p| p.offset);
    }

    pub fn sequence_points(&self, method: MethodId) -> &[SequencePoint] {
        self.methods.get(&method).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_field_location(&mut self, field: FieldId, location: SourceLocation) {
        self.fields.insert(field, location);
    }

    pub fn field_location(&self, field: FieldId) -> Option<&SourceLocation> {
        self.fields.get(&field)
    }

    /// Give `to` the sequence points of `from`, replacing any it had
    pub fn copy_method(&mut self, from: MethodId, to: MethodId) {
        match self.methods.get(&from).cloned() {
            Some(points) => {
                self.methods.insert(to, points);
            }
            None => {
                self.methods.remove(&to);
            }
        }
    }

    pub fn clear_method(&mut self, method: MethodId) {
        self.methods.remove(&method);
    }

    /// Location of the closest sequence point at or before `offset`
    pub fn location_at(&self, method: MethodId, offset: u32) -> Option<&SourceLocation> {
        self.sequence_points(method)
            .iter()
            .take_while(|p| p.offset <= offset)
            .last()
            .map(|p| &p.location)
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}
