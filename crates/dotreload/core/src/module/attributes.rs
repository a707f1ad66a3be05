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

//! Custom attributes and compile-time constants

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compile-time constant value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
}

impl Constant {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Constant::I32(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Bool(v) => write!(f, "{}", v),
            Constant::I32(v) => write!(f, "{}", v),
            Constant::I64(v) => write!(f, "{}L", v),
            Constant::F64(v) => write!(f, "{:?}", v),
            Constant::Str(v) => write!(f, "{:?}", v),
        }
    }
}

/// Named property set on an attribute instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedArgument {
    pub name: String,
    pub value: Constant,
}

/// Declarative metadata attached to a type, field or routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomAttribute {
    /// Full name of the attribute type
    pub type_name: String,
    /// Named properties, in declaration order
    pub properties: Vec<NamedArgument>,
}

impl CustomAttribute {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: Vec::new(),
        }
    }

    /// Add a named property
    pub fn with_property(mut self, name: impl Into<String>, value: Constant) -> Self {
        self.properties.push(NamedArgument { name: name.into(), value });
        self
    }

    /// First property with the given name
    pub fn property(&self, name: &str) -> Option<&Constant> {
        self.properties.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}

/// Lookup helpers over an attribute list
pub trait AttributeSet {
    /// First attribute of the given type
    fn find_attribute(&self, type_name: &str) -> Option<&CustomAttribute>;

    fn has_attribute(&self, type_name: &str) -> bool {
        self.find_attribute(type_name).is_some()
    }
}

impl AttributeSet for [CustomAttribute] {
    fn find_attribute(&self, type_name: &str) -> Option<&CustomAttribute> {
        self.iter().find(|a| a.type_name == type_name)
    }
}

impl AttributeSet for Vec<CustomAttribute> {
    fn find_attribute(&self, type_name: &str) -> Option<&CustomAttribute> {
        self.as_slice().find_attribute(type_name)
    }
}
