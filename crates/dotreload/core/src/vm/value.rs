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

//! Runtime values

use super::statics::TypeStatics;
use crate::module::{MethodId, TypeSig};
use std::fmt;
use std::sync::Arc;

/// Index of a module loaded into a [`super::Runtime`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleHandle(pub usize);

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module#{}", self.0)
    }
}

/// A routine bound to one closed instantiation of its declaring type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundMethod {
    pub module: ModuleHandle,
    pub method: MethodId,
    pub type_args: Arc<[TypeSig]>,
}

/// Immutable multicast list of routines
#[derive(Debug, Clone, PartialEq)]
pub struct Callback {
    targets: Vec<BoundMethod>,
}

impl Callback {
    pub fn single(target: BoundMethod) -> Self {
        Self { targets: vec![target] }
    }

    pub fn targets(&self) -> &[BoundMethod] {
        &self.targets
    }

    /// Combine two callback values; a null side yields the other side unchanged
    pub fn combine(first: &Value, second: &Value) -> Option<Value> {
        match (first, second) {
            (Value::Null, other) | (other, Value::Null) if other.is_callback_or_null() => Some(other.clone()),
            (Value::Callback(a), Value::Callback(b)) => {
                let mut targets = Vec::with_capacity(a.targets.len() + b.targets.len());
                targets.extend_from_slice(&a.targets);
                targets.extend_from_slice(&b.targets);
                Some(Value::Callback(Arc::new(Callback { targets })))
            }
            _ => None,
        }
    }
}

/// Location of one static field slot
#[derive(Clone)]
pub struct StaticAddress {
    pub(crate) statics: Arc<TypeStatics>,
    pub(crate) slot: usize,
}

impl StaticAddress {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl PartialEq for StaticAddress {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.statics, &other.statics) && self.slot == other.slot
    }
}

impl fmt::Debug for StaticAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{}[{}]", self.statics.ty(), self.slot)
    }
}

/// Value on the operand stack, in a local or in a static slot
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Str(Arc<str>),
    FnPtr(BoundMethod),
    Callback(Arc<Callback>),
    Address(StaticAddress),
}

impl Value {
    /// Default value stored in fresh storage of the given closed type
    pub fn default_for(sig: &TypeSig) -> Value {
        match sig {
            TypeSig::Bool => Value::Bool(false),
            TypeSig::I32 => Value::I32(0),
            TypeSig::I64 => Value::I64(0),
            TypeSig::F64 => Value::F64(0.0),
            _ => Value::Null,
        }
    }

    pub fn str(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn is_callback_or_null(&self) -> bool {
        matches!(self, Value::Null | Value::Callback(_))
    }

    /// Truth value used by conditional branches
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::I32(v) => *v != 0,
            Value::I64(v) => *v != 0,
            Value::F64(v) => *v != 0.0,
            _ => true,
        }
    }

    /// Equality used by `ceq`, `bne.un` and `cmpxchg`: numbers and strings by
    /// value, callbacks and addresses by reference.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I32(a), Value::I32(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::FnPtr(a), Value::FnPtr(b)) => a == b,
            (Value::Callback(a), Value::Callback(b)) => Arc::ptr_eq(a, b),
            (Value::Address(a), Value::Address(b)) => a == b,
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F64(_) => "f64",
            Value::Str(_) => "string",
            Value::FnPtr(_) => "fnptr",
            Value::Callback(_) => "callback",
            Value::Address(_) => "address",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Callback(a), Value::Callback(b)) => a == b,
            _ => self.same_identity(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}L", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{:?}", v),
            Value::FnPtr(m) => write!(f, "&{}", m.method),
            Value::Callback(cb) => write!(f, "callback[{}]", cb.targets.len()),
            Value::Address(a) => write!(f, "{:?}", a),
        }
    }
}
