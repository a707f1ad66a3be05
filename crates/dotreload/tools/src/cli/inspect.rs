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

//! Inspect command: prints the declarations and disassembly of a module image

use crate::error::{ToolError, ToolResult};
use clap::Args;
use dotreload_core::{Instruction, MethodDef, Module, TypeId, Visibility, read_module};
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

/// Arguments for the inspect command
#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Module image to inspect
    #[arg(value_name = "MODULE")]
    pub input: PathBuf,
}

/// Decode a module image and render it as text
pub fn inspect_module(path: &Path) -> ToolResult<String> {
    let image = fs::read(path).map_err(|e| ToolError::io(path, e))?;
    let module = read_module(&image)?;
    let mut out = String::new();
    render_module(&module, &mut out)?;
    Ok(out)
}

fn visibility(v: Visibility) -> &'static str {
    match v {
        Visibility::Public => "public",
        Visibility::Internal => "internal",
        Visibility::Private => "private",
    }
}

pub fn render_module(module: &Module, out: &mut String) -> std::fmt::Result {
    writeln!(out, "module {} ({})", module.name, module.uid)?;
    for reference in &module.references {
        writeln!(out, "  reference {}", reference)?;
    }

    let mut pending: Vec<TypeId> = module.top_level_types().iter().rev().copied().collect();
    let mut visited = vec![false; module.type_count()];
    while let Some(ty) = pending.pop() {
        match visited.get_mut(ty.index()) {
            Some(seen) if !*seen => *seen = true,
            _ => continue,
        }
        let def = module.ty(ty);
        pending.extend(def.nested_types.iter().rev().copied());

        writeln!(out)?;
        write!(out, "{} class {}", visibility(def.visibility), module.full_name(ty))?;
        if def.is_generic() {
            write!(out, "<{}>", def.generic_params.join(", "))?;
        }
        writeln!(out)?;
        for attribute in &def.attributes {
            writeln!(out, "  [{}]", attribute.type_name)?;
        }

        for &field in &def.fields {
            let field = module.field(field);
            write!(out, "  field {}", visibility(field.visibility))?;
            if field.is_static {
                write!(out, " static")?;
            }
            if field.is_literal {
                write!(out, " literal")?;
            }
            if field.is_init_only {
                write!(out, " readonly")?;
            }
            write!(out, " {} {}", field.field_type, field.name)?;
            if let Some(constant) = &field.constant {
                write!(out, " = {}", constant)?;
            }
            writeln!(out)?;
        }

        for &method in &def.methods {
            render_method(module, module.method(method), out)?;
        }
    }
    Ok(())
}

fn render_method(module: &Module, method: &MethodDef, out: &mut String) -> std::fmt::Result {
    write!(out, "  method {}", visibility(method.visibility))?;
    if method.is_static {
        write!(out, " static")?;
    }
    let params: Vec<String> = method.params.iter().map(|p| format!("{} {}", p.param_type, p.name)).collect();
    writeln!(out, " {} {}({})", method.return_type, method.name, params.join(", "))?;
    for attribute in &method.attributes {
        writeln!(out, "    [{}]", attribute.type_name)?;
    }

    let Some(body) = &method.body else {
        return Ok(());
    };
    for (index, local) in body.locals.iter().enumerate() {
        writeln!(out, "    .local {} {}", index, local)?;
    }
    for (offset, instruction) in body.instructions.iter().enumerate() {
        write!(out, "    IL_{:04}: {}", offset, instruction)?;
        if let Some(target) = operand_name(module, instruction) {
            write!(out, "  // {}", target)?;
        }
        writeln!(out)?;
    }
    for handler in &body.exception_handlers {
        writeln!(
            out,
            "    .{:?} try IL_{:04}..IL_{:04} handler IL_{:04}..IL_{:04}",
            handler.kind, handler.try_start, handler.try_end, handler.handler_start, handler.handler_end
        )?;
    }
    Ok(())
}

fn operand_name(module: &Module, instruction: &Instruction) -> Option<String> {
    if let Some(field) = instruction.field_operand() {
        return Some(module.field_name(field.field));
    }
    instruction.method_operand().map(|method| module.method_name(method.method))
}
