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

//! The build-facing driver over encoded images

mod support;

use dotreload_compiler::{EngineConfig, ReloadPostProcessor, Severity};
use dotreload_core::vm::Value;
use dotreload_core::{DebugSymbols, FieldDef, Instruction, ModuleUid, SourceLocation, TypeDef, TypeSig, read_module, read_symbols, validate_module};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use support::*;

fn reloadable_module() -> dotreload_core::Module {
    let mut module = game_module();
    let player = module.add_type(opt_in("Player"));
    let health = add_static(&mut module, player, "health", TypeSig::I32);
    initializer_storing(&mut module, player, vec![(health, Instruction::LdcI4(100))]);
    module
}

#[test]
fn test_module_without_candidates_is_returned_unchanged() {
    let mut module = game_module();
    let plain = module.add_type(TypeDef::class("Game", "Plain"));
    add_static(&mut module, plain, "count", TypeSig::I32);

    let result = ReloadPostProcessor::default().process(&compiled(&module, None));
    assert!(result.is_unchanged());
    assert!(result.diagnostics.is_empty());
}

#[test]
fn test_instrumented_image_decodes_validates_and_runs() {
    let module = reloadable_module();
    let result = ReloadPostProcessor::default().process(&compiled(&module, None));
    assert!(!result.has_errors());

    let output = result.output.unwrap();
    assert!(output.symbols.is_none());
    let decoded = read_module(&output.image).unwrap();
    validate_module(&decoded).unwrap();
    assert_eq!(decoded.uid, module.uid);

    let host = Host::start(decoded);
    host.write("Game.Player", "health", &[], Value::I32(3));
    host.reload().unwrap();
    assert_eq!(host.read("Game.Player", "health", &[]), Value::I32(100));
}

#[test]
fn test_corrupt_image_reports_a_single_error() {
    let mut input = compiled(&reloadable_module(), None);
    let last = input.image.len() - 1;
    input.image[last] ^= 0xff;

    let result = ReloadPostProcessor::default().process(&input);
    assert!(result.is_unchanged());
    assert_eq!(result.diagnostics.len(), 1);
    let diagnostic = &result.diagnostics[0];
    assert_eq!(diagnostic.severity, Severity::Error);
    assert!(diagnostic.message.contains("ReloadPostProcessor"));
    assert!(diagnostic.message.contains("Game"));
}

#[test]
fn test_cyclic_nesting_reports_a_single_error() {
    let mut module = game_module();
    let outer = module.add_type(opt_in("Player"));
    add_static(&mut module, outer, "health", TypeSig::I32);
    let inner = module.add_nested_type(outer, opt_in("Stats")).unwrap();
    module.ty_mut(inner).nested_types.push(outer);
    module.ty_mut(outer).declaring_type = Some(inner);
    let input = compiled(&module, None);

    let (done, finished) = mpsc::channel();
    thread::spawn(move || {
        let _ = done.send(ReloadPostProcessor::default().process(&input));
    });
    let result = finished.recv_timeout(Duration::from_secs(20)).expect("process returns on a cyclic image");

    assert!(result.is_unchanged());
    assert_eq!(result.diagnostics.len(), 1);
    assert!(result.has_errors());
    assert!(result.diagnostics[0].message.contains("nesting"));
}

#[test]
fn test_corrupt_image_with_symbols_still_reports_one_error() {
    let module = reloadable_module();
    let symbols = DebugSymbols::new(module.uid);
    let mut input = compiled(&module, Some(&symbols));
    input.image.truncate(4);

    let result = ReloadPostProcessor::default().process(&input);
    assert!(result.is_unchanged());
    assert_eq!(result.diagnostics.len(), 1);
    assert!(result.has_errors());
}

#[test]
fn test_mismatched_symbols_are_dropped_with_a_warning() {
    let module = reloadable_module();
    let foreign = DebugSymbols::new(ModuleUid::derive(b"some other build"));
    let result = ReloadPostProcessor::default().process(&compiled(&module, Some(&foreign)));

    assert!(!result.has_errors());
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].severity, Severity::Warning);
    let output = result.output.unwrap();
    assert!(output.symbols.is_none());
    read_module(&output.image).unwrap();
}

#[test]
fn test_matching_symbols_follow_the_module() {
    let mut module = game_module();
    let player = module.add_type(opt_in("Player"));
    let limit = module
        .add_field(player, FieldDef::new_static("limit", TypeSig::I32).read_only())
        .unwrap();
    let initializer = initializer_storing(&mut module, player, vec![(limit, Instruction::LdcI4(8))]);

    let mut symbols = DebugSymbols::new(module.uid);
    symbols.set_field_location(limit, SourceLocation::new("Player.src", 4, 5));
    symbols.add_sequence_point(initializer, 0, SourceLocation::new("Player.src", 6, 9));

    let result = ReloadPostProcessor::default().process(&compiled(&module, Some(&symbols)));
    assert_eq!(result.diagnostics.len(), 1);
    let warning = &result.diagnostics[0];
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.location, Some(SourceLocation::new("Player.src", 4, 5)));

    let output = result.output.unwrap();
    let decoded = read_module(&output.image).unwrap();
    let written = read_symbols(&output.symbols.unwrap(), decoded.uid).unwrap();
    let copy = decoded
        .find_method(player, &dotreload_common::generated::initializer_copy("Player"))
        .unwrap();
    assert_eq!(written.location_at(copy, 0), Some(&SourceLocation::new("Player.src", 6, 9)));
    assert!(written.sequence_points(initializer).is_empty());
}

#[test]
fn test_warnings_as_errors_blocks_output() {
    let mut module = game_module();
    let player = module.add_type(opt_in("Player"));
    module
        .add_field(player, FieldDef::new_static("limit", TypeSig::I32).read_only())
        .unwrap();

    let result = ReloadPostProcessor::new(EngineConfig::strict()).process(&compiled(&module, None));
    assert!(result.is_unchanged());
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].severity, Severity::Error);
}

#[test]
fn test_already_instrumented_module_is_rejected() {
    let processor = ReloadPostProcessor::default();
    let first = processor.process(&compiled(&reloadable_module(), None)).output.unwrap();
    let again = dotreload_compiler::CompiledModule {
        image: first.image.clone(),
        ..compiled(&reloadable_module(), None)
    };

    let result = processor.process(&again);
    assert!(result.is_unchanged());
    assert_eq!(result.diagnostics.len(), 1);
    assert!(result.has_errors());
}

#[test]
fn test_module_outside_allow_list_is_skipped() {
    let processor = ReloadPostProcessor::new(EngineConfig::for_modules(["Tools"]));
    let result = processor.process(&compiled(&reloadable_module(), None));
    assert!(result.is_unchanged());
    assert!(result.diagnostics.is_empty());
}
