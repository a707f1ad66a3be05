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

//! Names shared between the instrumentation engine and the host.
//!
//! The engine emits a dispatcher type into every instrumented module and the host
//! finds it again after the module is loaded. Both sides agree on the names below;
//! they are part of the module format and must never change between releases.

/// Names of the synthesized per-module dispatcher.
pub mod reloader {
    /// Full name of the dispatcher type. It lives in the empty namespace.
    pub const TYPE_NAME: &str = "<ModuleTypeReloader>";

    /// Static field holding the combined unload callbacks.
    pub const UNLOAD_ACTIONS_FIELD: &str = "s_UnloadActions";
    /// Static field holding the combined load callbacks.
    pub const LOAD_ACTIONS_FIELD: &str = "s_LoadActions";

    pub const REGISTER_UNLOAD_METHOD: &str = "RegisterUnload";
    pub const REGISTER_LOAD_METHOD: &str = "RegisterLoad";

    /// Entry point invoked by the host before a reload.
    pub const UNLOAD_METHOD: &str = "Unload";
    /// Entry point invoked by the host after its garbage pass.
    pub const LOAD_METHOD: &str = "Load";
}

/// Marker attributes understood by the engine.
pub mod markers {
    /// Opt-in marker placed on a type whose statics should be reloadable.
    pub const RELOAD_ON_ENTER: &str = "DotReload.ReloadOnEnterAttribute";

    /// Placed on a read-only static field to acknowledge that it is reset on reload.
    pub const FORCE_RELOAD: &str = "DotReload.ForceReloadAttribute";

    /// Placed on a parameterless static routine that must run before the type reloads.
    pub const RUN_BEFORE_RELOAD: &str = "DotReload.RunBeforeReloadAttribute";

    /// Named property of [`RUN_BEFORE_RELOAD`] holding the ordering key.
    pub const ORDER_IN_TYPE_PROPERTY: &str = "OrderInType";

    /// Added by the engine to every routine it synthesizes.
    pub const COMPILER_GENERATED: &str = "DotReload.CompilerServices.CompilerGeneratedAttribute";
}

/// Module-level defaults used by the build integration.
pub mod modules {
    /// Module defining the marker attributes.
    pub const MARKER_MODULE: &str = "DotReload";

    /// Host-side module that drives reloads. Never instrumented.
    pub const HOST_MODULE: &str = "DotReload.Host";

    /// Build symbol present only when compiling for the interactive host.
    pub const HOST_DEFINE: &str = "DOTRELOAD_HOST";

    /// File extension of module images.
    pub const MODULE_EXTENSION: &str = "drm";

    /// File extension of debug symbol side-streams.
    pub const SYMBOLS_EXTENSION: &str = "drs";
}

/// Naming scheme for routines the engine adds to a hooked type.
pub mod generated {
    /// Name of the copy of a type's original static initializer.
    pub fn initializer_copy(type_name: &str) -> String {
        format!("<{type_name}>__TypeInitializer__Copy")
    }

    /// Name of the routine that runs a type's teardown callbacks.
    pub fn unload_impl(type_name: &str) -> String {
        format!("<{type_name}>__UnloadType__Impl")
    }

    /// Name of the routine that resets and re-initializes a type's statics.
    pub fn load_impl(type_name: &str) -> String {
        format!("<{type_name}>__LoadType__Impl")
    }
}
