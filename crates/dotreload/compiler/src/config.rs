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

//! Configuration for the instrumentation engine

use dotreload_common::{markers, modules};
use serde::{Deserialize, Serialize};

/// Names of the marker attributes the scanner looks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerNames {
    /// Opt-in marker on a type
    pub reload_on_enter: String,

    /// Marker on a read-only static field that silences the reset warning
    pub force_reload: String,

    /// Marker on a teardown routine
    pub run_before_reload: String,

    /// Named property of the teardown marker holding the ordering key
    pub order_property: String,

    /// Marker added to every synthesized routine
    pub compiler_generated: String,
}

impl Default for MarkerNames {
    fn default() -> Self {
        Self {
            reload_on_enter: markers::RELOAD_ON_ENTER.to_string(),
            force_reload: markers::FORCE_RELOAD.to_string(),
            run_before_reload: markers::RUN_BEFORE_RELOAD.to_string(),
            order_property: markers::ORDER_IN_TYPE_PROPERTY.to_string(),
            compiler_generated: markers::COMPILER_GENERATED.to_string(),
        }
    }
}

impl MarkerNames {
    /// Short name of the override marker as written at a use site, e.g. `ForceReload`
    pub fn force_reload_short_name(&self) -> &str {
        let name = self.force_reload.rsplit('.').next().unwrap_or(&self.force_reload);
        name.strip_suffix("Attribute").unwrap_or(name)
    }

    fn validate(&self) -> Result<(), String> {
        let names = [
            ("reload_on_enter", &self.reload_on_enter),
            ("force_reload", &self.force_reload),
            ("run_before_reload", &self.run_before_reload),
            ("order_property", &self.order_property),
            ("compiler_generated", &self.compiler_generated),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(format!("Marker name '{}' must not be empty", field));
            }
        }
        Ok(())
    }
}

/// Configuration for a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Build symbol that marks a module as built for the interactive host
    pub host_define: String,

    /// Module defining the marker attributes; only modules referencing it are processed
    pub marker_module: String,

    /// Modules never processed
    pub excluded_modules: Vec<String>,

    /// When set, only these modules are processed
    pub module_allow_list: Option<Vec<String>>,

    pub markers: MarkerNames,

    /// Run the structural validator on every instrumented module
    pub validate_output: bool,

    /// Write debug symbols next to instrumented modules when symbols were read
    pub emit_symbols: bool,

    /// Turn scan warnings into errors and suppress output when any is raised
    pub warnings_as_errors: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host_define: modules::HOST_DEFINE.to_string(),
            marker_module: modules::MARKER_MODULE.to_string(),
            excluded_modules: vec![modules::MARKER_MODULE.to_string(), modules::HOST_MODULE.to_string()],
            module_allow_list: None,
            markers: MarkerNames::default(),
            validate_output: true,
            emit_symbols: true,
            warnings_as_errors: false,
        }
    }
}

impl EngineConfig {
    /// Configuration that only processes the listed modules
    pub fn for_modules<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            module_allow_list: Some(modules.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Strict configuration: warnings fail the module and output is always validated
    pub fn strict() -> Self {
        Self {
            validate_output: true,
            warnings_as_errors: true,
            ..Default::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.host_define.trim().is_empty() {
            return Err("Host define must not be empty".to_string());
        }
        if self.marker_module.trim().is_empty() {
            return Err("Marker module name must not be empty".to_string());
        }
        if self.excluded_modules.iter().any(|m| m.trim().is_empty()) {
            return Err("Excluded module names must not be empty".to_string());
        }
        if let Some(allow_list) = &self.module_allow_list {
            if allow_list.is_empty() {
                return Err("Module allow-list must not be empty when set".to_string());
            }
        }
        self.markers.validate()
    }
}
