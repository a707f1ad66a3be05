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

use crate::error::{ReloadError, ReloadResult};
use dotreload_common::reloader;
use dotreload_core::MethodId;
use dotreload_core::vm::{ModuleHandle, Runtime};
use metrics::counter;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Dispatcher entry points of one loaded module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadableModule {
    pub handle: ModuleHandle,
    pub name: String,
    pub unload: MethodId,
    pub load: MethodId,
}

/// Summary of one completed reload cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadReport {
    /// Modules whose dispatcher ran
    pub modules: usize,
    /// Garbage pass count after the cycle
    pub gc_passes: u64,
}

/// Drives reload cycles over every instrumented module of a runtime.
///
/// Discovery happens on first use; modules loaded afterwards are picked up by
/// [`TypeReloader::refresh`].
pub struct TypeReloader {
    runtime: Arc<Runtime>,
    modules: Mutex<Option<Vec<ReloadableModule>>>,
}

impl TypeReloader {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            modules: Mutex::new(None),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Rediscover dispatchers across all loaded modules. Returns how many were found.
    pub fn refresh(&self) -> ReloadResult<usize> {
        let found = self.discover()?;
        let count = found.len();
        *self.modules.lock() = Some(found);
        Ok(count)
    }

    /// Modules with a dispatcher, discovering them on first call
    pub fn reloadable_modules(&self) -> ReloadResult<Vec<ReloadableModule>> {
        let mut modules = self.modules.lock();
        if let Some(known) = modules.as_ref() {
            return Ok(known.clone());
        }
        let found = self.discover()?;
        *modules = Some(found.clone());
        Ok(found)
    }

    /// Unload every module, request a garbage pass, then load every module.
    ///
    /// The first failing entry point aborts the cycle.
    #[instrument(skip(self))]
    pub fn reload_dirty_types(&self) -> ReloadResult<ReloadReport> {
        let modules = self.reloadable_modules()?;

        for module in &modules {
            debug!(module = %module.name, "unloading");
            self.runtime.invoke_static(module.handle, module.unload, &[], Vec::new()).map_err(|source| {
                error!(module = %module.name, error = %source, "unload failed");
                ReloadError::Unload {
                    module: module.name.clone(),
                    source,
                }
            })?;
        }

        self.runtime.collect_garbage();

        for module in &modules {
            debug!(module = %module.name, "loading");
            self.runtime.invoke_static(module.handle, module.load, &[], Vec::new()).map_err(|source| {
                error!(module = %module.name, error = %source, "load failed");
                ReloadError::Load {
                    module: module.name.clone(),
                    source,
                }
            })?;
        }

        counter!("dotreload_reload_cycles", 1);
        let report = ReloadReport {
            modules: modules.len(),
            gc_passes: self.runtime.gc_passes(),
        };
        info!(modules = report.modules, "reload complete");
        Ok(report)
    }

    /// Hook for the host entering its interactive mode. A full reload already
    /// resets every static, so types are only reloaded when it was skipped.
    pub fn on_host_restart(&self, full_reload: bool) -> ReloadResult<Option<ReloadReport>> {
        if full_reload {
            debug!("full reload performed by host, nothing to do");
            return Ok(None);
        }
        self.reload_dirty_types().map(Some)
    }

    fn discover(&self) -> ReloadResult<Vec<ReloadableModule>> {
        let mut found = Vec::new();
        for handle in self.runtime.module_handles() {
            let loaded = self.runtime.module(handle)?;
            let module = loaded.module();
            let Some(ty) = module.find_type(reloader::TYPE_NAME) else {
                continue;
            };
            let entry_points = module
                .find_method(ty, reloader::UNLOAD_METHOD)
                .zip(module.find_method(ty, reloader::LOAD_METHOD));
            match entry_points {
                Some((unload, load)) => found.push(ReloadableModule {
                    handle,
                    name: module.name.clone(),
                    unload,
                    load,
                }),
                None => warn!(module = %module.name, "dispatcher type without entry points"),
            }
        }
        debug!(count = found.len(), "dispatchers discovered");
        Ok(found)
    }
}
