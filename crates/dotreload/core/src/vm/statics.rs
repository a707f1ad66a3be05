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

//! Static storage of closed type instantiations

use super::value::{ModuleHandle, Value};
use crate::module::{TypeId, TypeSig};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::thread::{self, ThreadId};
use tracing::debug;

/// Identity of one closed instantiation of a type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StaticsKey {
    pub module: ModuleHandle,
    pub ty: TypeId,
    pub type_args: Vec<TypeSig>,
}

/// Progress of a type's initializer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitState {
    Pending,
    Running(ThreadId),
    Done,
    Failed(String),
}

/// What the caller of [`TypeStatics::begin_init`] has to do next
#[derive(Debug, PartialEq, Eq)]
pub enum InitTicket {
    /// Run the initializer, then report with [`TypeStatics::finish_init`]
    Run,
    /// Storage is usable (initialized, or being initialized by this thread)
    Ready,
    Failed(String),
}

/// Static slots of one closed instantiation, in field declaration order
#[derive(Debug)]
pub struct TypeStatics {
    key: StaticsKey,
    slots: Vec<Mutex<Value>>,
    state: Mutex<InitState>,
    ready: Condvar,
}

impl TypeStatics {
    pub fn new(key: StaticsKey, defaults: Vec<Value>) -> Self {
        Self {
            key,
            slots: defaults.into_iter().map(Mutex::new).collect(),
            state: Mutex::new(InitState::Pending),
            ready: Condvar::new(),
        }
    }

    pub fn key(&self) -> &StaticsKey {
        &self.key
    }

    pub fn ty(&self) -> TypeId {
        self.key.ty
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<MutexGuard<'_, Value>> {
        self.slots.get(index).map(Mutex::lock)
    }

    pub fn state(&self) -> InitState {
        self.state.lock().clone()
    }

    /// Claim the initializer, wait for another thread running it, or report
    /// that storage is ready. The thread running the initializer may re-enter.
    ///
    /// Waiting is skipped when it would close a cycle of threads waiting on
    /// each other's initializers; the storage is then handed out as it is.
    pub fn begin_init(&self, waits: &InitWaits) -> InitTicket {
        let current = thread::current().id();
        loop {
            let mut edges = waits.edges.lock();
            let mut state = self.state.lock();
            let ticket = match &*state {
                InitState::Done => InitTicket::Ready,
                InitState::Failed(message) => InitTicket::Failed(message.clone()),
                InitState::Running(owner) if *owner == current => InitTicket::Ready,
                InitState::Running(owner) if InitWaits::reaches(&edges, *owner, current) => {
                    debug!(ty = %self.key.ty, "initializer cycle across threads, not waiting");
                    InitTicket::Ready
                }
                InitState::Running(owner) => {
                    edges.insert(current, (*owner, self.key.clone()));
                    drop(edges);
                    self.ready.wait(&mut state);
                    continue;
                }
                InitState::Pending => {
                    *state = InitState::Running(current);
                    InitTicket::Run
                }
            };
            edges.remove(&current);
            return ticket;
        }
    }

    /// Publish the initializer's outcome and wake waiting threads
    pub fn finish_init(&self, waits: &InitWaits, outcome: Result<(), String>) {
        let mut edges = waits.edges.lock();
        edges.retain(|_, (_, key)| *key != self.key);
        let mut state = self.state.lock();
        *state = match outcome {
            Ok(()) => InitState::Done,
            Err(message) => InitState::Failed(message),
        };
        self.ready.notify_all();
    }
}

/// Which thread waits on which running initializer.
///
/// Lock order: the wait table first, then a type's init state.
#[derive(Debug, Default)]
pub struct InitWaits {
    edges: Mutex<HashMap<ThreadId, (ThreadId, StaticsKey)>>,
}

impl InitWaits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads currently blocked on another thread's initializer
    pub fn waiting(&self) -> usize {
        self.edges.lock().len()
    }

    fn reaches(edges: &HashMap<ThreadId, (ThreadId, StaticsKey)>, from: ThreadId, target: ThreadId) -> bool {
        let mut cursor = from;
        for _ in 0..=edges.len() {
            if cursor == target {
                return true;
            }
            match edges.get(&cursor) {
                Some((next, _)) => cursor = *next,
                None => return false,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn statics() -> TypeStatics {
        statics_of(TypeId(1))
    }

    fn statics_of(ty: TypeId) -> TypeStatics {
        let key = StaticsKey {
            module: ModuleHandle(0),
            ty,
            type_args: vec![],
        };
        TypeStatics::new(key, vec![Value::I32(0), Value::Null])
    }

    #[test]
    fn test_reentry_on_initializing_thread() {
        let waits = InitWaits::new();
        let statics = statics();
        assert_eq!(statics.begin_init(&waits), InitTicket::Run);
        assert_eq!(statics.begin_init(&waits), InitTicket::Ready);
        statics.finish_init(&waits, Ok(()));
        assert_eq!(statics.state(), InitState::Done);
    }

    #[test]
    fn test_other_threads_wait_for_initializer() {
        let waits = Arc::new(InitWaits::new());
        let statics = Arc::new(statics());
        assert_eq!(statics.begin_init(&waits), InitTicket::Run);
        *statics.slot(0).unwrap() = Value::I32(42);

        let waiter = {
            let statics = statics.clone();
            let waits = waits.clone();
            std::thread::spawn(move || {
                let ticket = statics.begin_init(&waits);
                (ticket, statics.slot(0).map(|v| v.clone()))
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        statics.finish_init(&waits, Ok(()));

        let (ticket, value) = waiter.join().unwrap();
        assert_eq!(ticket, InitTicket::Ready);
        assert_eq!(value, Some(Value::I32(42)));
    }

    #[test]
    fn test_failure_is_sticky() {
        let waits = InitWaits::new();
        let statics = statics();
        assert_eq!(statics.begin_init(&waits), InitTicket::Run);
        statics.finish_init(&waits, Err("boom".into()));
        assert_eq!(statics.begin_init(&waits), InitTicket::Failed("boom".into()));
    }

    #[test]
    fn test_waiting_that_closes_a_cycle_returns_ready() {
        let waits = Arc::new(InitWaits::new());
        let first = Arc::new(statics_of(TypeId(1)));
        let second = Arc::new(statics_of(TypeId(2)));
        assert_eq!(first.begin_init(&waits), InitTicket::Run);

        let other = {
            let (waits, first, second) = (waits.clone(), first.clone(), second.clone());
            std::thread::spawn(move || {
                assert_eq!(second.begin_init(&waits), InitTicket::Run);
                let ticket = first.begin_init(&waits);
                second.finish_init(&waits, Ok(()));
                ticket
            })
        };
        while waits.waiting() == 0 {
            std::thread::yield_now();
        }

        assert_eq!(second.begin_init(&waits), InitTicket::Ready);
        assert_eq!(second.state(), InitState::Running(other.thread().id()));
        first.finish_init(&waits, Ok(()));
        assert_eq!(other.join().unwrap(), InitTicket::Ready);
        assert_eq!(second.state(), InitState::Done);
        assert_eq!(waits.waiting(), 0);
    }
}
