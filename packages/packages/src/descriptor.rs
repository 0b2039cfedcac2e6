//! Per-package lifecycle.
//!
//! Each descriptor moves `Unresolved -> Initializing -> Ready` on first
//! resolve. A failed or panicking hook rolls it back to `Unresolved`.
//! Threads that find a descriptor `Initializing` wait for it to settle; a
//! resolve of the same package from inside its own hook is an error.

use std::cell::RefCell;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use trellis_core::{Error, Result};

use crate::context::HostContext;
use crate::definition::{Instance, PackageDefinition};

/// Lifecycle state of a package, as reported by introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    Unresolved,
    Initializing,
    Ready,
}

enum Slot {
    Unresolved,
    Initializing,
    Ready(Instance),
}

thread_local! {
    /// Packages whose hooks are running on this thread, outermost first.
    static INIT_STACK: RefCell<Vec<(u64, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a package as initializing on the current call stack.
struct StackFrame;

impl StackFrame {
    fn enter(registry: u64, name: &str) -> Result<Self> {
        INIT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack
                .iter()
                .position(|(r, n)| *r == registry && n == name)
            {
                let mut chain: Vec<String> = stack[pos..]
                    .iter()
                    .filter(|(r, _)| *r == registry)
                    .map(|(_, n)| n.clone())
                    .collect();
                chain.push(name.to_string());
                return Err(Error::ReentrantInit {
                    name: name.to_string(),
                    chain,
                });
            }
            stack.push((registry, name.to_string()));
            Ok(StackFrame)
        })
    }
}

impl Drop for StackFrame {
    fn drop(&mut self) {
        INIT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

pub(crate) struct PackageDescriptor {
    registry: u64,
    name: String,
    definition: PackageDefinition,
    slot: Mutex<Slot>,
    settled: Condvar,
}

impl PackageDescriptor {
    pub(crate) fn new(registry: u64, name: String, definition: PackageDefinition) -> Self {
        Self {
            registry,
            name,
            definition,
            slot: Mutex::new(Slot::Unresolved),
            settled: Condvar::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn definition(&self) -> &PackageDefinition {
        &self.definition
    }

    pub(crate) fn state(&self) -> PackageState {
        match &*self.lock() {
            Slot::Unresolved => PackageState::Unresolved,
            Slot::Initializing => PackageState::Initializing,
            Slot::Ready(_) => PackageState::Ready,
        }
    }

    /// Produce the package instance, initializing it if needed.
    pub(crate) fn resolve(&self, ctx: &HostContext) -> Result<Instance> {
        if !self.definition.is_singleton() {
            let _frame = StackFrame::enter(self.registry, &self.name)?;
            return self.initialize(ctx);
        }

        let mut slot = self.lock();
        loop {
            match &*slot {
                Slot::Ready(instance) => return Ok(instance.clone()),
                Slot::Unresolved => break,
                Slot::Initializing => {
                    // Our own hook asking for us again fails here; any other
                    // thread waits for the owner to settle the slot.
                    drop(StackFrame::enter(self.registry, &self.name)?);
                    slot = self
                        .settled
                        .wait(slot)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        *slot = Slot::Initializing;
        drop(slot);

        let pending = Pending {
            descriptor: self,
            armed: true,
        };
        let _frame = StackFrame::enter(self.registry, &self.name)?;
        let instance = self.initialize(ctx)?;
        pending.complete(instance.clone());
        debug!(package = %self.name, "package ready");
        Ok(instance)
    }

    fn initialize(&self, ctx: &HostContext) -> Result<Instance> {
        match self.definition.initializer() {
            Some(init) => {
                debug!(package = %self.name, "running package initializer");
                // Registry errors raised inside the hook (a nested resolve
                // failing) are re-raised as they are; anything else is wrapped.
                init(ctx).map_err(|source| match source.downcast::<Error>() {
                    Ok(inner) => *inner,
                    Err(source) => Error::Initialization {
                        name: self.name.clone(),
                        source,
                    },
                })
            }
            None => Ok(self.definition.value().clone()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Rolls an `Initializing` slot back to `Unresolved` unless completed.
struct Pending<'a> {
    descriptor: &'a PackageDescriptor,
    armed: bool,
}

impl Pending<'_> {
    fn complete(mut self, instance: Instance) {
        *self.descriptor.lock() = Slot::Ready(instance);
        self.armed = false;
        self.descriptor.settled.notify_all();
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(package = %self.descriptor.name, "initialization failed, rolling back");
            *self.descriptor.lock() = Slot::Unresolved;
            self.descriptor.settled.notify_all();
        }
    }
}
