//! Instrumented shared state for programs under test.
//!
//! [`Shared`] is a named field whose loads and stores are reported to the
//! coordinator with the observed or stored value. The effect happens first
//! and the hook second, so once a store has been granted every later load
//! sees it. [`Monitor`] is a re-entrant lock object. [`Task`] is a value
//! computed on its own logical thread and collected with a join.

use crate::context::{MonitorGuard, SpawnHandle, ThreadCtx};
use parking_lot::Mutex;
use std::any::type_name;
use std::sync::Arc;
use weft_trace::{Location, MonitorId, ThreadId, Value};

/// A shared field visible to several logical threads.
#[derive(Debug)]
pub struct Shared<T> {
    location: Location,
    cell: Mutex<T>,
}

impl<T> Shared<T>
where
    T: Clone + Into<Value>,
{
    /// Create the field `owner.field`, with a fresh object identity.
    pub fn new(ctx: &ThreadCtx, owner: &str, field: &str, initial: T) -> Self {
        Self {
            location: Location::new(ctx.new_object(), owner, field, type_name::<T>()),
            cell: Mutex::new(initial),
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Load the value and report the read.
    pub fn read(&self, ctx: &ThreadCtx) -> T {
        let value = self.cell.lock().clone();
        ctx.read_operation(self.location.clone(), value.clone().into());
        value
    }

    /// Store the value and report the write.
    pub fn write(&self, ctx: &ThreadCtx, value: T) {
        *self.cell.lock() = value.clone();
        ctx.write_operation(self.location.clone(), value.into());
    }

    /// Read, transform, write back. Two scheduling points, so not atomic.
    pub fn update(&self, ctx: &ThreadCtx, f: impl FnOnce(T) -> T) -> T {
        let next = f(self.read(ctx));
        self.write(ctx, next.clone());
        next
    }
}

impl<T> Shared<T>
where
    T: Clone + PartialEq + Into<Value>,
{
    /// Store `new` if the field holds `expected`, as one scheduling point.
    /// Reported as a write whether or not the swap happened.
    pub fn compare_and_swap(&self, ctx: &ThreadCtx, expected: T, new: T) -> bool {
        let success = {
            let mut cell = self.cell.lock();
            if *cell == expected {
                *cell = new.clone();
                true
            } else {
                false
            }
        };
        ctx.cas_operation(self.location.clone(), expected.into(), new.into(), success);
        success
    }
}

/// A lock object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Monitor {
    id: MonitorId,
}

impl Monitor {
    /// Allocate a monitor with a fresh identity.
    pub fn new(ctx: &ThreadCtx) -> Self {
        Self { id: ctx.new_monitor() }
    }

    pub fn id(&self) -> MonitorId {
        self.id
    }

    pub fn enter(&self, ctx: &ThreadCtx) {
        ctx.enter_monitor(self.id);
    }

    pub fn exit(&self, ctx: &ThreadCtx) {
        ctx.exit_monitor(self.id);
    }

    /// Enter and return a guard that exits on drop.
    pub fn lock<'a>(&self, ctx: &'a ThreadCtx) -> MonitorGuard<'a> {
        MonitorGuard::lock(ctx, self.id)
    }

    pub fn synchronized<R>(&self, ctx: &ThreadCtx, f: impl FnOnce() -> R) -> R {
        ctx.synchronized(self.id, f)
    }
}

/// A value computed on a separate logical thread.
#[derive(Debug)]
pub struct Task<T> {
    handle: SpawnHandle,
    result: Arc<Mutex<Option<T>>>,
}

impl<T: Send + 'static> Task<T> {
    /// Start `f` on a new logical thread.
    pub fn spawn<F>(ctx: &ThreadCtx, f: F) -> Self
    where
        F: FnOnce(&ThreadCtx) -> T + Send + 'static,
    {
        let result = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&result);
        let handle = ctx.spawn(move |ctx| {
            let value = f(ctx);
            *slot.lock() = Some(value);
        });
        Self { handle, result }
    }

    pub fn thread(&self) -> Option<ThreadId> {
        self.handle.thread()
    }

    /// Join the task's thread and take its value.
    ///
    /// `None` once the value has been taken, or when the task was never
    /// launched.
    pub fn get(&self, ctx: &ThreadCtx) -> Option<T> {
        self.handle.join(ctx);
        self.result.lock().take()
    }
}
