//! Frame-boundary scheduling for deferred snippet execution

use crate::host::Scheduler;
use futures::future::{FutureExt, LocalBoxFuture};
use log::trace;
use std::cell::{Cell, RefCell};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Holds continuations until the next frame tick.
///
/// `tick` must be called from inside a `tokio::task::LocalSet`; every
/// continuation registered before the call is spawned there in
/// registration order. Continuations registered while a tick is being
/// processed wait for the following tick.
#[derive(Default)]
pub struct FrameScheduler {
    pending: RefCell<Vec<LocalBoxFuture<'static, ()>>>,
    ticks: Cell<u64>,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        let due = std::mem::take(&mut *self.pending.borrow_mut());
        self.ticks.set(self.ticks.get() + 1);

        if !due.is_empty() {
            trace!(
                "Tick {}: starting {} deferred tasks",
                self.ticks.get(),
                due.len()
            );
        }

        due.into_iter().map(tokio::task::spawn_local).collect()
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.get()
    }
}

impl Scheduler for FrameScheduler {
    fn once_next_tick(&self, task: LocalBoxFuture<'static, ()>) {
        self.pending.borrow_mut().push(task);
    }

    fn wait(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed_local()
    }
}
