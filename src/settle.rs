//! Promises and background stages.
//!
//! Every analysis stage of a [`FaceRecord`] runs on its own thread and reports its outcome
//! through a one-shot channel. The orchestrator waits for *all* of its stages to settle (succeed or
//! fail) before refining their results; a failing stage never cancels the others.
//!
//! Stage threads are detached: dropping a [`Stage`] abandons it without waiting, and its result
//! is discarded when it arrives.
//!
//! [`FaceRecord`]: crate::record::FaceRecord

use std::{
    any::Any,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    thread::{self, JoinHandle},
};

use anyhow::anyhow;

/// Creates the sending and receiving ends of a single-value channel.
fn promise<T>() -> (Promise<T>, PromiseHandle<T>) {
    let (sender, recv) = crossbeam::channel::bounded(1);
    (Promise { sender }, PromiseHandle { recv })
}

/// Write end of a one-shot result, owned by the stage thread.
struct Promise<T> {
    sender: crossbeam::channel::Sender<T>,
}

impl<T> Promise<T> {
    /// Never blocks. The value is dropped if nobody is listening anymore.
    fn fulfill(self, value: T) {
        if self.sender.send(value).is_err() {
            log::trace!("promise fulfilled after its handle was dropped");
        }
    }
}

/// Read end of a one-shot result.
struct PromiseHandle<T> {
    recv: crossbeam::channel::Receiver<T>,
}

impl<T> PromiseHandle<T> {
    /// Waits for the value. Returns [`None`] if the [`Promise`] went away unfulfilled.
    fn block(self) -> Option<T> {
        self.recv.recv().ok()
    }

    fn is_fulfilled(&self) -> bool {
        !self.recv.is_empty()
    }
}

/// A fallible operation running on a background thread.
///
/// Created by [`spawn_stage`].
pub struct Stage<T> {
    name: String,
    handle: PromiseHandle<anyhow::Result<T>>,
    /// `None` if the thread could not be spawned.
    thread: Option<JoinHandle<()>>,
}

/// Runs `f` on a new, detached thread named `name`.
///
/// The returned [`Stage`] settles with the result of `f`. If `f` panics, or the thread cannot be
/// spawned, the stage settles with an error instead.
pub fn spawn_stage<T, F>(name: impl Into<String>, f: F) -> Stage<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let name = name.into();
    let (promise, handle) = promise();

    let thread_name = name.clone();
    let thread = thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            log::trace!("stage '{thread_name}' starting");
            let result = catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
                Err(anyhow!(
                    "stage '{thread_name}' panicked: {}",
                    panic_message(&*payload)
                ))
            });
            promise.fulfill(result);
            log::trace!("stage '{thread_name}' exiting");
        });

    let thread = match thread {
        Ok(thread) => Some(thread),
        Err(e) => {
            log::error!("failed to spawn stage '{name}': {e}");
            None
        }
    };

    Stage {
        name,
        handle,
        thread,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string payload>"
    }
}

impl<T> Stage<T> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the stage has settled, ie. whether [`Stage::settle`] would return without
    /// blocking.
    pub fn is_settled(&self) -> bool {
        self.handle.is_fulfilled()
            || self
                .thread
                .as_ref()
                .map_or(true, |thread| thread.is_finished())
    }

    /// Blocks until the stage has settled and returns its outcome.
    pub fn settle(self) -> anyhow::Result<T> {
        let name = self.name;
        self.handle
            .block()
            .ok_or_else(|| anyhow!("stage '{name}' terminated without result"))?
    }
}

impl<T> fmt::Debug for Stage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("settled", &self.is_settled())
            .finish()
    }
}
