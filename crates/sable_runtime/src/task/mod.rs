//! Tasks: one OS thread, one heap, one VM and one mailbox each.
//!
//! Tasks share nothing but `TaskHandle`s. The handle is reference counted
//! with `Arc`; the process keeps one strong handle per unjoined task, every
//! `Task` object and every in-flight `Packed::Task` holds another.

pub(crate) mod mailbox;
pub mod pack;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use self::mailbox::Mailbox;
use self::pack::Packed;
use crate::core::heap::Ref;
use crate::runtime::Process;
use crate::vm::Vm;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Created = 0,
    Running = 1,
    Finished = 2,
    Joined = 3,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TaskState::Created,
            1 => TaskState::Running,
            2 => TaskState::Finished,
            _ => TaskState::Joined,
        }
    }
}

/// How a task's entry method ended, packed for the joiner.
#[derive(Clone, Debug)]
pub enum Outcome {
    Returned(Packed),
    Panicked(Packed),
}

/// A joined task's outcome, unpacked into the joiner's heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Joined {
    Returned(Ref),
    Panicked(Ref),
}

impl Joined {
    pub fn value(self) -> Ref {
        match self {
            Joined::Returned(v) | Joined::Panicked(v) => v,
        }
    }

    pub fn is_panic(self) -> bool {
        matches!(self, Joined::Panicked(_))
    }
}

struct TaskShared {
    id: u64,
    main: bool,
    state: AtomicU8,
    mailbox: Mailbox,
    thread: Mutex<Option<JoinHandle<()>>>,
    outcome: Mutex<Option<Outcome>>,
}

/// Shared handle to a task's cross-thread state.
#[derive(Clone)]
pub struct TaskHandle(Arc<TaskShared>);

impl TaskHandle {
    pub(crate) fn new(id: u64, main: bool) -> Self {
        let state = if main { TaskState::Running } else { TaskState::Created };
        Self(Arc::new(TaskShared {
            id,
            main,
            state: AtomicU8::new(state as u8),
            mailbox: Mailbox::new(),
            thread: Mutex::new(None),
            outcome: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn is_main(&self) -> bool {
        self.0.main
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.0.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: TaskState) {
        self.0.state.store(state as u8, Ordering::Release);
    }

    /// Number of live holders of this task's shared state.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn same(&self, other: &TaskHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn pending_messages(&self) -> usize {
        self.0.mailbox.len()
    }

    pub(crate) fn post(&self, msg: Packed) {
        self.0.mailbox.post(msg);
    }

    pub(crate) fn take(&self) -> Packed {
        self.0.mailbox.take()
    }

    /// Drop undelivered messages; nothing will receive them any more.
    pub(crate) fn close_mailbox(&self) -> usize {
        self.0.mailbox.close()
    }

    fn finish(&self, outcome: Outcome) {
        *self.0.outcome.lock() = Some(outcome);
        self.set_state(TaskState::Finished);
    }

    /// Block until the task's thread has exited and return its outcome.
    /// Every call after the first returns the same outcome.
    pub(crate) fn wait(&self) -> Option<Outcome> {
        let mut thread = self.0.thread.lock();
        if let Some(jh) = thread.take() {
            if jh.join().is_err() {
                fatal!("task {} died from an internal panic", self.id());
            }
            self.set_state(TaskState::Joined);
        }
        drop(thread);
        self.0.outcome.lock().clone()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("refs", &self.ref_count())
            .finish()
    }
}

/// Start a task running `callable` with no arguments on a new thread.
pub(crate) fn spawn(process: &Arc<Process>, callable: Packed) -> TaskHandle {
    let handle = TaskHandle::new(process.next_task_id(), false);
    {
        // Held until the JoinHandle is stored so a racing joiner waits for it.
        let mut slot = handle.0.thread.lock();
        let child = handle.clone();
        let proc = Arc::clone(process);
        let spawned = thread::Builder::new()
            .name(format!("sable-task-{}", handle.id()))
            .stack_size(process.config.task_stack_size)
            .spawn(move || run_task(proc, child, callable));
        match spawned {
            Ok(jh) => *slot = Some(jh),
            Err(e) => fatal!("cannot start a thread for task {}: {e}", handle.id()),
        }
    }
    process.track(handle.clone());
    trace!(process.config.trace, task, "spawned task {}", handle.id());
    handle
}

fn run_task(process: Arc<Process>, handle: TaskHandle, callable: Packed) {
    handle.set_state(TaskState::Running);
    let outcome = {
        let mut vm = Vm::new(Arc::clone(&process), handle.clone());
        vm.run_entry(callable)
    };
    trace!(
        process.config.trace,
        task,
        "task {} {}",
        handle.id(),
        if matches!(outcome, Outcome::Panicked(_)) { "panicked" } else { "returned" }
    );
    let dropped = handle.close_mailbox();
    if dropped > 0 {
        trace!(process.config.trace, task, "task {} left {dropped} message(s) unread", handle.id());
    }
    handle.finish(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_refcount_tracks_clones() {
        let h = TaskHandle::new(7, false);
        assert_eq!(h.ref_count(), 1);
        let h2 = h.clone();
        assert_eq!(h.ref_count(), 2);
        assert!(h.same(&h2));
        drop(h2);
        assert_eq!(h.ref_count(), 1);
        assert_eq!(h.state(), TaskState::Created);
    }

    #[test]
    fn wait_without_thread_returns_recorded_outcome() {
        let h = TaskHandle::new(1, false);
        assert!(h.wait().is_none());
        h.finish(Outcome::Returned(Packed::Int(3)));
        assert!(matches!(h.wait(), Some(Outcome::Returned(Packed::Int(3)))));
        assert_eq!(h.state(), TaskState::Finished);
    }
}
