//! Process state and the main task's entry point.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::RuntimeConfig;
use crate::module::Registry;
use crate::task::{TaskHandle, TaskState};
use crate::vm::Vm;

/// State shared by every task of one process.
pub struct Process {
    pub(crate) registry: Registry,
    pub(crate) config: RuntimeConfig,
    unjoined: Mutex<Vec<TaskHandle>>,
    next_id: AtomicU64,
}

impl Process {
    fn new(registry: Registry, config: RuntimeConfig) -> Self {
        Self { registry, config, unjoined: Mutex::new(Vec::new()), next_id: AtomicU64::new(1) }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Task ids start at 1; the main task is 0.
    pub(crate) fn next_task_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn track(&self, handle: TaskHandle) {
        self.unjoined.lock().push(handle);
    }

    pub(crate) fn untrack(&self, handle: &TaskHandle) {
        self.unjoined.lock().retain(|h| !h.same(handle));
    }

    /// Spawned tasks nobody has joined yet.
    pub fn unjoined(&self) -> usize {
        self.unjoined.lock().len()
    }
}

/// A booted runtime: the process plus the main task's VM.
pub struct Runtime {
    process: Arc<Process>,
    vm: Vm,
}

impl Runtime {
    pub fn boot(registry: Registry, config: RuntimeConfig) -> Self {
        let process = Arc::new(Process::new(registry, config));
        let vm = Vm::new(Arc::clone(&process), TaskHandle::new(0, true));
        trace!(config.trace, task, "runtime booted");
        Self { process, vm }
    }

    /// Boot with no modules and configuration read from the environment.
    pub fn from_env() -> Self {
        Self::boot(Registry::default(), RuntimeConfig::from_env())
    }

    pub fn vm(&mut self) -> &mut Vm {
        &mut self.vm
    }

    pub fn main_task(&self) -> &TaskHandle {
        self.vm.task()
    }

    pub fn process(&self) -> &Arc<Process> {
        &self.process
    }

    /// Wait for every task that was spawned but never joined. Their
    /// outcomes are discarded. Returns how many tasks were waited on.
    pub fn shutdown(&mut self) -> usize {
        let mut waited = 0;
        loop {
            // Tasks may spawn more tasks while we wait, so drain in rounds.
            let pending = std::mem::take(&mut *self.process.unjoined.lock());
            if pending.is_empty() {
                break;
            }
            for handle in pending {
                if handle.state() != TaskState::Joined {
                    handle.wait();
                    waited += 1;
                }
            }
        }
        trace!(self.process.config.trace, task, "shutdown waited on {waited} task(s)");
        waited
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
        self.vm.task().close_mailbox();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_task_is_task_zero() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        assert_eq!(rt.main_task().id(), 0);
        assert!(rt.main_task().is_main());
        let me = rt.vm().current_task();
        assert!(rt.vm().join(me).is_err());
    }

    #[test]
    fn shutdown_waits_for_unjoined_tasks() {
        let mut rt = Runtime::boot(Registry::default(), RuntimeConfig::default());
        let vm = rt.vm();
        let gc = vm.global("gc").unwrap();
        vm.spawn(gc).unwrap();
        vm.spawn(gc).unwrap();
        assert_eq!(rt.process().unjoined(), 2);
        assert_eq!(rt.shutdown(), 2);
        assert_eq!(rt.process().unjoined(), 0);
    }
}
