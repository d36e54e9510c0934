//=====================================================
// File: interpreter/async_control.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Task pool, promises, and script locks
// Objective: Run script tasks on a tokio blocking pool, settle their
//            promises exactly once, and provide the reentrant mutexes
//            behind `lock{}`
//=====================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, ReentrantMutex};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{trace, warn};

use super::errors::{OhPanic, PanicCode};
use super::value::Value;
use crate::config::EngineOptions;

//=====================================================
//            Section 1: Task Pool
//=====================================================

/// Worker threads for script tasks. Dropping the pool detaches running
/// tasks instead of waiting for them.
pub struct TaskPool {
    runtime: Option<Runtime>,
    handle: Handle,
}

impl TaskPool {
    pub fn new(options: &EngineOptions) -> Result<Self, OhPanic> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .max_blocking_threads(options.worker_threads)
            .thread_stack_size(options.worker_stack_size)
            .thread_name("ohscript-worker")
            .build()
            .map_err(|err| {
                OhPanic::new(PanicCode::TASK_FAILED, format!("worker pool init failed: {}", err))
            })?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

//=====================================================
//            Section 2: Promises
//=====================================================

pub type Settled = Result<Value, OhPanic>;
type Continuation = Box<dyn FnOnce(&Settled) + Send>;

enum PromiseState {
    Pending(Vec<Continuation>),
    Settled(Settled),
}

/// Result of an asynchronous task, settled once.
pub struct Promise {
    label: String,
    state: Mutex<PromiseState>,
    ready: Condvar,
    observed: AtomicBool,
}

impl Promise {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            state: Mutex::new(PromiseState::Pending(Vec::new())),
            ready: Condvar::new(),
            observed: AtomicBool::new(false),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    //Function: settle
    //Purpose: Store the task result and run registered continuations
    //Inputs: result: Settled
    //Returns: bool (false when already settled)
    pub fn settle(&self, result: Settled) -> bool {
        let continuations = {
            let mut state = self.state.lock();
            let PromiseState::Pending(waiting) = &mut *state else {
                return false;
            };
            let waiting = std::mem::take(waiting);
            *state = PromiseState::Settled(result.clone());
            waiting
        };
        self.ready.notify_all();
        trace!(target: "ohscript::task", task = %self.label, ok = result.is_ok(), "promise settled");
        for continuation in continuations {
            continuation(&result);
        }
        true
    }

    /// Block the calling task until the promise settles.
    pub fn wait(&self) -> Settled {
        self.observed.store(true, Ordering::Relaxed);
        let mut state = self.state.lock();
        loop {
            if let PromiseState::Settled(result) = &*state {
                return result.clone();
            }
            self.ready.wait(&mut state);
        }
    }

    /// Run `continuation` on settlement, or right away when already settled.
    pub fn on_settle(&self, continuation: impl FnOnce(&Settled) + Send + 'static) {
        self.observed.store(true, Ordering::Relaxed);
        let settled = {
            let mut state = self.state.lock();
            match &mut *state {
                PromiseState::Pending(waiting) => {
                    waiting.push(Box::new(continuation));
                    return;
                }
                PromiseState::Settled(result) => result.clone(),
            }
        };
        continuation(&settled);
    }
}

impl Drop for Promise {
    fn drop(&mut self) {
        if self.observed.load(Ordering::Relaxed) {
            return;
        }
        if let PromiseState::Settled(Err(panic)) = &*self.state.get_mut() {
            warn!(target: "ohscript::task", task = %self.label, %panic, "task failed and was never awaited");
        }
    }
}

//=====================================================
//            Section 3: Locks
//=====================================================

type ScriptMutex = Arc<ReentrantMutex<()>>;

/// Mutexes behind `lock{}` (shared) and `lock(key){}` (one per key).
#[derive(Default)]
pub struct LockTable {
    global: ScriptMutex,
    keyed: Mutex<HashMap<String, ScriptMutex>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutex(&self, key: Option<&str>) -> ScriptMutex {
        match key {
            None => Arc::clone(&self.global),
            Some(key) => Arc::clone(self.keyed.lock().entry(key.to_string()).or_default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn promise_settles_once() {
        let promise = Promise::new("once");
        assert!(promise.settle(Ok(Value::from(1))));
        assert!(!promise.settle(Ok(Value::from(2))));
        assert_eq!(promise.wait(), Ok(Value::from(1)));
    }

    #[test]
    fn wait_blocks_until_settled_from_another_thread() {
        let promise = Promise::new("cross-thread");
        let settler = Arc::clone(&promise);
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            settler.settle(Ok(Value::from(100)));
        });
        assert_eq!(promise.wait(), Ok(Value::from(100)));
        worker.join().expect("join");
    }

    #[test]
    fn continuation_runs_immediately_when_settled() {
        let promise = Promise::new("settled");
        promise.settle(Err(OhPanic::new(PanicCode::EXPLICIT_PANIC, "boom")));
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        promise.on_settle(move |result| *sink.lock() = Some(result.is_err()));
        assert_eq!(*seen.lock(), Some(true));
    }

    #[test]
    fn keyed_mutexes_are_shared_per_key() {
        let locks = LockTable::new();
        assert!(Arc::ptr_eq(&locks.mutex(Some("a")), &locks.mutex(Some("a"))));
        assert!(!Arc::ptr_eq(&locks.mutex(Some("a")), &locks.mutex(Some("b"))));
        assert!(Arc::ptr_eq(&locks.mutex(None), &locks.mutex(None)));
    }

    #[test]
    fn pool_runs_blocking_tasks() {
        let pool = TaskPool::new(&EngineOptions::default()).expect("pool");
        let promise = Promise::new("pool");
        let settler = Arc::clone(&promise);
        pool.handle().spawn_blocking(move || {
            settler.settle(Ok(Value::from(7)));
        });
        assert_eq!(promise.wait(), Ok(Value::from(7)));
    }
}

//=====================================================
// End of file
//=====================================================
