//! Task registry
//!
//! One OS thread per task. The map lock only guards inserts, removals and
//! flag access; joins always happen with it released so a slow task cannot
//! stall unrelated creates or destroys.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use threadscript_protocol::{TaskField, TaskId, TaskStatus, VarStore};
use threadscript_script_host::{CancellationToken, ScriptConfig, ScriptHost, ScriptStatus};

use crate::sync::MutexExt;
use crate::{EngineError, HostHandler};

/// Set once a task thread has finished, however many callers are waiting
#[derive(Default)]
struct ExitSignal {
    done: Mutex<bool>,
    cond: Condvar,
}

impl ExitSignal {
    fn notify_exited(&self) {
        *self.done.lock_or_recover() = true;
        self.cond.notify_all();
    }

    fn wait_until_exited(&self) {
        let mut done = self.done.lock_or_recover();
        while !*done {
            done = self.cond.wait(done).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Raises the exit signal when dropped, so a panicking task still releases waiters
struct ExitGuard(Arc<ExitSignal>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.notify_exited();
    }
}

struct TaskEntry {
    /// Taken by whichever caller joins first
    thread: Option<JoinHandle<()>>,
    exited: Arc<ExitSignal>,
    cancel: CancellationToken,
    started: Instant,
}

pub struct TaskRegistry {
    config: ScriptConfig,
    store: Arc<dyn VarStore>,
    handler: HostHandler,
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    next_id: AtomicU64,
    count: AtomicI64,
}

impl TaskRegistry {
    pub fn new(config: ScriptConfig, store: Arc<dyn VarStore>, handler: HostHandler) -> Self {
        Self {
            config,
            store,
            handler,
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            count: AtomicI64::new(0),
        }
    }

    /// Start `source` on a new thread and return its id without waiting
    pub fn create(&self, source: &str) -> Result<TaskId, EngineError> {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let host = ScriptHost::new(self.config.clone());
        let cancel = host.cancellation_token();

        let source = source.to_string();
        let store = Arc::clone(&self.store);
        let handler = self.handler.clone();
        let exited = Arc::new(ExitSignal::default());
        let guard = ExitGuard(Arc::clone(&exited));
        let thread = std::thread::Builder::new()
            .name(format!("task-{id}"))
            .spawn(move || {
                let _guard = guard;
                let status = host.run(id, &source, |request| handler.handle(request));
                store.set(&id.key(TaskField::Status), TaskStatus::Completed.as_str());
                match status {
                    ScriptStatus::Error { .. } => {
                        tracing::info!(task_id = id.0, "Task completed after script error");
                    }
                    _ => tracing::info!(task_id = id.0, "Task completed"),
                }
            })
            .map_err(EngineError::Spawn)?;

        // Only a destroy can end the thread, and nobody has the id yet
        self.store
            .set(&id.key(TaskField::Status), TaskStatus::Running.as_str());
        self.tasks.lock_or_recover().insert(
            id,
            TaskEntry {
                thread: Some(thread),
                exited,
                cancel,
                started: Instant::now(),
            },
        );

        tracing::info!(task_id = id.0, "Task created");
        Ok(id)
    }

    /// Cancel a task, wait for its thread to exit, then forget it.
    ///
    /// Returns false if no such task exists. Concurrent destroys and waits
    /// all block until the thread is gone, whichever of them joins it.
    pub fn destroy(&self, id: TaskId) -> bool {
        let (thread, exited) = {
            let mut tasks = self.tasks.lock_or_recover();
            let Some(entry) = tasks.get_mut(&id) else {
                return false;
            };
            entry.cancel.cancel();
            (entry.thread.take(), Arc::clone(&entry.exited))
        };

        Self::join(id, thread, &exited);

        if let Some(entry) = self.tasks.lock_or_recover().remove(&id) {
            tracing::info!(
                task_id = id.0,
                uptime_ms = entry.started.elapsed().as_millis() as u64,
                "Task destroyed"
            );
        }
        true
    }

    /// Block until the task's thread exits.
    ///
    /// The timeout is accepted but not enforced; since tasks idle until
    /// cancelled this only returns once another caller destroys the task.
    pub fn wait(&self, id: TaskId, _timeout: Duration) -> bool {
        let (thread, exited) = match self.tasks.lock_or_recover().get_mut(&id) {
            Some(entry) => (entry.thread.take(), Arc::clone(&entry.exited)),
            None => return false,
        };
        Self::join(id, thread, &exited);
        true
    }

    fn join(id: TaskId, thread: Option<JoinHandle<()>>, exited: &ExitSignal) {
        if let Some(thread) = thread {
            if thread.join().is_err() {
                tracing::warn!(task_id = id.0, "Task thread panicked");
            }
        }
        exited.wait_until_exited();
    }

    /// Accepted for compatibility; tasks cannot actually be suspended
    pub fn pause(&self, id: TaskId) -> Result<(), EngineError> {
        self.require(id)?;
        tracing::debug!(task_id = id.0, "Pause requested");
        Ok(())
    }

    /// Accepted for compatibility; see [`TaskRegistry::pause`]
    pub fn resume(&self, id: TaskId) -> Result<(), EngineError> {
        self.require(id)?;
        tracing::debug!(task_id = id.0, "Resume requested");
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.lock_or_recover().contains_key(&id)
    }

    /// Ids of every live task, ascending
    #[must_use]
    pub fn ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<_> = self.tasks.lock_or_recover().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Diagnostic counter, driven by the callers of create and destroy
    #[must_use]
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn increment_count(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement_count(&self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
    }

    fn require(&self, id: TaskId) -> Result<(), EngineError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(EngineError::TaskNotFound(id))
        }
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        for id in self.ids() {
            self.destroy(id);
        }
    }
}
