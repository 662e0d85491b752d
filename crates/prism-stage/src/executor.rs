//! Single-threaded serialized executor.
//!
//! Every public stage operation is posted here, which gives each channel a
//! total order over its observable mutations. Two priority classes exist:
//! all pending `High` tasks drain before the next `Normal` task (frame
//! production runs at `Normal`, mutators at `High`, so a queued tick never
//! starves a transform but also never interleaves with one).

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use prism_core::{PrismError, PrismResult};

/// Task priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    High,
}

type Task = Box<dyn FnOnce() + Send>;

struct Queues {
    high: VecDeque<Task>,
    normal: VecDeque<Task>,
    shutdown: bool,
}

struct Shared {
    queues: Mutex<Queues>,
    available: Condvar,
}

/// A value completed when its posted closure has run on the executor.
pub struct Pending<T> {
    state: PendingState<T>,
}

enum PendingState<T> {
    Ready(PrismResult<T>),
    Waiting(mpsc::Receiver<PrismResult<T>>),
}

impl<T> Pending<T> {
    /// An already-completed future.
    pub fn ready(result: PrismResult<T>) -> Self {
        Self {
            state: PendingState::Ready(result),
        }
    }

    /// Block until the closure has run and return its result. A future is
    /// never abandoned: a worker lost before completion yields
    /// `ExecutorShutdown`.
    pub fn get(self) -> PrismResult<T> {
        match self.state {
            PendingState::Ready(result) => result,
            PendingState::Waiting(rx) => rx.recv().unwrap_or(Err(PrismError::ExecutorShutdown)),
        }
    }
}

/// A single worker thread draining a dual-priority FIFO queue.
pub struct Executor {
    shared: Arc<Shared>,
    worker_id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Executor {
    pub fn new(name: impl Into<String>) -> Self {
        let shared = Arc::new(Shared {
            queues: Mutex::new(Queues {
                high: VecDeque::new(),
                normal: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || Self::run(worker_shared))
            .unwrap_or_else(|e| panic!("failed to spawn executor thread: {e}"));
        let worker_id = handle.thread().id();

        Self {
            shared,
            worker_id,
            handle: Mutex::new(Some(handle)),
        }
    }

    fn run(shared: Arc<Shared>) {
        loop {
            let task = {
                let mut queues = shared.queues.lock();
                loop {
                    if let Some(task) = queues.high.pop_front() {
                        break Some(task);
                    }
                    if let Some(task) = queues.normal.pop_front() {
                        break Some(task);
                    }
                    if queues.shutdown {
                        break None;
                    }
                    shared.available.wait(&mut queues);
                }
            };
            match task {
                Some(task) => task(),
                None => return,
            }
        }
    }

    /// Post a closure; the returned future completes when it has run.
    pub fn begin_invoke<T, F>(&self, priority: Priority, f: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce() -> PrismResult<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let task: Task = Box::new(move || {
            let _ = tx.send(f());
        });

        let mut queues = self.shared.queues.lock();
        if queues.shutdown {
            return Pending::ready(Err(PrismError::ExecutorShutdown));
        }
        match priority {
            Priority::High => queues.high.push_back(task),
            Priority::Normal => queues.normal.push_back(task),
        }
        drop(queues);
        self.available_notify();

        Pending {
            state: PendingState::Waiting(rx),
        }
    }

    /// Post a closure and block the caller until it completes. Called from
    /// the worker itself, the closure runs inline to avoid deadlock.
    pub fn invoke<T, F>(&self, priority: Priority, f: F) -> PrismResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> PrismResult<T> + Send + 'static,
    {
        if thread::current().id() == self.worker_id {
            return f();
        }
        self.begin_invoke(priority, f).get()
    }

    /// Whether the calling thread is the executor's worker.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    fn available_notify(&self) {
        self.shared.available.notify_one();
    }
}

impl Drop for Executor {
    /// Shutdown drains everything already queued, then stops the worker.
    fn drop(&mut self) {
        {
            let mut queues = self.shared.queues.lock();
            queues.shutdown = true;
        }
        self.shared.available.notify_all();
        if thread::current().id() == self.worker_id {
            return;
        }
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_invoke_returns_value() {
        let executor = Executor::new("test");
        let out = executor.invoke(Priority::Normal, || Ok(21 * 2));
        assert_eq!(out.unwrap(), 42);
    }

    #[test]
    fn test_high_drains_before_normal() {
        let executor = Executor::new("test");
        let order = Arc::new(Mutex::new(Vec::new()));

        // Park the worker so both classes queue up behind one task.
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let worker_gate = gate.clone();
        let parked = executor.begin_invoke(Priority::High, move || {
            let (lock, cvar) = &*worker_gate;
            let mut open = lock.lock();
            while !*open {
                cvar.wait(&mut open);
            }
            Ok(())
        });

        let mut pendings = Vec::new();
        for i in 0..3 {
            let order = order.clone();
            pendings.push(executor.begin_invoke(Priority::Normal, move || {
                order.lock().push(format!("normal-{i}"));
                Ok(())
            }));
        }
        for i in 0..3 {
            let order = order.clone();
            pendings.push(executor.begin_invoke(Priority::High, move || {
                order.lock().push(format!("high-{i}"));
                Ok(())
            }));
        }

        {
            let (lock, cvar) = &*gate;
            *lock.lock() = true;
            cvar.notify_all();
        }
        parked.get().unwrap();
        for pending in pendings {
            pending.get().unwrap();
        }

        let seen = order.lock().clone();
        assert_eq!(
            seen,
            vec!["high-0", "high-1", "high-2", "normal-0", "normal-1", "normal-2"]
        );
    }

    #[test]
    fn test_reentrant_invoke_runs_inline() {
        let executor = Arc::new(Executor::new("test"));
        let inner = executor.clone();
        let out = executor.invoke(Priority::Normal, move || {
            // Would deadlock if this queued instead of running inline.
            inner.invoke(Priority::High, || Ok(7))
        });
        assert_eq!(out.unwrap(), 7);
    }

    #[test]
    fn test_shutdown_drains_queued_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let executor = Executor::new("test");
            for _ in 0..20 {
                let counter = counter.clone();
                let _ = executor.begin_invoke(Priority::Normal, move || {
                    thread::sleep(Duration::from_millis(1));
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_post_after_shutdown_errors() {
        let executor = Executor::new("test");
        {
            let mut queues = executor.shared.queues.lock();
            queues.shutdown = true;
        }
        let pending = executor.begin_invoke(Priority::High, || Ok(()));
        assert!(matches!(pending.get(), Err(PrismError::ExecutorShutdown)));
    }

    #[test]
    fn test_error_carried_through_future() {
        let executor = Executor::new("test");
        let pending =
            executor.begin_invoke(Priority::High, || Err::<(), _>(PrismError::invalid_op("nope")));
        assert!(matches!(pending.get(), Err(PrismError::InvalidOperation(_))));
    }
}
