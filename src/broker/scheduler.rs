//! Cooperative task queue.
//!
//! Every deferred step of an operation (the first provider call, auto-split
//! chunk requests, idle-relayed deliveries, augmenting resolves) is posted
//! here and runs in FIFO order when the owner drains the queue. Draining is
//! done by one thread at a time, either blocking ([`Scheduler::block_until`])
//! or from async code ([`Scheduler::drive_until`]). Tasks may be posted from
//! any thread.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    tasks: VecDeque<Task>,
}

pub struct Scheduler {
    queue: Mutex<Queue>,
    ready: Condvar,
    notify: Notify,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                tasks: VecDeque::new(),
            }),
            ready: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Queue `task` behind everything already posted.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.lock().tasks.push_back(Box::new(task));
        self.ready.notify_all();
        self.notify.notify_one();
    }

    /// Wake any thread blocked in [`Scheduler::block_until`] or
    /// [`Scheduler::drive_until`] so it re-checks its condition.
    pub fn wake(&self) {
        // Taking the lock orders this wake after a waiter's condition check.
        drop(self.queue.lock());
        self.ready.notify_all();
        self.notify.notify_one();
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().tasks.len()
    }

    /// Run the oldest queued task. Returns `false` when the queue was empty.
    pub fn run_once(&self) -> bool {
        let task = self.queue.lock().tasks.pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks until the queue is empty, including tasks posted meanwhile.
    ///
    /// Returns how many tasks ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
        }
        ran
    }

    /// Drain the queue until `done` holds, blocking the calling thread while
    /// the queue is empty.
    ///
    /// Whoever makes `done` true must call [`Scheduler::wake`] afterwards.
    /// Returns `false` if `timeout` elapsed first.
    pub fn block_until<F>(&self, done: F, timeout: Option<Duration>) -> bool
    where
        F: Fn() -> bool,
    {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            self.run_pending();
            if done() {
                return true;
            }

            let mut queue = self.queue.lock();
            while queue.tasks.is_empty() && !done() {
                match deadline {
                    Some(deadline) => {
                        if self.ready.wait_until(&mut queue, deadline).timed_out() {
                            return done();
                        }
                    }
                    None => self.ready.wait(&mut queue),
                }
            }
        }
    }

    /// Async counterpart of [`Scheduler::block_until`], without a timeout.
    pub async fn drive_until<F>(&self, done: F)
    where
        F: Fn() -> bool,
    {
        loop {
            self.run_pending();
            if done() {
                return;
            }
            let notified = self.notify.notified();
            if self.pending() == 0 && !done() {
                notified.await;
            }
        }
    }
}
