// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A single long-lived thread that exists only to have tasks posted to it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use super::{set_current_kind, Task, TaskRunner, ThreadKind};

struct Shared {
    queue: Mutex<Vec<Task>>,
    cv: Condvar,
    exit: AtomicBool,
}

/// A dedicated task thread.
///
/// Tasks are drained in LIFO order. Tasks posted here are independent of
/// each other; callers that need FIFO semantics sequence their work at a
/// higher level.
pub struct TaskThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
    name: String,
}

impl TaskThread {
    /// Spawns the thread under the given name.
    pub fn new(name: &str) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Vec::new()),
            cv: Condvar::new(),
            exit: AtomicBool::new(false),
        });
        let worker = shared.clone();
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                set_current_kind(ThreadKind::Task);
                Self::thread_main(&worker);
            })
            .expect("failed to spawn task thread");
        log::trace!("task thread '{name}' started");
        Self {
            shared,
            handle: Some(handle),
            name: name.to_string(),
        }
    }

    fn thread_main(shared: &Shared) {
        loop {
            let task = {
                let mut queue = shared.queue.lock().unwrap();
                loop {
                    if let Some(task) = queue.pop() {
                        break task;
                    }
                    if shared.exit.load(Ordering::Acquire) {
                        return;
                    }
                    queue = shared.cv.wait(queue).unwrap();
                }
            };
            task();
        }
    }

    /// Asks the thread to exit once its queue is empty.
    pub fn post_quit(&self) {
        self.shared.exit.store(true, Ordering::Release);
        self.shared.cv.notify_all();
    }

    /// Joins the thread. Implies [`post_quit`](TaskThread::post_quit).
    pub fn join(&mut self) {
        self.post_quit();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            log::trace!("task thread '{}' joined", self.name);
        }
    }
}

impl TaskRunner for TaskThread {
    fn post_task(&self, task: Task) {
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push(task);
        self.shared.cv.notify_one();
    }
}

impl Drop for TaskThread {
    fn drop(&mut self) {
        self.join();
    }
}
