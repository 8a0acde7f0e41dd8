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

//! The I/O completion pool.
//!
//! N threads drain a shared channel of submitted jobs: file transfers
//! posted by the file layer, and plain tasks for which this pool is the
//! completion site. This is the default executor for an [`AsyncOp`] with
//! no explicit runner.
//!
//! [`AsyncOp`]: crate::op::AsyncOp

use std::sync::Mutex;
use std::thread::JoinHandle;

use kyma_core::task::{set_current_kind, Task, TaskRunner, ThreadKind};

enum Job {
    Run(Task),
    Quit,
}

/// A fixed-size pool of I/O completion threads.
pub struct IoPool {
    tx: flume::Sender<Job>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl IoPool {
    /// Spawns `threads` completion threads named after `name`.
    pub fn new(threads: usize, name: &str) -> Self {
        let (tx, rx) = flume::unbounded::<Job>();
        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{name}-{i}"))
                .spawn(move || {
                    set_current_kind(ThreadKind::Io);
                    while let Ok(job) = rx.recv() {
                        match job {
                            Job::Run(task) => task(),
                            Job::Quit => break,
                        }
                    }
                })
                .expect("failed to spawn io pool thread");
            handles.push(handle);
        }
        log::info!("io pool '{name}' started with {threads} threads");
        Self {
            tx,
            threads: Mutex::new(handles),
        }
    }

    /// Stops the pool: every queued job still runs, then the threads exit
    /// and are joined.
    pub fn shutdown(&self) {
        let mut threads = self.threads.lock().unwrap();
        for _ in threads.iter() {
            // Quit markers queue behind outstanding work.
            let _ = self.tx.send(Job::Quit);
        }
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl TaskRunner for IoPool {
    fn post_task(&self, task: Task) {
        if self.tx.send(Job::Run(task)).is_err() {
            log::error!("task posted to a stopped io pool");
        }
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
