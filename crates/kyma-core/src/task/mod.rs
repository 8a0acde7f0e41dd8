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

//! Task runners and thread identity.
//!
//! A [`TaskRunner`] is anywhere a closure can be posted for later execution:
//! the host message loop, a dedicated [`TaskThread`], or the I/O completion
//! pool. Runners provide temporal ordering only within themselves; nothing
//! is implied across runners.
//!
//! Every runtime-owned thread records a [`ThreadKind`] in a thread-local at
//! spawn. The kind gates operations that would be unsound on certain
//! threads, most importantly blocking on a future from a completion thread.

mod task_thread;

pub use self::task_thread::TaskThread;

use std::cell::Cell;

/// A boxed unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Something tasks can be posted to for later execution.
///
/// Implementations must execute every posted task exactly once. The order of
/// execution is implementation-defined; callers that need ordering impose it
/// above this interface.
pub trait TaskRunner: Send + Sync {
    /// Enqueues `task` for execution on this runner.
    fn post_task(&self, task: Task);
}

/// The role of the current thread within the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadKind {
    /// The host thread running the message loop.
    Main,
    /// An I/O completion thread. Must never block on a future.
    Io,
    /// A dedicated task thread.
    Task,
    /// A worker-pool thread.
    Pool,
    /// Any other thread, including ones the runtime did not create.
    User,
}

impl ThreadKind {
    /// Whether this kind of thread may block on futures and events.
    ///
    /// Completion threads may not: a blocked completion thread can deadlock
    /// the very I/O it is waiting on.
    pub fn may_block(self) -> bool {
        !matches!(self, ThreadKind::Io)
    }
}

thread_local! {
    static CURRENT_KIND: Cell<ThreadKind> = const { Cell::new(ThreadKind::User) };
}

/// Records the kind of the current thread. Called once at thread entry.
pub fn set_current_kind(kind: ThreadKind) {
    CURRENT_KIND.with(|k| k.set(kind));
}

/// Returns the kind recorded for the current thread.
pub fn current_kind() -> ThreadKind {
    CURRENT_KIND.with(|k| k.get())
}

/// Debug-asserts that the current thread is allowed to block.
pub fn assert_blocking_allowed() {
    debug_assert!(
        current_kind().may_block(),
        "blocking wait on a {:?} thread",
        current_kind()
    );
}
