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

//! The asynchronous operation descriptor.
//!
//! An [`AsyncOp`] is handed by value to an I/O primitive, which performs
//! the transfer, fills in the result fields and fires the completion
//! exactly once. The op owns its buffer for the duration of the operation;
//! completions receive the finished op back, results and buffer included.

use std::fmt;
use std::ops::Range;
use std::sync::{Arc, Mutex};

use kyma_core::blob::BlobHandle;
use kyma_core::sync::OneShotEvent;
use kyma_core::task::TaskRunner;

use crate::buffer::IoBuffer;

/// Logical offset meaning "append to the end of the file".
pub const APPEND_OFFSET: u64 = u64::MAX;

/// Normalized I/O error carried on a completed [`AsyncOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// The operation ran past the end of the file.
    Eof,
    /// The path does not exist.
    NotFound,
    /// The caller may not access the file this way.
    PermissionDenied,
    /// The containing device is out of space.
    DeviceFull,
    /// The file kind does not support the operation.
    Unsupported,
    /// Any other platform error, carried as the raw OS code.
    Os(i32),
}

impl IoError {
    /// Normalizes a platform error.
    pub fn from_std(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => IoError::NotFound,
            ErrorKind::PermissionDenied => IoError::PermissionDenied,
            ErrorKind::UnexpectedEof => IoError::Eof,
            _ => match err.raw_os_error() {
                // ENOSPC
                Some(28) => IoError::DeviceFull,
                Some(code) => IoError::Os(code),
                None => IoError::Os(-1),
            },
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::Eof => write!(f, "end of file"),
            IoError::NotFound => write!(f, "not found"),
            IoError::PermissionDenied => write!(f, "permission denied"),
            IoError::DeviceFull => write!(f, "device full"),
            IoError::Unsupported => write!(f, "operation not supported"),
            IoError::Os(code) => write!(f, "os error {code}"),
        }
    }
}

impl std::error::Error for IoError {}

type Completion = Box<dyn FnOnce(AsyncOp) + Send>;

/// Descriptor for one scatter/gather asynchronous transfer.
pub struct AsyncOp {
    /// The memory the transfer reads from or writes into.
    pub buffer: Option<IoBuffer>,
    /// Segment ranges within the buffer's window. Empty means one segment
    /// covering the whole window; explicit segments must be ordered and
    /// dense.
    pub segments: Vec<Range<usize>>,
    /// Logical file offset, or [`APPEND_OFFSET`].
    pub offset: u64,
    /// Held alive until after the completion runs.
    pub hold: Option<BlobHandle>,
    /// Set by the I/O layer: the failure, if any.
    pub err: Option<IoError>,
    /// Set by the I/O layer: bytes actually transferred.
    pub transferred: usize,

    completion: Option<Completion>,
    runner: Option<Arc<dyn TaskRunner>>,
}

impl AsyncOp {
    /// An op with no buffer attached.
    pub fn new() -> Self {
        Self {
            buffer: None,
            segments: Vec::new(),
            offset: 0,
            hold: None,
            err: None,
            transferred: 0,
            completion: None,
            runner: None,
        }
    }

    /// An op that will transfer through `buffer`'s window.
    pub fn with_buffer(buffer: IoBuffer) -> Self {
        let mut op = Self::new();
        op.buffer = Some(buffer);
        op
    }

    /// An op sourcing a write from the buffer's whole valid range.
    /// `None` when the valid range is empty.
    pub fn for_max_read(buffer: IoBuffer) -> Option<Self> {
        if buffer.valid_len() == 0 {
            return None;
        }
        Some(Self::with_buffer(buffer))
    }

    /// An op filling the buffer's whole free range.
    /// `None` when the free range is empty.
    pub fn for_max_write(buffer: IoBuffer) -> Option<Self> {
        if buffer.free_len() == 0 {
            return None;
        }
        Some(Self::with_buffer(buffer))
    }

    /// An op for a synchronous shim: the returned [`SyncWaiter`] blocks
    /// until completion and hands the finished op back.
    pub fn for_sync_io(buffer: Option<IoBuffer>) -> (Self, SyncWaiter) {
        let mut op = Self::new();
        op.buffer = buffer;
        let ev = Arc::new(OneShotEvent::new());
        let slot = Arc::new(Mutex::new(None));
        let signal = ev.clone();
        let fill = slot.clone();
        op.set_completion(
            move |done| {
                *fill.lock().unwrap() = Some(done);
                signal.signal();
            },
            None,
        );
        (op, SyncWaiter { ev, slot })
    }

    /// Installs the completion, optionally on a runner. With a runner set,
    /// the completion always fires as a posted task on it.
    pub fn set_completion(
        &mut self,
        f: impl FnOnce(AsyncOp) + Send + 'static,
        runner: Option<Arc<dyn TaskRunner>>,
    ) {
        self.completion = Some(Box::new(f));
        self.runner = runner;
    }

    /// Completes the op successfully with `n` bytes transferred.
    pub fn complete_ok(mut self, n: usize) {
        self.err = None;
        self.transferred = n;
        self.complete();
    }

    /// Completes the op with an error.
    pub fn complete_err(mut self, err: IoError) {
        self.err = Some(err);
        self.transferred = 0;
        self.complete();
    }

    /// Fires the completion. Without one, the op (and anything it holds)
    /// is simply dropped.
    pub fn complete(mut self) {
        let completion = self.completion.take();
        let runner = self.runner.take();
        match (completion, runner) {
            (Some(f), Some(runner)) => runner.post_task(Box::new(move || f(self))),
            (Some(f), None) => f(self),
            (None, _) => {}
        }
    }
}

impl Default for AsyncOp {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocks for the completion of a sync-shim op.
pub struct SyncWaiter {
    ev: Arc<OneShotEvent>,
    slot: Arc<Mutex<Option<AsyncOp>>>,
}

impl SyncWaiter {
    /// Waits for the op to complete and returns it with its results.
    pub fn wait(self) -> AsyncOp {
        self.ev.wait();
        self.slot
            .lock()
            .unwrap()
            .take()
            .expect("sync op completed without delivering itself")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyma_core::blob::Blob;
    use kyma_core::task::TaskThread;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn completion_fires_inline_without_runner() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let mut op = AsyncOp::new();
        op.set_completion(
            move |op| {
                assert_eq!(op.transferred, 12);
                assert!(op.err.is_none());
                fired2.fetch_add(1, Ordering::SeqCst);
            },
            None,
        );
        op.complete_ok(12);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn completion_with_runner_is_posted() {
        let (tx, rx) = std::sync::mpsc::channel();
        let runner: Arc<dyn TaskRunner> = Arc::new(TaskThread::new("op-completions"));
        let mut op = AsyncOp::new();
        op.set_completion(
            move |op| {
                tx.send((op.err, kyma_core::task::current_kind())).unwrap();
            },
            Some(runner),
        );
        op.complete_err(IoError::Eof);
        let (err, kind) = rx.recv().unwrap();
        assert_eq!(err, Some(IoError::Eof));
        assert_eq!(kind, kyma_core::task::ThreadKind::Task);
    }

    #[test]
    fn sync_waiter_returns_the_finished_op() {
        let (mut op, waiter) = AsyncOp::for_sync_io(Some(IoBuffer::from_vec(b"data".to_vec())));
        op.offset = 5;
        std::thread::spawn(move || op.complete_ok(4));
        let done = waiter.wait();
        assert_eq!(done.transferred, 4);
        assert_eq!(done.offset, 5);
        assert_eq!(done.buffer.unwrap().valid(), b"data");
    }

    #[test]
    fn hold_is_released_after_completion() {
        let blob = Blob::from_vec(vec![1]);
        let weak = Arc::downgrade(&blob);
        let mut op = AsyncOp::new();
        op.hold = Some(blob);
        op.set_completion(|_op| {}, None);
        op.complete_ok(0);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn max_read_requires_valid_bytes() {
        assert!(AsyncOp::for_max_read(IoBuffer::empty_for_fill(4)).is_none());
        assert!(AsyncOp::for_max_read(IoBuffer::from_vec(vec![1])).is_some());
        assert!(AsyncOp::for_max_write(IoBuffer::from_vec(vec![1])).is_none());
        assert!(AsyncOp::for_max_write(IoBuffer::empty_for_fill(4)).is_some());
    }

    #[test]
    fn error_normalization() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(IoError::from_std(&err), IoError::NotFound);
        let err = std::io::Error::from_raw_os_error(28);
        assert_eq!(IoError::from_std(&err), IoError::DeviceFull);
    }
}
