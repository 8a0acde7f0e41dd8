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

//! The blob: a ref-counted, waitable byte container.
//!
//! A blob is the unit of asynchronous content transfer. Producers create a
//! pending blob, hand out handles, and later [`set`](Blob::set) the
//! contents, which resolves every listener. Contents are write-once: after
//! resolution the bytes are immutable for the blob's remaining lifetime.

use std::sync::{Arc, OnceLock};

use crate::future::Promisable;
use crate::task::TaskRunner;

/// Shared-ownership handle to a [`Blob`].
pub type BlobHandle = Arc<Blob>;

enum BlobData {
    Bytes(Box<[u8]>),
    Text(String),
}

impl BlobData {
    fn as_slice(&self) -> &[u8] {
        match self {
            BlobData::Bytes(b) => b,
            BlobData::Text(s) => s.as_bytes(),
        }
    }
}

/// A waitable byte container. See the module docs.
pub struct Blob {
    data: OnceLock<BlobData>,
    watch: Promisable<BlobHandle>,
}

impl Blob {
    /// Creates an unresolved blob whose contents arrive later via
    /// [`set`](Blob::set).
    pub fn pending() -> BlobHandle {
        Arc::new(Blob {
            data: OnceLock::new(),
            watch: Promisable::new(),
        })
    }

    /// Creates a resolved blob owning `bytes`.
    pub fn from_vec(bytes: Vec<u8>) -> BlobHandle {
        let data = OnceLock::new();
        let _ = data.set(BlobData::Bytes(bytes.into_boxed_slice()));
        Arc::new(Blob {
            data,
            watch: Promisable::new_resolved(false),
        })
    }

    /// Creates a resolved blob wrapping a string without copying it.
    pub fn from_string(s: String) -> BlobHandle {
        let data = OnceLock::new();
        let _ = data.set(BlobData::Text(s));
        Arc::new(Blob {
            data,
            watch: Promisable::new_resolved(false),
        })
    }

    /// Creates a resolved empty blob.
    pub fn empty() -> BlobHandle {
        Self::from_vec(Vec::new())
    }

    /// Sets the contents and resolves the blob.
    ///
    /// Calling this on an already-resolved blob is a programming error.
    pub fn set(self: &Arc<Self>, bytes: Vec<u8>, error: bool) {
        let inserted = self.data.set(BlobData::Bytes(bytes.into_boxed_slice()));
        debug_assert!(inserted.is_ok(), "blob contents set twice");
        self.watch.resolve(self, error);
    }

    /// Copies `bytes` into the blob and resolves it.
    pub fn copy_from(self: &Arc<Self>, bytes: &[u8], error: bool) {
        self.set(bytes.to_vec(), error);
    }

    /// Sets string contents and resolves the blob.
    pub fn set_str(self: &Arc<Self>, s: &str, error: bool) {
        let inserted = self.data.set(BlobData::Text(s.to_string()));
        debug_assert!(inserted.is_ok(), "blob contents set twice");
        self.watch.resolve(self, error);
    }

    /// The contents. Empty until the blob resolves.
    pub fn data(&self) -> &[u8] {
        self.data.get().map(BlobData::as_slice).unwrap_or(&[])
    }

    /// Content length in bytes.
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Whether the contents are empty (also true before resolution).
    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    /// The contents as a string, with invalid UTF-8 replaced.
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(self.data()).into_owned()
    }

    /// Attaches a listener fired with a handle to this blob on resolution.
    pub fn then(self: &Arc<Self>, f: impl FnOnce(BlobHandle, bool) + Send + 'static) {
        self.watch.then(self, f);
    }

    /// Attaches a listener fired as a task posted to `runner`.
    pub fn then_on(
        self: &Arc<Self>,
        runner: Arc<dyn TaskRunner>,
        f: impl FnOnce(BlobHandle, bool) + Send + 'static,
    ) {
        self.watch.then_on(self, runner, f);
    }

    /// Blocks until the blob resolves.
    pub fn wait(&self) {
        self.watch.wait();
    }

    /// Whether the blob has resolved.
    pub fn resolved(&self) -> bool {
        self.watch.is_resolved()
    }

    /// Whether the blob resolved with the error flag.
    pub fn errored(&self) -> bool {
        self.watch.errored()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn from_vec_is_resolved() {
        let b = Blob::from_vec(vec![1, 2, 3]);
        assert!(b.resolved());
        assert!(!b.errored());
        assert_eq!(b.data(), &[1, 2, 3]);
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn pending_blob_is_empty_until_set() {
        let b = Blob::pending();
        assert!(!b.resolved());
        assert_eq!(b.data(), &[] as &[u8]);
        b.set(vec![9], false);
        assert!(b.resolved());
        assert_eq!(b.data(), &[9]);
    }

    #[test]
    fn listeners_fire_once_each() {
        let b = Blob::pending();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            b.then(move |blob, ok| {
                assert!(ok);
                assert_eq!(blob.len(), 5);
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        b.set_str("hello", false);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        // A listener attached after resolution fires immediately.
        let count2 = count.clone();
        b.then(move |_, _| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn error_flag_reaches_listeners() {
        let b = Blob::pending();
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        b.then(move |_, ok| {
            *seen2.lock().unwrap() = Some(ok);
        });
        b.set(Vec::new(), true);
        assert_eq!(*seen.lock().unwrap(), Some(false));
        assert!(b.errored());
    }

    #[test]
    fn wait_blocks_until_set() {
        let b = Blob::pending();
        let b2 = b.clone();
        let waiter = std::thread::spawn(move || {
            b2.wait();
            b2.as_string()
        });
        std::thread::sleep(std::time::Duration::from_millis(10));
        b.set_str("done", false);
        assert_eq!(waiter.join().unwrap(), "done");
    }

    #[test]
    fn string_contents_round_trip() {
        let b = Blob::from_string("kyma".to_string());
        assert_eq!(b.as_string(), "kyma");
        assert_eq!(b.data(), b"kyma");
    }
}
