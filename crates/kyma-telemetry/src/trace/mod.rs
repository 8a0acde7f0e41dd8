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

//! Trace event recording.
//!
//! [`init`] installs the process-wide file sink; [`shutdown`] flushes and
//! tears it down. In between, the recording functions are callable from
//! any thread and become no-ops when no sink is installed. Each thread
//! accumulates records into its own chunk, flushed when full and on
//! thread exit.

mod sink;

pub use sink::TraceFileSink;

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use crossbeam_channel::Sender;

use kyma_core::clock;

/// Records per chunk before an automatic flush.
const CHUNK_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub(crate) enum TraceRecord {
    Begin {
        name: &'static str,
        cat: &'static str,
        ts: u64,
    },
    End {
        ts: u64,
    },
    Instant {
        name: &'static str,
        cat: &'static str,
        ts: u64,
    },
    AsyncBegin {
        name: &'static str,
        cat: &'static str,
        id: u64,
        ts: u64,
    },
    AsyncEnd {
        name: &'static str,
        cat: &'static str,
        id: u64,
        ts: u64,
    },
    AsyncInstant {
        name: &'static str,
        cat: &'static str,
        id: u64,
        ts: u64,
    },
    ObjectNew {
        name: &'static str,
        id: u64,
        ts: u64,
    },
    ObjectDestroy {
        name: &'static str,
        id: u64,
        ts: u64,
    },
    ObjectSnapshot {
        name: &'static str,
        id: u64,
        ts: u64,
        values: Vec<(&'static str, i64)>,
    },
    Meta {
        name: &'static str,
        value: String,
    },
    Counter {
        name: &'static str,
        ts: u64,
        values: Vec<(&'static str, i64)>,
    },
}

#[derive(Debug)]
pub(crate) struct TraceChunk {
    pub pid: u32,
    pub tid: u64,
    pub records: Vec<TraceRecord>,
}

static ENABLED: AtomicBool = AtomicBool::new(false);
static SINK: RwLock<Option<Sender<TraceChunk>>> = RwLock::new(None);
static SINK_THREAD: Mutex<Option<std::thread::JoinHandle<()>>> = Mutex::new(None);
static NEXT_TID: AtomicU64 = AtomicU64::new(1);

struct Collector {
    tid: u64,
    records: Vec<TraceRecord>,
}

impl Collector {
    fn new() -> Self {
        Self {
            tid: NEXT_TID.fetch_add(1, Ordering::Relaxed),
            records: Vec::with_capacity(CHUNK_CAPACITY),
        }
    }

    fn push(&mut self, record: TraceRecord) {
        self.records.push(record);
        if self.records.len() >= CHUNK_CAPACITY {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.records.is_empty() {
            return;
        }
        let chunk = TraceChunk {
            pid: std::process::id(),
            tid: self.tid,
            records: std::mem::take(&mut self.records),
        };
        if let Some(tx) = SINK.read().unwrap().as_ref() {
            let _ = tx.send(chunk);
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.flush();
    }
}

thread_local! {
    static COLLECTOR: RefCell<Collector> = RefCell::new(Collector::new());
}

fn record(record: TraceRecord) {
    if !ENABLED.load(Ordering::Relaxed) {
        return;
    }
    COLLECTOR.with(|collector| collector.borrow_mut().push(record));
}

fn now() -> u64 {
    clock::update_time()
}

/// Installs the process-wide trace file sink.
///
/// # Errors
/// Fails when the trace file cannot be created.
pub fn init(path: &str) -> std::io::Result<()> {
    let sink = TraceFileSink::create(path)?;
    let (tx, handle) = sink.into_parts();
    *SINK.write().unwrap() = Some(tx);
    *SINK_THREAD.lock().unwrap() = Some(handle);
    ENABLED.store(true, Ordering::Release);
    log::info!("trace file sink installed at {path}");
    Ok(())
}

/// Flushes the calling thread and tears the sink down, completing the
/// trace file.
pub fn shutdown() {
    ENABLED.store(false, Ordering::Release);
    flush_thread();
    // Dropping the sender stops the writer thread once it has drained.
    *SINK.write().unwrap() = None;
    if let Some(handle) = SINK_THREAD.lock().unwrap().take() {
        let _ = handle.join();
    }
}

/// Ships the calling thread's pending records to the sink.
pub fn flush_thread() {
    COLLECTOR.with(|collector| collector.borrow_mut().flush());
}

/// Opens a duration slice on the calling thread.
pub fn duration_begin(name: &'static str, cat: &'static str) {
    record(TraceRecord::Begin {
        name,
        cat,
        ts: now(),
    });
}

/// Closes the innermost open duration slice.
pub fn duration_end() {
    record(TraceRecord::End { ts: now() });
}

/// A point event.
pub fn instant(name: &'static str, cat: &'static str) {
    record(TraceRecord::Instant {
        name,
        cat,
        ts: now(),
    });
}

/// Opens an async span correlated by `id`.
pub fn async_begin(name: &'static str, cat: &'static str, id: u64) {
    record(TraceRecord::AsyncBegin {
        name,
        cat,
        id,
        ts: now(),
    });
}

/// Closes an async span.
pub fn async_end(name: &'static str, cat: &'static str, id: u64) {
    record(TraceRecord::AsyncEnd {
        name,
        cat,
        id,
        ts: now(),
    });
}

/// A point event inside an async span.
pub fn async_instant(name: &'static str, cat: &'static str, id: u64) {
    record(TraceRecord::AsyncInstant {
        name,
        cat,
        id,
        ts: now(),
    });
}

/// Records the creation of a traced object.
pub fn object_new(name: &'static str, id: u64) {
    record(TraceRecord::ObjectNew {
        name,
        id,
        ts: now(),
    });
}

/// Records the destruction of a traced object.
pub fn object_destroy(name: &'static str, id: u64) {
    record(TraceRecord::ObjectDestroy {
        name,
        id,
        ts: now(),
    });
}

/// Snapshots named values of a traced object.
pub fn object_snapshot(name: &'static str, id: u64, values: &[(&'static str, i64)]) {
    record(TraceRecord::ObjectSnapshot {
        name,
        id,
        ts: now(),
        values: values.to_vec(),
    });
}

/// Names the calling thread in the trace.
pub fn meta_thread_name(name: &str) {
    record(TraceRecord::Meta {
        name: "thread_name",
        value: name.to_string(),
    });
}

/// Records counter values.
pub fn counter(name: &'static str, values: &[(&'static str, i64)]) {
    record(TraceRecord::Counter {
        name,
        ts: now(),
        values: values.to_vec(),
    });
}

/// A guard that opens a duration slice and closes it when dropped.
pub struct ScopedDuration;

impl ScopedDuration {
    /// Opens the slice.
    pub fn new(name: &'static str, cat: &'static str) -> Self {
        duration_begin(name, cat);
        Self
    }
}

impl Drop for ScopedDuration {
    fn drop(&mut self) {
        duration_end();
    }
}
