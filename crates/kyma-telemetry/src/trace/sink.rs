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

//! The Chromium trace-event file writer.
//!
//! The file is a JSON array opened with a leading `[\n` and appended to
//! throughout the run, one event object per line; trace viewers accept
//! the unterminated form. Adjacent begin/end pairs within a chunk are
//! coalesced into complete (`X`) events with a `dur`, which roughly
//! halves the output for balanced slices.

use std::fs;
use std::io::{BufWriter, Write};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use serde_json::{json, Value};

use super::{TraceChunk, TraceRecord};

/// Writer-thread handle for the trace file.
pub struct TraceFileSink {
    tx: Sender<TraceChunk>,
    handle: Option<JoinHandle<()>>,
}

impl TraceFileSink {
    /// Creates the file, writes the array prefix and starts the writer
    /// thread.
    pub fn create(path: &str) -> std::io::Result<Self> {
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(b"[\n")?;
        let (tx, rx) = crossbeam_channel::unbounded::<TraceChunk>();
        let handle = std::thread::Builder::new()
            .name("kyma-trace-sink".to_string())
            .spawn(move || write_loop(file, rx))
            .expect("failed to spawn trace sink thread");
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Splits into the submission side and the writer thread handle.
    /// Dropping every sender stops the writer after it drains; join the
    /// handle to wait for the final flush.
    pub fn into_parts(mut self) -> (Sender<TraceChunk>, JoinHandle<()>) {
        let handle = self.handle.take().expect("sink already split");
        (self.tx.clone(), handle)
    }
}

fn write_loop(mut file: BufWriter<fs::File>, rx: Receiver<TraceChunk>) {
    while let Ok(chunk) = rx.recv() {
        for value in chunk_to_json(chunk) {
            // One event object per line, comma-terminated.
            if let Err(err) = writeln!(file, "{value},") {
                log::error!("trace write failed: {err}");
                return;
            }
        }
        let _ = file.flush();
    }
    let _ = file.flush();
}

/// Serializes a chunk, coalescing matched begin/end pairs into complete
/// events.
pub(crate) fn chunk_to_json(chunk: TraceChunk) -> Vec<Value> {
    let TraceChunk { pid, tid, records } = chunk;

    // Pair up begins and ends within the chunk.
    #[derive(Clone)]
    enum Slot {
        Keep(TraceRecord),
        Complete {
            name: &'static str,
            cat: &'static str,
            ts: u64,
            dur: u64,
        },
        Skip,
    }
    let mut slots: Vec<Slot> = records.into_iter().map(Slot::Keep).collect();
    let mut open: Vec<usize> = Vec::new();
    for i in 0..slots.len() {
        match &slots[i] {
            Slot::Keep(TraceRecord::Begin { .. }) => open.push(i),
            Slot::Keep(TraceRecord::End { ts }) => {
                let end_ts = *ts;
                if let Some(begin_index) = open.pop() {
                    if let Slot::Keep(TraceRecord::Begin { name, cat, ts }) =
                        slots[begin_index].clone()
                    {
                        slots[begin_index] = Slot::Complete {
                            name,
                            cat,
                            ts,
                            dur: end_ts.saturating_sub(ts),
                        };
                        slots[i] = Slot::Skip;
                    }
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    for slot in slots {
        let value = match slot {
            Slot::Skip => continue,
            Slot::Complete { name, cat, ts, dur } => json!({
                "pid": pid, "tid": tid, "ph": "X",
                "cat": cat, "name": name, "ts": ts, "dur": dur,
            }),
            Slot::Keep(record) => match record {
                TraceRecord::Begin { name, cat, ts } => json!({
                    "pid": pid, "tid": tid, "ph": "B",
                    "cat": cat, "name": name, "ts": ts,
                }),
                TraceRecord::End { ts } => json!({
                    "pid": pid, "tid": tid, "ph": "E", "ts": ts,
                }),
                TraceRecord::Instant { name, cat, ts } => json!({
                    "pid": pid, "tid": tid, "ph": "i",
                    "cat": cat, "name": name, "ts": ts, "s": "t",
                }),
                TraceRecord::AsyncBegin { name, cat, id, ts } => json!({
                    "pid": pid, "tid": tid, "ph": "b",
                    "cat": cat, "name": name, "ts": ts, "id": format!("{id:#x}"),
                }),
                TraceRecord::AsyncEnd { name, cat, id, ts } => json!({
                    "pid": pid, "tid": tid, "ph": "e",
                    "cat": cat, "name": name, "ts": ts, "id": format!("{id:#x}"),
                }),
                TraceRecord::AsyncInstant { name, cat, id, ts } => json!({
                    "pid": pid, "tid": tid, "ph": "n",
                    "cat": cat, "name": name, "ts": ts, "id": format!("{id:#x}"),
                }),
                TraceRecord::ObjectNew { name, id, ts } => json!({
                    "pid": pid, "tid": tid, "ph": "N",
                    "name": name, "ts": ts, "id": format!("{id:#x}"),
                }),
                TraceRecord::ObjectDestroy { name, id, ts } => json!({
                    "pid": pid, "tid": tid, "ph": "D",
                    "name": name, "ts": ts, "id": format!("{id:#x}"),
                }),
                TraceRecord::ObjectSnapshot {
                    name,
                    id,
                    ts,
                    values,
                } => {
                    let snapshot: serde_json::Map<String, Value> = values
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), json!(v)))
                        .collect();
                    json!({
                        "pid": pid, "tid": tid, "ph": "O",
                        "name": name, "ts": ts, "id": format!("{id:#x}"),
                        "args": { "snapshot": snapshot },
                    })
                }
                TraceRecord::Meta { name, value } => json!({
                    "pid": pid, "tid": tid, "ph": "M",
                    "name": name, "args": { "name": value },
                }),
                TraceRecord::Counter { name, ts, values } => {
                    let args: serde_json::Map<String, Value> = values
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), json!(v)))
                        .collect();
                    json!({
                        "pid": pid, "tid": tid, "ph": "C",
                        "name": name, "ts": ts, "args": args,
                    })
                }
            },
        };
        out.push(value);
    }
    out
}
