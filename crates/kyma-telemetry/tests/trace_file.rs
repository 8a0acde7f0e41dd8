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

//! End-to-end trace file round trip.
//!
//! One test function: the sink is process-wide, so phases run in
//! sequence rather than as separate tests.

use kyma_telemetry::trace;
use serde_json::Value;

#[test]
fn trace_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.json");
    let path = path.to_str().unwrap();

    trace::init(path).unwrap();

    trace::meta_thread_name("host");
    trace::duration_begin("frame", "pump");
    trace::instant("tick", "pump");
    trace::duration_end();
    trace::async_begin("AsyncOp", "io.verbose", 0x10);
    trace::async_end("AsyncOp", "io.verbose", 0x10);
    trace::counter("pool", &[("queued", 5), ("running", 2)]);

    // A second thread contributes records with its own tid; its chunk is
    // flushed when the thread exits.
    std::thread::spawn(|| {
        trace::duration_begin("work", "pool");
        trace::duration_end();
    })
    .join()
    .unwrap();

    trace::shutdown();

    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.starts_with("[\n"), "missing array prefix");

    // The body is comma-terminated event lines; close the array to parse.
    let body = text.trim_end().trim_end_matches(',');
    let events: Vec<Value> = serde_json::from_str(&format!("{body}\n]")).unwrap();
    assert!(events.len() >= 6);

    let find = |name: &str| {
        events
            .iter()
            .find(|ev| ev["name"] == name)
            .unwrap_or_else(|| panic!("missing event {name}"))
    };

    // The balanced pair coalesced to a complete event around the instant.
    let frame = find("frame");
    assert_eq!(frame["ph"], "X");
    assert!(frame["dur"].as_u64().is_some());
    assert_eq!(find("tick")["ph"], "i");

    let meta = find("thread_name");
    assert_eq!(meta["ph"], "M");
    assert_eq!(meta["args"]["name"], "host");

    let counter = find("pool");
    assert_eq!(counter["ph"], "C");
    assert_eq!(counter["args"]["queued"], 5);

    let work = find("work");
    assert_eq!(work["ph"], "X");
    // Different threads, different tids.
    assert_ne!(work["tid"], frame["tid"]);

    // Every event carries the process id.
    for ev in &events {
        assert_eq!(ev["pid"].as_u64().unwrap(), std::process::id() as u64);
    }
}
