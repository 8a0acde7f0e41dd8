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

//! Process clocks.
//!
//! A monotonic microsecond counter zeroed at first use, with a cached
//! "now" so hot paths can read the last sampled value without a syscall,
//! and a realtime view derived from it through an adjustable offset. The
//! frame pump runs on the monotonic counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();
static NOW_US: AtomicU64 = AtomicU64::new(0);
static OFFSET_US: AtomicU64 = AtomicU64::new(0);

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// Samples the monotonic clock, updates the cached value and returns it.
pub fn update_time() -> u64 {
    let now = epoch().elapsed().as_micros() as u64;
    NOW_US.store(now, Ordering::Release);
    now
}

/// Returns the last sampled monotonic microsecond count.
pub fn get_time() -> u64 {
    NOW_US.load(Ordering::Acquire)
}

/// Samples the clock and returns the realtime counter (monotonic +
/// offset).
pub fn update_realtime() -> u64 {
    update_time() + OFFSET_US.load(Ordering::Acquire)
}

/// Returns the last sampled realtime microsecond count.
pub fn get_realtime() -> u64 {
    get_time() + OFFSET_US.load(Ordering::Acquire)
}

/// Advances the realtime offset by `n` microseconds.
pub fn add_offset(n: u64) {
    OFFSET_US.fetch_add(n, Ordering::AcqRel);
}

/// The last sampled monotonic time in seconds.
pub fn time_seconds() -> f64 {
    get_time() as f64 / 1_000_000.0
}
