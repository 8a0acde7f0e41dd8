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

//! One-shot and monotonic-sequence events.

use std::sync::{Condvar, Mutex};

/// A one-shot latch: once signaled it stays signaled.
///
/// Waiters that arrive after the signal return immediately. Signaling more
/// than once is allowed and has no further effect.
#[derive(Debug, Default)]
pub struct OneShotEvent {
    signaled: Mutex<bool>,
    cv: Condvar,
}

impl OneShotEvent {
    /// Creates an unsignaled event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks the calling thread until the event is signaled.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        while !*signaled {
            signaled = self.cv.wait(signaled).unwrap();
        }
    }

    /// Signals the event, waking every current and future waiter.
    pub fn signal(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        *signaled = true;
        self.cv.notify_all();
    }

    /// Returns whether the event has been signaled.
    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock().unwrap()
    }
}

/// A latch with a monotonically advancing 64-bit value.
///
/// Waiters block until the value reaches their target. The value never goes
/// backward: [`signal_at`](SeqEvent::signal_at) with a lower value than the
/// current one is a no-op. Late waiters whose target has already been passed
/// return without sleeping, which is what makes this suitable as a barrier
/// release: followers that arrive after the leader's advance never block.
#[derive(Debug, Default)]
pub struct SeqEvent {
    value: Mutex<u64>,
    cv: Condvar,
}

impl SeqEvent {
    /// Creates an event with value 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the value is at least `seq`.
    pub fn wait_for(&self, seq: u64) {
        let mut value = self.value.lock().unwrap();
        while *value < seq {
            value = self.cv.wait(value).unwrap();
        }
    }

    /// Advances the value to `seq`, waking waiters whose target is reached.
    ///
    /// Values at or below the current one are ignored.
    pub fn signal_at(&self, seq: u64) {
        let mut value = self.value.lock().unwrap();
        if seq > *value {
            *value = seq;
            self.cv.notify_all();
        }
    }

    /// Advances the value by `delta` and returns the new value.
    pub fn signal_inc(&self, delta: u64) -> u64 {
        let mut value = self.value.lock().unwrap();
        *value += delta;
        self.cv.notify_all();
        *value
    }

    /// Returns the current value.
    pub fn value(&self) -> u64 {
        *self.value.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn one_shot_signal_before_wait() {
        let ev = OneShotEvent::new();
        ev.signal();
        // Must not block.
        ev.wait();
        assert!(ev.is_signaled());
    }

    #[test]
    fn one_shot_wakes_waiter() {
        let ev = Arc::new(OneShotEvent::new());
        let ev2 = ev.clone();
        let handle = thread::spawn(move || {
            ev2.wait();
        });
        thread::sleep(Duration::from_millis(10));
        ev.signal();
        handle.join().unwrap();
    }

    #[test]
    fn seq_event_is_monotonic() {
        let ev = SeqEvent::new();
        ev.signal_at(5);
        ev.signal_at(3);
        assert_eq!(ev.value(), 5);
        ev.signal_inc(1);
        assert_eq!(ev.value(), 6);
    }

    #[test]
    fn seq_event_late_waiter_does_not_block() {
        let ev = SeqEvent::new();
        ev.signal_inc(2);
        // Target already passed; returns immediately.
        ev.wait_for(1);
        ev.wait_for(2);
    }

    #[test]
    fn seq_event_releases_waiters_in_order() {
        let ev = Arc::new(SeqEvent::new());
        let mut handles = Vec::new();
        for target in 1..=3u64 {
            let ev = ev.clone();
            handles.push(thread::spawn(move || {
                ev.wait_for(target);
                target
            }));
        }
        thread::sleep(Duration::from_millis(10));
        ev.signal_at(3);
        for h in handles {
            h.join().unwrap();
        }
    }
}
