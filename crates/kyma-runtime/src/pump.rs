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

//! The host frame pump and message loop.
//!
//! The host thread owns the [`MessageLoop`] and the [`EventPump`]. Other
//! threads post through a cloneable [`PumpHandle`]; posting into an empty
//! queue also posts a halt so a host blocked in
//! [`pop_events`](EventPump::pop_events) wakes. Batches are handed over by
//! swapping the pending vector, O(1) regardless of batch size.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use kyma_core::clock;
use kyma_core::event::{HostEvent, HostEventKind};
use kyma_core::task::{Task, TaskRunner};

/// Fraction of the target frame time under which the pump sleeps.
const PACING_FRACTION: f64 = 0.75;

struct LoopState {
    tasks: Vec<Task>,
    halt: bool,
}

/// The host thread's task loop.
///
/// Two modes: [`run_until_idle`](MessageLoop::run_until_idle) drains
/// pending tasks and never blocks; [`run_until_halt`](MessageLoop::run_until_halt)
/// keeps executing tasks and blocks until a halt is posted.
pub struct MessageLoop {
    state: Mutex<LoopState>,
    cv: Condvar,
}

impl MessageLoop {
    /// Creates the loop.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LoopState {
                tasks: Vec::new(),
                halt: false,
            }),
            cv: Condvar::new(),
        })
    }

    /// Executes queued tasks until none remain. Never blocks.
    pub fn run_until_idle(&self) {
        loop {
            let tasks = {
                let mut state = self.state.lock().unwrap();
                if state.tasks.is_empty() {
                    return;
                }
                std::mem::take(&mut state.tasks)
            };
            for task in tasks {
                task();
            }
        }
    }

    /// Executes tasks as they arrive and returns once a halt is posted.
    pub fn run_until_halt(&self) {
        loop {
            let tasks = {
                let mut state = self.state.lock().unwrap();
                loop {
                    if !state.tasks.is_empty() {
                        break std::mem::take(&mut state.tasks);
                    }
                    if state.halt {
                        state.halt = false;
                        return;
                    }
                    state = self.cv.wait(state).unwrap();
                }
            };
            for task in tasks {
                task();
            }
            // Re-check halt after draining so a halt posted alongside work
            // still terminates the loop.
            let mut state = self.state.lock().unwrap();
            if state.halt && state.tasks.is_empty() {
                state.halt = false;
                return;
            }
        }
    }

    /// Wakes and terminates a blocked [`run_until_halt`](MessageLoop::run_until_halt).
    pub fn post_halt(&self) {
        let mut state = self.state.lock().unwrap();
        state.halt = true;
        self.cv.notify_all();
    }
}

impl TaskRunner for MessageLoop {
    fn post_task(&self, task: Task) {
        let mut state = self.state.lock().unwrap();
        state.tasks.push(task);
        self.cv.notify_all();
    }
}

/// Delivers OS window events into the pump once per frame.
pub trait PlatformSource: Send {
    /// Drains pending platform events into `sink`.
    fn poll(&mut self, sink: &mut dyn FnMut(HostEvent));
}

struct PumpShared {
    pending: Mutex<Vec<HostEvent>>,
    msg_loop: Arc<MessageLoop>,
}

/// Cloneable producer side of the pump, safe from any thread.
#[derive(Clone)]
pub struct PumpHandle {
    shared: Arc<PumpShared>,
}

impl PumpHandle {
    /// Queues an event; wakes the host if the queue was empty.
    pub fn post_event(&self, event: HostEvent) {
        let mut pending = self.shared.pending.lock().unwrap();
        if pending.is_empty() {
            self.shared.msg_loop.post_halt();
        }
        pending.push(event);
    }

    /// Queues the coalesced channel wakeup: skipped when the newest
    /// queued event is already one, since the consumer drains every
    /// channel per wakeup.
    pub fn post_pending_channel_messages(&self) {
        let mut pending = self.shared.pending.lock().unwrap();
        if pending.is_empty() {
            self.shared.msg_loop.post_halt();
        }
        if pending
            .last()
            .map_or(true, |ev| ev.kind != HostEventKind::PendingChannelMessages)
        {
            pending.push(HostEvent::new(HostEventKind::PendingChannelMessages));
        }
    }
}

/// The host-side frame pump. Host-thread only; producers use
/// [`PumpHandle`].
pub struct EventPump {
    shared: Arc<PumpShared>,
    current: Vec<HostEvent>,
    target_frame_time: f64,
    prev_timestamp: u64,
    current_timestamp: u64,
    source: Option<Box<dyn PlatformSource>>,
}

impl EventPump {
    /// Creates a pump targeting `target_frame_time` seconds per frame.
    pub fn new(target_frame_time: f64) -> Self {
        Self {
            shared: Arc::new(PumpShared {
                pending: Mutex::new(Vec::new()),
                msg_loop: MessageLoop::new(),
            }),
            current: Vec::new(),
            target_frame_time,
            prev_timestamp: 0,
            current_timestamp: 0,
            source: None,
        }
    }

    /// A producer handle for other threads.
    pub fn handle(&self) -> PumpHandle {
        PumpHandle {
            shared: self.shared.clone(),
        }
    }

    /// The host task loop.
    pub fn message_loop(&self) -> Arc<MessageLoop> {
        self.shared.msg_loop.clone()
    }

    /// Installs the OS window event source.
    pub fn set_platform_source(&mut self, source: Box<dyn PlatformSource>) {
        self.source = Some(source);
    }

    /// Prepares the first frame: primes the timing baseline, reserves
    /// event storage and posts the initial `NewFrame`.
    pub fn first_frame(&mut self) {
        self.current_timestamp = clock::update_time();
        self.shared.pending.lock().unwrap().reserve(1000);
        self.current.reserve(1000);
        self.handle().post_event(HostEvent::new(HostEventKind::NewFrame));
    }

    /// Top-of-frame: updates timing, paces short frames, drains the
    /// message loop and platform source, then queues the fixed frame
    /// sequence.
    pub fn new_frame(&mut self) {
        let now = clock::update_time();
        self.prev_timestamp = self.current_timestamp;
        self.current_timestamp = now;
        let raw_dt = now as f64;
        let dt = (self.current_timestamp - self.prev_timestamp) as f64 / 1_000_000.0;

        let floor = self.target_frame_time * PACING_FRACTION;
        if dt < floor {
            std::thread::sleep(Duration::from_secs_f64(floor - dt));
        }

        self.shared.msg_loop.run_until_idle();

        let mut platform_events = Vec::new();
        if let Some(source) = self.source.as_mut() {
            source.poll(&mut |ev| platform_events.push(ev));
        }

        let mut pending = self.shared.pending.lock().unwrap();
        pending.extend(platform_events);
        pending.push(HostEvent::with_arg(HostEventKind::UserUpdate, dt));
        pending.push(HostEvent::with_arg(HostEventKind::SysUpdate, raw_dt));
        pending.push(HostEvent::with_arg(HostEventKind::UserDraw, dt));
        pending.push(HostEvent::with_arg(HostEventKind::Swap, raw_dt));
        pending.push(HostEvent::with_arg(HostEventKind::LateUserUpdate, dt));
    }

    /// The delta time of the last [`new_frame`](EventPump::new_frame), in
    /// seconds.
    pub fn dt(&self) -> f64 {
        (self.current_timestamp - self.prev_timestamp) as f64 / 1_000_000.0
    }

    /// Blocks until at least one event is queued, then hands over the
    /// whole batch by swap.
    pub fn pop_events(&mut self) -> &[HostEvent] {
        loop {
            {
                let mut pending = self.shared.pending.lock().unwrap();
                if !pending.is_empty() {
                    self.current.clear();
                    std::mem::swap(&mut *pending, &mut self.current);
                    return &self.current;
                }
            }
            self.shared.msg_loop.run_until_halt();
        }
    }

    /// Non-blocking variant of [`pop_events`](EventPump::pop_events);
    /// empty when nothing is queued.
    pub fn try_pop_events(&mut self) -> &[HostEvent] {
        let mut pending = self.shared.pending.lock().unwrap();
        self.current.clear();
        std::mem::swap(&mut *pending, &mut self.current);
        drop(pending);
        &self.current
    }
}
