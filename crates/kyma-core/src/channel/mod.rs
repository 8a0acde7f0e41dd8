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

//! Named inter-thread message channels.
//!
//! A channel is a named, ref-counted, serialized FIFO of byte messages.
//! Every push is assigned a monotonically increasing id; readers
//! acknowledge messages by consuming them, and
//! [`supply`](Channel::supply) lets a producer block until its message has
//! been acknowledged. Read-modify-write patterns are composed from the
//! primitive operations under an explicit [`lock`](Channel::lock).
//!
//! The channel named [`MAIN_CHANNEL`] is special: pushes to it trigger the
//! host frame pump's coalesced `PendingChannelMessages` event through a
//! hook installed by the runtime.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

/// Name of the channel whose pushes wake the host frame pump.
pub const MAIN_CHANNEL: &str = "main";

/// Shared-ownership handle to a [`Channel`].
pub type ChannelHandle = Arc<Channel>;

type NotifyHook = Arc<dyn Fn() + Send + Sync>;

struct ChannelState {
    messages: VecDeque<Vec<u8>>,
    /// Id of the next message to be read. `has_read(id)` is `rd > id`.
    rd: u64,
    /// Id assigned to the next push.
    wr: u64,
}

/// A named serialized FIFO. Obtained from a [`ChannelRegistry`].
pub struct Channel {
    name: String,
    state: Mutex<ChannelState>,
    /// Signaled on push; `demand` waits here.
    data_cv: Condvar,
    /// Signaled on read; `supply` waits here.
    ack_cv: Condvar,
    notify: Mutex<Option<NotifyHook>>,
}

impl Channel {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(ChannelState {
                messages: VecDeque::new(),
                rd: 0,
                wr: 0,
            }),
            data_cv: Condvar::new(),
            ack_cv: Condvar::new(),
            notify: Mutex::new(None),
        }
    }

    /// The channel's registry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Locks the channel for a composed sequence of operations.
    pub fn lock(&self) -> ChannelGuard<'_> {
        ChannelGuard {
            chan: self,
            state: Some(self.state.lock().unwrap()),
        }
    }

    /// Pushes a message and blocks until it is read or the deadline
    /// passes. Returns `(acknowledged, id)`.
    pub fn supply(&self, bytes: Vec<u8>, timeout: Duration) -> (bool, u64) {
        let mut state = self.state.lock().unwrap();
        let id = self.push_locked(&mut state, bytes);
        let deadline = Instant::now() + timeout;
        while state.rd <= id {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return (false, id);
            }
            let (guard, _) = self.ack_cv.wait_timeout(state, remaining).unwrap();
            state = guard;
        }
        (true, id)
    }

    /// Pops the front message, blocking up to `timeout` for one to arrive.
    pub fn pop(&self, timeout: Duration) -> Option<Vec<u8>> {
        let mut guard = self.lock();
        if guard.demand(timeout) {
            guard.read()
        } else {
            None
        }
    }

    fn push_locked(&self, state: &mut ChannelState, bytes: Vec<u8>) -> u64 {
        state.messages.push_back(bytes);
        let id = state.wr;
        state.wr += 1;
        self.data_cv.notify_all();
        if let Some(hook) = self.notify.lock().unwrap().as_ref() {
            hook();
        }
        id
    }

    fn set_notify(&self, hook: NotifyHook) {
        *self.notify.lock().unwrap() = Some(hook);
    }
}

/// Exclusive access to a channel for composed read-modify-write sequences.
pub struct ChannelGuard<'a> {
    chan: &'a Channel,
    state: Option<MutexGuard<'a, ChannelState>>,
}

impl ChannelGuard<'_> {
    fn state(&self) -> &ChannelState {
        self.state.as_ref().unwrap()
    }

    fn state_mut(&mut self) -> &mut ChannelState {
        self.state.as_mut().unwrap()
    }

    /// Appends a message and returns its id.
    pub fn push(&mut self, bytes: Vec<u8>) -> u64 {
        let mut state = self.state.take().unwrap();
        let id = self.chan.push_locked(&mut state, bytes);
        self.state = Some(state);
        id
    }

    /// Blocks until the channel is non-empty or the deadline passes.
    ///
    /// A zero timeout is a pure non-blocking check.
    pub fn demand(&mut self, timeout: Duration) -> bool {
        if !self.state().messages.is_empty() {
            return true;
        }
        if timeout.is_zero() {
            return false;
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let guard = self.state.take().unwrap();
            let (guard, _) = self.chan.data_cv.wait_timeout(guard, remaining).unwrap();
            self.state = Some(guard);
            if !self.state().messages.is_empty() {
                return true;
            }
        }
    }

    /// The front message, if any, without consuming it.
    pub fn peek(&self) -> Option<&[u8]> {
        self.state().messages.front().map(Vec::as_slice)
    }

    /// Consumes the front message, advancing the read cursor and waking
    /// acknowledgment waiters.
    pub fn read(&mut self) -> Option<Vec<u8>> {
        let msg = self.state_mut().messages.pop_front()?;
        self.state_mut().rd += 1;
        self.chan.ack_cv.notify_all();
        Some(msg)
    }

    /// Whether the message with the given id has been read.
    pub fn has_read(&self, id: u64) -> bool {
        self.state().rd > id
    }

    /// Number of unread messages.
    pub fn count(&self) -> usize {
        self.state().messages.len()
    }

    /// Drops every unread message without advancing the read cursor.
    pub fn clear(&mut self) {
        self.state_mut().messages.clear();
    }
}

/// Process-wide registry of named channels.
///
/// Channels are created on first use and dropped from the registry with
/// their last handle.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, Weak<Channel>>>,
    main_hook: Mutex<Option<NotifyHook>>,
}

impl ChannelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the channel with the given name, creating it if needed.
    pub fn get(&self, name: &str) -> ChannelHandle {
        let mut channels = self.channels.lock().unwrap();
        channels.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = channels.get(name).and_then(Weak::upgrade) {
            return existing;
        }
        let chan = Arc::new(Channel::new(name));
        if name == MAIN_CHANNEL {
            if let Some(hook) = self.main_hook.lock().unwrap().as_ref() {
                chan.set_notify(hook.clone());
            }
        }
        channels.insert(name.to_string(), Arc::downgrade(&chan));
        log::trace!("channel '{name}' created");
        chan
    }

    /// Installs the hook fired on every push to the main channel.
    pub fn set_main_notify(&self, hook: Arc<dyn Fn() + Send + Sync>) {
        *self.main_hook.lock().unwrap() = Some(hook.clone());
        let channels = self.channels.lock().unwrap();
        if let Some(main) = channels.get(MAIN_CHANNEL).and_then(Weak::upgrade) {
            main.set_notify(hook);
        }
    }
}
