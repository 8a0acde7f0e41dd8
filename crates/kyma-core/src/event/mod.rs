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

//! The host event record.
//!
//! Events cross the host↔script boundary as a flat record of a kind tag,
//! a flags word and five float arguments. The embedding layer decides what
//! the arguments mean per kind; this module only fixes the vocabulary.

/// Discriminant of a [`HostEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum HostEventKind {
    /// User callback trampoline; arguments are opaque.
    Callback,
    /// The engine's own update tick. `args[0]` is dt.
    SysUpdate,
    /// Frame presentation marker. `args[0]` is the raw timestamp.
    Swap,
    /// The next frame has begun.
    NewFrame,
    /// A work-group milestone was reached.
    UpdateDone,
    /// Coalesced channel wakeup; consumers drain every channel on one of
    /// these.
    PendingChannelMessages,
    KeyPressed,
    KeyReleased,
    TextInput,
    MouseMoved,
    MousePressed,
    MouseReleased,
    WheelMoved,
    Focus,
    MouseFocus,
    Visible,
    Resized,
    UserDraw,
    UserUpdate,
    LateUserUpdate,
    /// End-of-frame marker.
    EndFrame,
}

/// One event in the host's per-frame batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostEvent {
    /// What happened.
    pub kind: HostEventKind,
    /// Kind-specific flags.
    pub flags: u32,
    /// Kind-specific arguments; unused slots are zero.
    pub args: [f64; 5],
}

impl HostEvent {
    /// An event with no arguments.
    pub fn new(kind: HostEventKind) -> Self {
        Self {
            kind,
            flags: 0,
            args: [0.0; 5],
        }
    }

    /// An event with one argument.
    pub fn with_arg(kind: HostEventKind, a0: f64) -> Self {
        Self::with_args(kind, [a0, 0.0, 0.0, 0.0, 0.0])
    }

    /// An event with a full argument array.
    pub fn with_args(kind: HostEventKind, args: [f64; 5]) -> Self {
        Self {
            kind,
            flags: 0,
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_fill_arguments() {
        let ev = HostEvent::new(HostEventKind::NewFrame);
        assert_eq!(ev.kind, HostEventKind::NewFrame);
        assert_eq!(ev.args, [0.0; 5]);

        let ev = HostEvent::with_arg(HostEventKind::UserUpdate, 0.016);
        assert_eq!(ev.args[0], 0.016);

        let ev = HostEvent::with_args(HostEventKind::MouseMoved, [1.0, 2.0, 3.0, 4.0, 0.0]);
        assert_eq!(ev.args[3], 4.0);
    }
}
