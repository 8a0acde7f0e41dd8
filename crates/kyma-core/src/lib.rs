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

//! # Kyma Core
//!
//! Foundational crate containing the synchronization primitives, task
//! runners, promise/future fabric, waitable byte containers and named
//! channels that the rest of the runtime is built on.

#![warn(missing_docs)]

pub mod blob;
pub mod channel;
pub mod clock;
pub mod event;
pub mod future;
pub mod sync;
pub mod task;

pub use blob::{Blob, BlobHandle};
pub use future::{promise, Future, Promisable, Promise};
pub use sync::{OneShotEvent, SeqEvent};
pub use task::{Task, TaskRunner, ThreadKind};
