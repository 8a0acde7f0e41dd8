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

//! # Kyma I/O
//!
//! Scatter/gather file operations completing on a thread pool, the windowed
//! I/O buffer, the multi-root virtual filesystem and the compression
//! pipeline. Errors are carried on the operation descriptor, never thrown:
//! completions receive them and decide.

#![warn(missing_docs)]

pub mod buffer;
pub mod compress;
pub mod file;
pub mod op;
pub mod pool;
pub mod stream;
pub mod vfs;

pub use buffer::IoBuffer;
pub use file::{File, IoFile, IoFileHandle};
pub use op::{AsyncOp, IoError, APPEND_OFFSET};
pub use pool::IoPool;
