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

//! # Kyma Telemetry
//!
//! Per-thread trace event collection with a Chromium-compatible JSON
//! trace file sink. Recording is wait-free on the hot path: events land
//! in a thread-local chunk that is shipped to the sink thread when full,
//! on explicit flush, or at thread exit.

#![warn(missing_docs)]

pub mod trace;
