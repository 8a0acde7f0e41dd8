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

//! # Kyma Runtime
//!
//! The frame-pipelined worker runtime: a barrier-sequenced thread pool
//! stepping through a per-frame phase program, the host frame pump and
//! message loop feeding the embedding layer one event batch per frame,
//! and the engine glue that rebuilds the phase program and drives worlds
//! and screens.

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod pump;
pub mod worker;

pub use config::RuntimeConfig;
pub use engine::{Engine, Screen, World};
pub use pump::{EventPump, MessageLoop, PumpHandle};
pub use worker::{PoolCommon, PoolStep, PoolThreadInfo, PoolWorkGroup, UnitStatus, WorkUnit, WorkerPool};
