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

//! Sandbox host demonstrating the Kyma runtime end to end.
//!
//! Wires the filesystem roots, the I/O pool, the worker pool, the frame
//! pump and the engine together, runs a handful of frames of dummy work,
//! writes a file through the async I/O path and round-trips it through
//! the compressor.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use kyma_core::channel::ChannelRegistry;
use kyma_core::event::{HostEvent, HostEventKind};
use kyma_io::compress::{create_compressor, create_decompressor, CompressionAlgorithmKind};
use kyma_io::pool::IoPool;
use kyma_io::vfs::{file_flags, OpenMode, OsVfs, SafeVfs, SplitVfs, Vfs};
use kyma_runtime::engine::Engine;
use kyma_runtime::pump::EventPump;
use kyma_runtime::worker::{
    drive_to_exit, PoolCommon, PoolWorkGroup, UnitStatus, WorkUnit, WorkerPool,
};
use kyma_runtime::RuntimeConfig;
use kyma_telemetry::trace;

const DEMO_FRAMES: u32 = 10;

/// A stand-in work unit: counts executions under a trace span.
struct DemoUnit {
    executions: Arc<AtomicU32>,
}

impl WorkUnit for DemoUnit {
    fn exec(&self) -> UnitStatus {
        let _span = trace::ScopedDuration::new("demo-unit", "pool");
        self.executions.fetch_add(1, Ordering::Relaxed);
        UnitStatus::Done
    }
}

fn load_config() -> RuntimeConfig {
    match std::env::args().nth(1) {
        Some(path) => match RuntimeConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                log::error!("{err}; using defaults");
                RuntimeConfig::default()
            }
        },
        None => RuntimeConfig::default(),
    }
}

fn build_vfs(config: &RuntimeConfig, pool: &Arc<IoPool>) -> Arc<SplitVfs> {
    let data_dir = if config.data_dir.is_empty() {
        ".".to_string()
    } else {
        config.data_dir.clone()
    };
    let temp_dir = std::env::temp_dir().to_string_lossy().into_owned();

    let data = SafeVfs::new(OsVfs::new(data_dir, pool.clone()), "");
    let temp = SafeVfs::new(OsVfs::new(temp_dir, pool.clone()), "");
    let split = SplitVfs::new(data, temp);
    if !config.save_dir.is_empty() {
        std::fs::create_dir_all(&config.save_dir).ok();
        split.set_save(SafeVfs::new(
            OsVfs::new(config.save_dir.clone(), pool.clone()),
            "",
        ));
    }
    split
}

fn demo_save_roundtrip(vfs: &SplitVfs, io_pool: &Arc<IoPool>) -> Result<()> {
    let file = vfs
        .open("/temp/kyma-sandbox.bin", 0, OpenMode::CreateOrTruncate)
        .context("cannot open /temp/kyma-sandbox.bin")?;
    let stream = file.create_output_stream();
    stream.write(b"kyma sandbox save data");
    stream.flush();

    let file = vfs
        .open(
            "/temp/kyma-sandbox.bin",
            file_flags::READ_ONLY,
            OpenMode::OpenExisting,
        )
        .context("cannot reopen /temp/kyma-sandbox.bin")?;
    let blob = file.read_to_immediate_blob(0, 0);
    anyhow::ensure!(!blob.errored(), "save read errored");
    log::info!("read back {} bytes: {:?}", blob.len(), blob.as_string());

    // Round-trip through the compressor on the I/O pool.
    let runner: Arc<dyn kyma_core::task::TaskRunner> = io_pool.clone();
    let compressor = create_compressor(CompressionAlgorithmKind::Lz4, None);
    let decompressor = create_decompressor(CompressionAlgorithmKind::Lz4, None);
    let compressed = compressor.compress(&blob, Some(runner.clone()));
    let restored = decompressor.decompress(&compressed, Some(runner));
    restored.wait();
    anyhow::ensure!(
        restored.data() == blob.data(),
        "compression round trip diverged"
    );
    log::info!(
        "compression round trip ok ({} -> {} bytes)",
        blob.len(),
        compressed.len()
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    kyma_core::task::set_current_kind(kyma_core::task::ThreadKind::Main);

    let config = load_config();
    log::info!(
        "starting {} with {} workers",
        config.app_name,
        config.worker_threads
    );

    if let Some(path) = &config.trace_file {
        trace::init(path).context("cannot create trace file")?;
        trace::meta_thread_name("host");
    }

    let io_pool = Arc::new(IoPool::new(config.io_threads.max(1) as usize, "kyma-io"));
    let vfs = build_vfs(&config, &io_pool);
    demo_save_roundtrip(&vfs, &io_pool)?;

    // Channels: pushes to the main channel wake the pump.
    let channels = Arc::new(ChannelRegistry::new());
    let mut pump = EventPump::new(config.target_frame_time);
    {
        let handle = pump.handle();
        channels.set_main_notify(Arc::new(move || handle.post_pending_channel_messages()));
    }

    // Engine and worker pool.
    let executions = Arc::new(AtomicU32::new(0));
    let common = PoolCommon::new(config.worker_threads.max(1));
    let engine = Arc::new(Mutex::new(Engine::new()));
    {
        let mut engine = engine.lock().unwrap();
        let units = (0..config.worker_threads * 2)
            .map(|_| {
                Arc::new(DemoUnit {
                    executions: executions.clone(),
                }) as Arc<dyn WorkUnit>
            })
            .collect();
        engine.add_work_group(PoolWorkGroup::new(1, units));
        engine.init_workers(&common);
        engine.first_frame(kyma_core::clock::time_seconds());
    }
    {
        let engine = engine.clone();
        let handle = pump.handle();
        common.set_on_frame_done(move || {
            engine.lock().unwrap().swap();
            handle.post_event(HostEvent::new(HostEventKind::NewFrame));
        });
    }
    let pool = WorkerPool::spawn(common.clone(), |info| drive_to_exit(info, |_| {}));

    // The host loop: one event batch per frame.
    pump.first_frame();
    let mut new_frames = 0u32;
    'host: loop {
        let events = pump.pop_events().to_vec();
        for ev in events {
            match ev.kind {
                HostEventKind::NewFrame => {
                    trace::instant("new-frame", "pump");
                    new_frames += 1;
                    if new_frames > DEMO_FRAMES {
                        break 'host;
                    }
                    pump.new_frame();
                }
                HostEventKind::SysUpdate => {
                    let dt = pump.dt();
                    engine.lock().unwrap().sys_update(dt);
                    common.set_dt(dt);
                    common.frame_wait.signal_inc(1);
                }
                HostEventKind::Swap => {
                    common.swap_wait.signal_inc(1);
                }
                HostEventKind::PendingChannelMessages => {
                    let main = channels.get("main");
                    let mut guard = main.lock();
                    while let Some(message) = guard.read() {
                        log::debug!("main channel message: {} bytes", message.len());
                    }
                }
                _ => {}
            }
        }
    }

    pool.join();
    io_pool.shutdown();
    trace::flush_thread();
    trace::shutdown();

    let frames = engine.lock().unwrap().frame();
    log::info!(
        "ran {frames} frames, {} unit executions",
        executions.load(Ordering::Relaxed)
    );
    Ok(())
}
