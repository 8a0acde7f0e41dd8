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

//! The full frame loop: pump, engine and worker pool wired together the
//! way the host runs them.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use kyma_core::channel::ChannelRegistry;
use kyma_core::event::HostEventKind;
use kyma_runtime::engine::{Engine, Screen};
use kyma_runtime::pump::EventPump;
use kyma_runtime::worker::{
    drive_to_exit, PoolCommon, PoolWorkGroup, UnitStatus, WorkUnit, WorkerPool,
};

struct CountingUnit {
    executions: Arc<AtomicU32>,
}

impl WorkUnit for CountingUnit {
    fn exec(&self) -> UnitStatus {
        self.executions.fetch_add(1, Ordering::SeqCst);
        UnitStatus::Done
    }
}

struct CountingScreen {
    begins: Arc<AtomicU32>,
    ends: Arc<AtomicU32>,
}

impl Screen for CountingScreen {
    fn begin_frame(&mut self) -> bool {
        self.begins.fetch_add(1, Ordering::SeqCst);
        true
    }
    fn end_frame(&mut self) {
        self.ends.fetch_add(1, Ordering::SeqCst);
    }
    fn should_always_update(&self) -> bool {
        true
    }
}

#[test]
fn three_frames_through_pump_engine_and_pool() {
    const FRAMES: u32 = 3;

    let executions = Arc::new(AtomicU32::new(0));
    let begins = Arc::new(AtomicU32::new(0));
    let ends = Arc::new(AtomicU32::new(0));

    let common = PoolCommon::new(2);
    let engine = Arc::new(Mutex::new(Engine::new()));
    {
        let mut engine = engine.lock().unwrap();
        let units = (0..4)
            .map(|_| {
                Arc::new(CountingUnit {
                    executions: executions.clone(),
                }) as Arc<dyn WorkUnit>
            })
            .collect();
        engine.add_work_group(PoolWorkGroup::new(1, units));
        engine.add_screen(Box::new(CountingScreen {
            begins: begins.clone(),
            ends: ends.clone(),
        }));
        engine.init_workers(&common);
    }

    let mut pump = EventPump::new(1.0 / 1000.0);
    {
        // Frame completion: present, then tell the host a new frame began.
        let engine = engine.clone();
        let handle = pump.handle();
        common.set_on_frame_done(move || {
            engine.lock().unwrap().swap();
            handle.post_event(kyma_core::event::HostEvent::new(HostEventKind::NewFrame));
        });
    }

    let pool = WorkerPool::spawn(common.clone(), |info| drive_to_exit(info, |_| {}));

    pump.first_frame();
    let mut new_frames = 0u32;
    'host: loop {
        let events = pump.pop_events().to_vec();
        for ev in events {
            match ev.kind {
                HostEventKind::NewFrame => {
                    new_frames += 1;
                    if new_frames > FRAMES {
                        // The last frame has fully completed.
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
                _ => {}
            }
        }
    }
    pool.join();

    assert_eq!(engine.lock().unwrap().frame(), FRAMES as u64);
    assert_eq!(executions.load(Ordering::SeqCst), FRAMES * 4);
    assert_eq!(begins.load(Ordering::SeqCst), FRAMES);
    assert_eq!(ends.load(Ordering::SeqCst), FRAMES);
}

#[test]
fn main_channel_pushes_wake_the_pump() {
    let mut pump = EventPump::new(1.0 / 60.0);
    let registry = ChannelRegistry::new();
    {
        let handle = pump.handle();
        registry.set_main_notify(Arc::new(move || handle.post_pending_channel_messages()));
    }

    let main = registry.get("main");
    let producer_chan = main.clone();
    let producer = std::thread::spawn(move || {
        let mut guard = producer_chan.lock();
        guard.push(b"first".to_vec());
        guard.push(b"second".to_vec());
    });
    producer.join().unwrap();

    // Two pushes, one coalesced wakeup.
    let events = pump.pop_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, HostEventKind::PendingChannelMessages);

    // The consumer drains every message on the single wakeup.
    let mut guard = main.lock();
    assert_eq!(guard.count(), 2);
    assert_eq!(guard.read(), Some(b"first".to_vec()));
    assert_eq!(guard.read(), Some(b"second".to_vec()));
}
