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

//! Engine glue: worlds, screens and the per-frame phase program.
//!
//! The engine owns the registered work structure and rebuilds the pool's
//! phase program when it changes: one work phase per registered group,
//! terminated by the frame end. The barrier leader's callback publishes
//! the next group, so group `k + 1` becomes claimable exactly when every
//! unit of group `k` has finished.

use std::sync::{Arc, Mutex, Weak};

use crate::worker::{work_do_work, work_frame_end, PhaseFn, PoolCommon, PoolWorkGroup};

/// A simulation space advanced by fixed-step integration.
///
/// Multiple worlds update independently; objects never interact across
/// worlds.
pub trait World: Send {
    /// Advances the world by `steps` fixed steps of `step_size` seconds.
    fn step(&mut self, step_size: f64, steps: u32);

    /// Publishes the sub-step remainder for interpolation.
    fn set_physics_offset(&mut self, offset: f64);
}

/// A presentation target.
pub trait Screen: Send {
    /// Prepares the screen for the frame. `false` means the surface was
    /// lost.
    fn begin_frame(&mut self) -> bool;

    /// Finishes the frame on this screen.
    fn end_frame(&mut self);

    /// Whether the screen updates even while inactive.
    fn should_always_update(&self) -> bool {
        false
    }
}

struct WorldInfo {
    world: Box<dyn World>,
    t_now: f64,
    physics_step: f64,
    world_speed: f64,
    physics_accum: f64,
    update_enabled: bool,
}

struct ScreenInfo {
    screen: Box<dyn Screen>,
    always_active: bool,
    active_this_frame: bool,
}

type GroupList = Vec<Option<Arc<PoolWorkGroup>>>;

/// Registers worlds and screens, drives the physics accumulator and
/// rebuilds the per-frame phase list.
pub struct Engine {
    worlds: Vec<WorldInfo>,
    screens: Vec<ScreenInfo>,
    registered: Vec<Arc<PoolWorkGroup>>,
    /// Ordered group list, null-terminated; shared with the pool's
    /// barrier callback.
    groups: Arc<Mutex<GroupList>>,
    pool: Option<Arc<PoolCommon>>,
    need_work_rebuild: bool,
    frame: u64,
}

impl Engine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self {
            worlds: Vec::new(),
            screens: Vec::new(),
            registered: Vec::new(),
            groups: Arc::new(Mutex::new(vec![None])),
            pool: None,
            need_work_rebuild: true,
            frame: 0,
        }
    }

    /// Adds a world with the default step of 1/60 s.
    pub fn add_world(&mut self, world: Box<dyn World>) {
        self.worlds.push(WorldInfo {
            world,
            t_now: 0.0,
            physics_step: 1.0 / 60.0,
            world_speed: 1.0,
            physics_accum: 0.0,
            update_enabled: true,
        });
    }

    /// Removes the world at `index`.
    pub fn remove_world(&mut self, index: usize) {
        self.worlds.remove(index);
    }

    /// Scales the passage of time for the world at `index`.
    pub fn set_world_speed(&mut self, index: usize, speed: f64) {
        self.worlds[index].world_speed = speed;
    }

    /// Overrides the fixed step for the world at `index`.
    pub fn set_world_physics_step(&mut self, index: usize, step: f64) {
        self.worlds[index].physics_step = step;
    }

    /// Enables or disables updates for the world at `index`.
    pub fn set_world_update_enabled(&mut self, index: usize, enabled: bool) {
        self.worlds[index].update_enabled = enabled;
    }

    /// Adds a screen.
    pub fn add_screen(&mut self, screen: Box<dyn Screen>) {
        let always_active = screen.should_always_update();
        self.screens.push(ScreenInfo {
            screen,
            always_active,
            active_this_frame: false,
        });
    }

    /// Registers a work group; the phase program is rebuilt at the next
    /// frame. Groups run in registration order, separated by barriers.
    pub fn add_work_group(&mut self, group: Arc<PoolWorkGroup>) {
        self.registered.push(group);
        self.need_work_rebuild = true;
    }

    /// Binds the engine to the pool: installs the barrier callback that
    /// publishes work group `id + 1` when barrier `id` completes.
    pub fn init_workers(&mut self, pool: &Arc<PoolCommon>) {
        self.pool = Some(pool.clone());
        let groups = self.groups.clone();
        let weak: Weak<PoolCommon> = Arc::downgrade(pool);
        pool.set_update_fn(move |id| {
            let Some(pool) = weak.upgrade() else {
                return;
            };
            let next = groups
                .lock()
                .unwrap()
                .get(id as usize + 1)
                .cloned()
                .flatten();
            pool.publish_group(next);
        });
    }

    /// First-frame hook; the frame counter starts at the following
    /// `sys_update`.
    pub fn first_frame(&mut self, t0: f64) {
        log::trace!("first frame at t0={t0}");
        for world in &mut self.worlds {
            world.t_now = t0;
        }
    }

    /// Completed frames.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// The engine's own per-frame tick: rebuilds the work structure if
    /// needed, begins screens, advances world physics and releases the
    /// first work group.
    pub fn sys_update(&mut self, dt: f64) {
        self.frame += 1;

        if self.need_work_rebuild {
            self.need_work_rebuild = false;
            self.rebuild_workers();
        }

        for info in &mut self.screens {
            if info.active_this_frame || info.always_active {
                info.active_this_frame = true;
                if !info.screen.begin_frame() {
                    log::error!("screen lost, retrying once");
                    if !info.screen.begin_frame() {
                        log::error!("screen permanently lost");
                        std::process::abort();
                    }
                }
            }
        }

        for info in &mut self.worlds {
            if !info.update_enabled {
                continue;
            }
            let wt = dt * info.world_speed;
            info.t_now += wt;
            info.physics_accum += wt;
            let steps = (info.physics_accum / info.physics_step).floor() as u32;
            info.physics_accum -= steps as f64 * info.physics_step;
            info.world.step(info.physics_step, steps);
            info.world.set_physics_offset(info.physics_accum);
        }

        let first = self.groups.lock().unwrap().first().cloned().flatten();
        if let Some(pool) = &self.pool {
            pool.publish_group(first);
        }
    }

    /// Marks a screen active so it takes part in the next frame.
    pub fn activate_screen(&mut self, index: usize) {
        self.screens[index].active_this_frame = true;
    }

    /// End-of-frame presentation walk.
    pub fn swap(&mut self) {
        for info in &mut self.screens {
            if info.active_this_frame {
                info.active_this_frame = false;
                info.screen.end_frame();
            }
        }
    }

    /// Rebuilds the phase program and the group list: one work phase per
    /// registered group, frame end last, null terminator on the list.
    fn rebuild_workers(&mut self) {
        let mut program: Vec<PhaseFn> = Vec::with_capacity(self.registered.len() + 1);
        let mut list: GroupList = Vec::with_capacity(self.registered.len() + 1);
        for group in &self.registered {
            program.push(work_do_work);
            list.push(Some(group.clone()));
        }
        program.push(work_frame_end);
        list.push(None);
        *self.groups.lock().unwrap() = list;
        if let Some(pool) = &self.pool {
            pool.set_program(program);
        }
        log::debug!(
            "worker program rebuilt: {} work groups",
            self.registered.len()
        );
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RecordingWorld {
        calls: Arc<Mutex<Vec<(f64, u32)>>>,
        offsets: Arc<Mutex<Vec<f64>>>,
    }

    impl World for RecordingWorld {
        fn step(&mut self, step_size: f64, steps: u32) {
            self.calls.lock().unwrap().push((step_size, steps));
        }
        fn set_physics_offset(&mut self, offset: f64) {
            self.offsets.lock().unwrap().push(offset);
        }
    }

    #[test]
    fn physics_accumulator_is_deterministic() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let offsets = Arc::new(Mutex::new(Vec::new()));
        let mut engine = Engine::new();
        engine.add_world(Box::new(RecordingWorld {
            calls: calls.clone(),
            offsets: offsets.clone(),
        }));
        engine.set_world_physics_step(0, 0.01);

        // 0.025 + 0.025 = 0.05 total: 2 steps, then 2 more with the
        // remainder carried over.
        engine.sys_update(0.025);
        engine.sys_update(0.025);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (0.01, 2));
        assert_eq!(calls[1], (0.01, 3));
        let offsets = offsets.lock().unwrap();
        assert!((offsets[0] - 0.005).abs() < 1e-12);
        assert!(offsets[1].abs() < 1e-12);
    }

    #[test]
    fn world_speed_scales_accumulation() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let offsets = Arc::new(Mutex::new(Vec::new()));
        let mut engine = Engine::new();
        engine.add_world(Box::new(RecordingWorld {
            calls: calls.clone(),
            offsets,
        }));
        engine.set_world_physics_step(0, 0.01);
        engine.set_world_speed(0, 2.0);
        engine.sys_update(0.01);
        assert_eq!(calls.lock().unwrap()[0], (0.01, 2));
    }

    #[test]
    fn disabled_worlds_do_not_step() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let offsets = Arc::new(Mutex::new(Vec::new()));
        let mut engine = Engine::new();
        engine.add_world(Box::new(RecordingWorld {
            calls: calls.clone(),
            offsets,
        }));
        engine.set_world_update_enabled(0, false);
        engine.sys_update(0.1);
        assert!(calls.lock().unwrap().is_empty());
    }

    struct CountingScreen {
        begins: Arc<AtomicU32>,
        ends: Arc<AtomicU32>,
        fail_next: Arc<AtomicU32>,
    }

    impl Screen for CountingScreen {
        fn begin_frame(&mut self) -> bool {
            self.begins.fetch_add(1, Ordering::SeqCst);
            self.fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                    v.checked_sub(1)
                })
                .is_err()
        }
        fn end_frame(&mut self) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
        fn should_always_update(&self) -> bool {
            true
        }
    }

    #[test]
    fn screens_begin_and_end_each_frame() {
        let begins = Arc::new(AtomicU32::new(0));
        let ends = Arc::new(AtomicU32::new(0));
        let mut engine = Engine::new();
        engine.add_screen(Box::new(CountingScreen {
            begins: begins.clone(),
            ends: ends.clone(),
            fail_next: Arc::new(AtomicU32::new(0)),
        }));
        engine.sys_update(0.016);
        engine.swap();
        engine.sys_update(0.016);
        engine.swap();
        assert_eq!(begins.load(Ordering::SeqCst), 2);
        assert_eq!(ends.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn lost_screen_is_retried_once() {
        let begins = Arc::new(AtomicU32::new(0));
        let ends = Arc::new(AtomicU32::new(0));
        let mut engine = Engine::new();
        engine.add_screen(Box::new(CountingScreen {
            begins: begins.clone(),
            ends: ends.clone(),
            // Fail exactly the first begin_frame.
            fail_next: Arc::new(AtomicU32::new(1)),
        }));
        engine.sys_update(0.016);
        assert_eq!(begins.load(Ordering::SeqCst), 2);
    }
}
