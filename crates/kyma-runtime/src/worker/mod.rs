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

//! The barrier-sequenced worker pool.
//!
//! Every worker thread independently steps through the shared phase
//! program, one phase function at a time. Phases meet at barriers built
//! from one shared counter and one monotonic release event: the thread
//! whose arrival completes the quorum is the leader and runs the
//! per-barrier side effect before releasing the rest. Work groups fan out
//! independent units claimed by atomic index; a unit may yield an opaque
//! token instead of finishing, which suspends the thread's run loop until
//! the external driver re-enters it.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use kyma_core::sync::SeqEvent;
use kyma_core::task::{set_current_kind, ThreadKind};

/// One entry of the phase program. Returns `true` to suspend the thread's
/// run loop.
pub type PhaseFn = fn(&mut PoolThreadInfo) -> bool;

/// Result of one work-unit execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    /// The unit finished.
    Done,
    /// The unit needs external completion; the non-zero token correlates
    /// the eventual resume.
    Yield(u64),
}

/// An independent unit of frame work.
pub trait WorkUnit: Send + Sync {
    /// Runs (or resumes) the unit.
    fn exec(&self) -> UnitStatus;
}

/// A fan-out of independent work units dispatched by atomic index-claim.
pub struct PoolWorkGroup {
    next_index: AtomicU32,
    num_valid: u32,
    guid: u32,
    units: Vec<Arc<dyn WorkUnit>>,
}

impl PoolWorkGroup {
    /// Creates a group. It starts drained; publishing it resets the claim
    /// index.
    pub fn new(guid: u32, units: Vec<Arc<dyn WorkUnit>>) -> Arc<Self> {
        let num_valid = units.len() as u32;
        Arc::new(Self {
            next_index: AtomicU32::new(num_valid),
            num_valid,
            guid,
            units,
        })
    }

    /// The engine-assigned identifier surfaced on suspension events.
    pub fn guid(&self) -> u32 {
        self.guid
    }

    /// Re-arms the group so its units can be claimed again.
    pub fn reset(&self) {
        self.next_index.store(0, Ordering::Release);
    }

    fn claim(&self) -> Option<&Arc<dyn WorkUnit>> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        if index >= self.num_valid {
            return None;
        }
        Some(&self.units[index as usize])
    }
}

type UpdateFn = Box<dyn Fn(u32) + Send + Sync>;
type FrameDoneFn = Box<dyn Fn() + Send + Sync>;

/// State shared by every thread of one pool.
pub struct PoolCommon {
    /// Advanced by the host once per frame to start the pool.
    pub frame_wait: SeqEvent,
    /// Advanced by the host when presentation for the frame may proceed.
    pub swap_wait: SeqEvent,
    /// Barrier arrival counter.
    seq: AtomicU64,
    /// Monotonic barrier release event.
    seq_wait: SeqEvent,
    num_threads: u32,
    dt_bits: AtomicU64,
    update_fn: RwLock<Option<UpdateFn>>,
    on_frame_done: RwLock<Option<FrameDoneFn>>,
    current_group: Mutex<Option<Arc<PoolWorkGroup>>>,
    program: RwLock<Arc<Vec<PhaseFn>>>,
}

impl PoolCommon {
    /// Creates the shared state for `num_threads` workers with the no-op
    /// program (a lone frame end).
    pub fn new(num_threads: u32) -> Arc<Self> {
        assert!(num_threads > 0, "a pool needs at least one thread");
        Arc::new(Self {
            frame_wait: SeqEvent::new(),
            swap_wait: SeqEvent::new(),
            seq: AtomicU64::new(0),
            seq_wait: SeqEvent::new(),
            num_threads,
            dt_bits: AtomicU64::new(0),
            update_fn: RwLock::new(None),
            on_frame_done: RwLock::new(None),
            current_group: Mutex::new(None),
            program: RwLock::new(Arc::new(vec![work_frame_end as PhaseFn])),
        })
    }

    /// Number of participating workers.
    pub fn num_threads(&self) -> u32 {
        self.num_threads
    }

    /// Publishes the frame's delta time for the workers.
    pub fn set_dt(&self, dt: f64) {
        self.dt_bits.store(dt.to_bits(), Ordering::Release);
    }

    /// The current frame's delta time.
    pub fn dt(&self) -> f64 {
        f64::from_bits(self.dt_bits.load(Ordering::Acquire))
    }

    /// Installs the per-barrier leader callback. Unset means no-op
    /// barriers.
    pub fn set_update_fn(&self, f: impl Fn(u32) + Send + Sync + 'static) {
        *self.update_fn.write().unwrap() = Some(Box::new(f));
    }

    /// Installs the frame-completion callback run by the final barrier's
    /// leader.
    pub fn set_on_frame_done(&self, f: impl Fn() + Send + Sync + 'static) {
        *self.on_frame_done.write().unwrap() = Some(Box::new(f));
    }

    /// Replaces the phase program. Takes effect at the next frame start;
    /// the program must end with the frame-end phase.
    pub fn set_program(&self, phases: Vec<PhaseFn>) {
        debug_assert!(!phases.is_empty());
        *self.program.write().unwrap() = Arc::new(phases);
    }

    /// Publishes the group workers claim from, re-arming it first.
    pub fn publish_group(&self, group: Option<Arc<PoolWorkGroup>>) {
        if let Some(group) = &group {
            group.reset();
        }
        *self.current_group.lock().unwrap() = group;
    }

    fn current_group(&self) -> Option<Arc<PoolWorkGroup>> {
        self.current_group.lock().unwrap().clone()
    }

    fn program(&self) -> Arc<Vec<PhaseFn>> {
        self.program.read().unwrap().clone()
    }

    fn run_update(&self, subseq: u32) {
        if let Some(f) = self.update_fn.read().unwrap().as_ref() {
            f(subseq);
        }
    }

    fn run_frame_done(&self) {
        if let Some(f) = self.on_frame_done.read().unwrap().as_ref() {
            f();
        }
    }
}

/// The suspension payload surfaced to the external driver:
/// `(work-group guid, yield token)`, or `(-1, -1)` when quiescent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineEvent {
    /// The suspending unit's work-group guid.
    pub group: f64,
    /// The unit's yield token.
    pub token: f64,
}

impl EngineEvent {
    /// The "no event" sentinel.
    pub const NONE: EngineEvent = EngineEvent {
        group: -1.0,
        token: -1.0,
    };
}

/// What stopped a worker's run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStep {
    /// A phase suspended; the driver reads the event and re-enters.
    Suspended,
    /// The exit flag was observed; the thread is done.
    Exited,
}

/// Per-thread pool state: the thread's position in the phase program.
pub struct PoolThreadInfo {
    common: Arc<PoolCommon>,
    program: Arc<Vec<PhaseFn>>,
    phase: PhaseFn,
    next_frame: u64,
    subseq: u32,
    expected_seq: u64,
    /// Cumulative sync-barrier releases this thread must observe before
    /// passing its next barrier. Monotonic across frames, so a released
    /// barrier can never release a later one early.
    sync_target: u64,
    yielded: Option<Arc<dyn WorkUnit>>,
    /// The outgoing suspension descriptor.
    pub event: EngineEvent,
    exit: Arc<AtomicBool>,
}

impl PoolThreadInfo {
    /// Creates the state for one worker of `common`'s pool.
    pub fn new(common: Arc<PoolCommon>) -> Self {
        let program = common.program();
        Self {
            common,
            program,
            phase: work_frame_start,
            next_frame: 1,
            subseq: 0,
            expected_seq: 0,
            sync_target: 1,
            yielded: None,
            event: EngineEvent::NONE,
            exit: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The flag that makes [`run`](PoolThreadInfo::run) return
    /// [`PoolStep::Exited`] at the next frame boundary.
    pub fn exit_flag(&self) -> Arc<AtomicBool> {
        self.exit.clone()
    }

    /// The shared pool state.
    pub fn common(&self) -> &Arc<PoolCommon> {
        &self.common
    }

    /// The frame this thread will run next. Strictly increasing; equals
    /// completed frame-end transitions plus one.
    pub fn next_frame(&self) -> u64 {
        self.next_frame
    }

    /// Runs phases until one suspends or the exit flag is observed.
    /// Re-enter after a suspension to resume from the same phase.
    pub fn run(&mut self) -> PoolStep {
        loop {
            let phase = self.phase;
            if phase(self) {
                return PoolStep::Suspended;
            }
            if self.exit.load(Ordering::Acquire) {
                return PoolStep::Exited;
            }
        }
    }
}

/// Frame start: park until the host releases the frame, then reset
/// per-frame barrier state and enter the program.
pub fn work_frame_start(info: &mut PoolThreadInfo) -> bool {
    info.common.frame_wait.wait_for(info.next_frame);
    info.subseq = 0;
    info.expected_seq = info.common.num_threads as u64 - 1;
    info.program = info.common.program();
    info.phase = info.program[0];
    false
}

/// Barrier: the arrival completing the quorum is the leader; it runs the
/// per-barrier callback and releases the rest through the monotonic
/// event.
pub fn work_sync_threads(info: &mut PoolThreadInfo) -> bool {
    let common = info.common.clone();
    if common.seq.fetch_add(1, Ordering::AcqRel) == info.expected_seq {
        common.run_update(info.subseq);
        common.seq_wait.signal_inc(1);
    } else {
        common.seq_wait.wait_for(info.sync_target);
    }
    info.sync_target += 1;
    info.expected_seq += common.num_threads as u64;
    info.subseq += 1;
    info.phase = info.program[info.subseq as usize];
    false
}

/// Claim and execute units from the current work group; a yield suspends
/// the thread, exhaustion falls through to the barrier.
pub fn work_do_work(info: &mut PoolThreadInfo) -> bool {
    if let Some(group) = info.common.current_group() {
        loop {
            let Some(unit) = group.claim() else {
                break;
            };
            match unit.exec() {
                UnitStatus::Done => {}
                UnitStatus::Yield(token) => {
                    info.event = EngineEvent {
                        group: group.guid() as f64,
                        token: token as f64,
                    };
                    info.yielded = Some(unit.clone());
                    info.phase = work_continue_work;
                    return true;
                }
            }
        }
    }
    work_sync_threads(info)
}

/// Resume the yielded unit; it may yield again or hand control back to
/// the work loop.
pub fn work_continue_work(info: &mut PoolThreadInfo) -> bool {
    let unit = info
        .yielded
        .clone()
        .expect("continue without a yielded unit");
    match unit.exec() {
        UnitStatus::Yield(token) => {
            info.event.token = token as f64;
            true
        }
        UnitStatus::Done => {
            info.yielded = None;
            info.phase = work_do_work;
            false
        }
    }
}

/// Final phase: the leader waits for the host's swap release, resets the
/// barrier counter and runs the frame-completion callback; every thread
/// advances its frame and loops back to the frame start.
pub fn work_frame_end(info: &mut PoolThreadInfo) -> bool {
    let common = info.common.clone();
    if common.seq.fetch_add(1, Ordering::AcqRel) == info.expected_seq {
        common.swap_wait.wait_for(info.next_frame);
        common.seq.store(0, Ordering::Release);
        common.run_frame_done();
    }
    info.next_frame += 1;
    info.phase = work_frame_start;
    false
}

/// The pool's worker threads.
pub struct WorkerPool {
    threads: Vec<JoinHandle<()>>,
    exits: Vec<Arc<AtomicBool>>,
    common: Arc<PoolCommon>,
}

impl WorkerPool {
    /// Spawns `common.num_threads()` workers, each running `driver` with
    /// its own [`PoolThreadInfo`]. The driver owns the suspension loop:
    /// re-entering [`PoolThreadInfo::run`] resumes a suspended thread.
    pub fn spawn<F>(common: Arc<PoolCommon>, driver: F) -> Self
    where
        F: Fn(&mut PoolThreadInfo) + Send + Sync + 'static,
    {
        let driver = Arc::new(driver);
        let mut threads = Vec::new();
        let mut exits = Vec::new();
        for i in 0..common.num_threads() {
            let mut info = PoolThreadInfo::new(common.clone());
            exits.push(info.exit_flag());
            let driver = driver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("kyma-worker-{i}"))
                .spawn(move || {
                    set_current_kind(ThreadKind::Pool);
                    driver(&mut info);
                })
                .expect("failed to spawn pool worker");
            threads.push(handle);
        }
        log::info!("worker pool started with {} threads", common.num_threads());
        Self {
            threads,
            exits,
            common,
        }
    }

    /// The shared state the pool was spawned over.
    pub fn common(&self) -> &Arc<PoolCommon> {
        &self.common
    }

    /// Flags every worker to exit and releases the frame gate so parked
    /// workers observe it.
    pub fn request_exit(&self) {
        for exit in &self.exits {
            exit.store(true, Ordering::Release);
        }
        self.common.frame_wait.signal_inc(1);
    }

    /// Requests exit and joins every worker.
    pub fn join(mut self) {
        self.request_exit();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        log::info!("worker pool joined");
    }
}

/// A driver that re-enters suspended threads after reporting each yield,
/// until exit.
pub fn drive_to_exit(info: &mut PoolThreadInfo, mut on_yield: impl FnMut(&EngineEvent)) {
    loop {
        match info.run() {
            PoolStep::Suspended => on_yield(&info.event),
            PoolStep::Exited => return,
        }
    }
}
