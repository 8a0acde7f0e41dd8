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

//! End-to-end worker-pool scenarios.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kyma_runtime::worker::{
    drive_to_exit, work_do_work, work_frame_end, EngineEvent, PoolCommon, PoolWorkGroup,
    UnitStatus, WorkUnit, WorkerPool,
};

/// A unit that records its index and finishes.
struct RecordingUnit {
    index: u32,
    log: Arc<Mutex<Vec<u32>>>,
}

impl WorkUnit for RecordingUnit {
    fn exec(&self) -> UnitStatus {
        self.log.lock().unwrap().push(self.index);
        UnitStatus::Done
    }
}

/// A unit that yields a token on its first execution only.
struct YieldOnceUnit {
    index: u32,
    token: u64,
    yielded: AtomicBool,
    log: Arc<Mutex<Vec<u32>>>,
}

impl WorkUnit for YieldOnceUnit {
    fn exec(&self) -> UnitStatus {
        self.log.lock().unwrap().push(self.index);
        if !self.yielded.swap(true, Ordering::SeqCst) {
            UnitStatus::Yield(self.token)
        } else {
            UnitStatus::Done
        }
    }
}

fn recording_group(guid: u32, count: u32, log: &Arc<Mutex<Vec<u32>>>) -> Arc<PoolWorkGroup> {
    let units = (0..count)
        .map(|index| {
            Arc::new(RecordingUnit {
                index,
                log: log.clone(),
            }) as Arc<dyn WorkUnit>
        })
        .collect();
    PoolWorkGroup::new(guid, units)
}

#[test]
fn single_threaded_frame_dispatches_in_order() {
    let common = PoolCommon::new(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    let group = recording_group(11, 3, &log);

    common.set_program(vec![work_do_work, work_frame_end]);
    let updates = Arc::new(Mutex::new(Vec::new()));
    {
        let updates = updates.clone();
        let weak = Arc::downgrade(&common);
        common.set_update_fn(move |subseq| {
            updates.lock().unwrap().push(subseq);
            if let Some(common) = weak.upgrade() {
                common.publish_group(None);
            }
        });
    }
    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    common.set_on_frame_done(move || done_tx.send(()).unwrap());

    common.publish_group(Some(group));
    common.set_dt(1.0 / 60.0);
    let pool = WorkerPool::spawn(common.clone(), |info| drive_to_exit(info, |_| {}));

    common.swap_wait.signal_inc(1);
    common.frame_wait.signal_inc(1);
    done_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("frame should complete");

    pool.join();

    // Indices dispatched in increasing order by the sole thread.
    assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    // One barrier between the work phase and frame end, led exactly once.
    assert_eq!(*updates.lock().unwrap(), vec![0]);
    // on_frame_done ran exactly once.
    assert!(done_rx.try_recv().is_err());
}

#[test]
fn four_thread_frame_with_yield_resumes_and_finishes() {
    let common = PoolCommon::new(4);
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut units: Vec<Arc<dyn WorkUnit>> = Vec::new();
    for index in 0..8u32 {
        if index == 3 {
            units.push(Arc::new(YieldOnceUnit {
                index,
                token: 42,
                yielded: AtomicBool::new(false),
                log: log.clone(),
            }));
        } else {
            units.push(Arc::new(RecordingUnit {
                index,
                log: log.clone(),
            }));
        }
    }
    let group = PoolWorkGroup::new(77, units);

    common.set_program(vec![work_do_work, work_frame_end]);
    {
        let weak = Arc::downgrade(&common);
        common.set_update_fn(move |_subseq| {
            if let Some(common) = weak.upgrade() {
                common.publish_group(None);
            }
        });
    }
    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    common.set_on_frame_done(move || done_tx.send(()).unwrap());

    common.publish_group(Some(group));
    let suspensions: Arc<Mutex<Vec<EngineEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let seen = suspensions.clone();
    let pool = WorkerPool::spawn(common.clone(), move |info| {
        let seen = seen.clone();
        drive_to_exit(info, move |event| {
            seen.lock().unwrap().push(*event);
        });
    });

    common.swap_wait.signal_inc(1);
    common.frame_wait.signal_inc(1);
    done_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("frame should complete");
    pool.join();

    // One suspension, carrying the group guid and the yield token.
    let suspensions = suspensions.lock().unwrap();
    assert_eq!(suspensions.len(), 1);
    assert_eq!(suspensions[0].group, 77.0);
    assert_eq!(suspensions[0].token, 42.0);

    // All eight units executed; the yielding unit executed twice.
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 9);
    for index in 0..8u32 {
        let executions = log.iter().filter(|&&i| i == index).count();
        assert_eq!(executions, if index == 3 { 2 } else { 1 });
    }

    // Exactly one frame end.
    assert!(done_rx.try_recv().is_err());
}

#[test]
fn barrier_leader_is_unique_across_threads_and_frames() {
    const THREADS: u32 = 4;
    const FRAMES: u64 = 16;

    let common = PoolCommon::new(THREADS);
    let log = Arc::new(Mutex::new(Vec::new()));
    let group_a = recording_group(1, 5, &log);
    let group_b = recording_group(2, 5, &log);

    // Two work phases per frame: two sync barriers with leader callbacks.
    common.set_program(vec![work_do_work, work_do_work, work_frame_end]);
    let update_count = Arc::new(AtomicU64::new(0));
    {
        let update_count = update_count.clone();
        let weak = Arc::downgrade(&common);
        let group_b = group_b.clone();
        common.set_update_fn(move |subseq| {
            update_count.fetch_add(1, Ordering::SeqCst);
            if let Some(common) = weak.upgrade() {
                let next = if subseq == 0 { Some(group_b.clone()) } else { None };
                common.publish_group(next);
            }
        });
    }
    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    common.set_on_frame_done(move || done_tx.send(()).unwrap());

    let pool = WorkerPool::spawn(common.clone(), |info| drive_to_exit(info, |_| {}));

    for frame in 1..=FRAMES {
        common.publish_group(Some(group_a.clone()));
        common.set_dt(0.016);
        common.swap_wait.signal_inc(1);
        common.frame_wait.signal_inc(1);
        done_rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap_or_else(|_| panic!("frame {frame} did not complete"));
    }
    pool.join();

    // Exactly one leader callback per barrier: two per frame.
    assert_eq!(update_count.load(Ordering::SeqCst), FRAMES * 2);
    // Every unit of both groups ran every frame.
    assert_eq!(log.lock().unwrap().len(), (FRAMES * 10) as usize);
    // No extra frame-done.
    assert!(done_rx.try_recv().is_err());
}

#[test]
fn worker_frames_are_monotonic() {
    const THREADS: u32 = 3;
    const FRAMES: u64 = 5;

    let common = PoolCommon::new(THREADS);
    // No-op program: a lone frame end.
    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    common.set_on_frame_done(move || done_tx.send(()).unwrap());

    let finals = Arc::new(Mutex::new(Vec::new()));
    let finals2 = finals.clone();
    let pool = WorkerPool::spawn(common.clone(), move |info| {
        drive_to_exit(info, |_| {});
        finals2.lock().unwrap().push(info.next_frame());
    });

    for _ in 0..FRAMES {
        common.swap_wait.signal_inc(1);
        common.frame_wait.signal_inc(1);
        done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    }
    pool.join();

    // Each worker completed FRAMES frame-end transitions: next_frame is
    // FRAMES + 1 for every thread.
    let finals = finals.lock().unwrap();
    assert_eq!(finals.len(), THREADS as usize);
    for next_frame in finals.iter() {
        assert_eq!(*next_frame, FRAMES + 1);
    }
}

#[test]
fn empty_work_rebuild_is_a_valid_noop_frame() {
    let common = PoolCommon::new(2);
    common.publish_group(None);
    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    common.set_on_frame_done(move || done_tx.send(()).unwrap());
    let pool = WorkerPool::spawn(common.clone(), |info| drive_to_exit(info, |_| {}));

    common.swap_wait.signal_inc(1);
    common.frame_wait.signal_inc(1);
    done_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("no-op frame should still complete");
    pool.join();
}
