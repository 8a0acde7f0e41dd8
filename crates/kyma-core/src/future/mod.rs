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

//! Single-consumer promises and multi-listener promisables.
//!
//! A [`Promise`] transfers one computed value between threads. It has
//! exactly one [`Future`], and the consumer picks exactly one of three
//! fates for it: attach a continuation (inline or on a [`TaskRunner`]),
//! block for the value, or discard it. Each of those consumes the future,
//! so the one-of-three lifecycle is enforced by the type system rather
//! than by assertion.
//!
//! Promises are expected to resolve one way or another in finite time.
//! Resolving "null" is the error signal: continuations receive `None`, a
//! blocking take returns `None`. A promise dropped unresolved resolves
//! null so no consumer is left waiting forever.

mod promisable;

pub use self::promisable::Promisable;

use std::sync::{Arc, Condvar, Mutex};

use crate::task::{assert_blocking_allowed, TaskRunner};

type Continuation<T> = Box<dyn FnOnce(Option<T>) + Send>;

enum State<T> {
    /// No value and no consumer decision yet.
    Pending,
    /// A continuation is attached and waiting for the value.
    Continuation {
        runner: Option<Arc<dyn TaskRunner>>,
        f: Continuation<T>,
    },
    /// The value arrived before the consumer acted.
    Resolved(Option<T>),
    /// Terminal: the value has been delivered.
    Done,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    cv: Condvar,
}

/// The producing half. See the module docs for the lifecycle.
pub struct Promise<T: Send + 'static> {
    shared: Option<Arc<Shared<T>>>,
}

/// The consuming half of a [`Promise`].
pub struct Future<T> {
    shared: Option<Arc<Shared<T>>>,
}

/// Creates a connected promise/future pair.
pub fn promise<T: Send + 'static>() -> (Promise<T>, Future<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State::Pending),
        cv: Condvar::new(),
    });
    (
        Promise {
            shared: Some(shared.clone()),
        },
        Future {
            shared: Some(shared),
        },
    )
}

impl<T: Send + 'static> Promise<T> {
    /// Resolves the promise with a value.
    pub fn resolve(mut self, value: T) {
        let shared = self.shared.take().expect("promise resolved twice");
        Self::finish(&shared, Some(value));
    }

    /// Resolves the promise with no value, signalling an error to the
    /// consumer.
    pub fn resolve_null(mut self) {
        let shared = self.shared.take().expect("promise resolved twice");
        Self::finish(&shared, None);
    }

    fn finish(shared: &Arc<Shared<T>>, value: Option<T>) {
        let mut state = shared.state.lock().unwrap();
        match std::mem::replace(&mut *state, State::Done) {
            State::Pending => {
                *state = State::Resolved(value);
                shared.cv.notify_all();
            }
            State::Continuation { runner, f } => {
                drop(state);
                match runner {
                    Some(runner) => runner.post_task(Box::new(move || f(value))),
                    None => f(value),
                }
            }
            State::Resolved(_) | State::Done => unreachable!("promise resolved twice"),
        }
    }
}

impl<T: Send + 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        // An abandoned producer resolves null rather than stranding the
        // consumer.
        if let Some(shared) = self.shared.take() {
            let mut state = shared.state.lock().unwrap();
            match std::mem::replace(&mut *state, State::Done) {
                State::Pending => {
                    *state = State::Resolved(None);
                    shared.cv.notify_all();
                }
                State::Continuation { runner, f } => {
                    drop(state);
                    match runner {
                        Some(runner) => runner.post_task(Box::new(move || f(None))),
                        None => f(None),
                    }
                }
                State::Resolved(_) | State::Done => unreachable!(),
            }
        }
    }
}

impl<T: Send + 'static> Future<T> {
    /// Creates an already-resolved future.
    pub fn ready(value: T) -> Self {
        Future {
            shared: Some(Arc::new(Shared {
                state: Mutex::new(State::Resolved(Some(value))),
                cv: Condvar::new(),
            })),
        }
    }

    /// Attaches a continuation that fires on whatever thread resolution
    /// happens on. Fires immediately if the value is already present.
    pub fn then(mut self, f: impl FnOnce(Option<T>) + Send + 'static) {
        let shared = self.shared.take().expect("future already consumed");
        let mut state = shared.state.lock().unwrap();
        match std::mem::replace(&mut *state, State::Done) {
            State::Pending => {
                *state = State::Continuation {
                    runner: None,
                    f: Box::new(f),
                };
            }
            State::Resolved(value) => {
                drop(state);
                f(value);
            }
            State::Continuation { .. } | State::Done => unreachable!(),
        }
    }

    /// Attaches a continuation fired as a task posted to `runner`.
    pub fn then_on(mut self, runner: Arc<dyn TaskRunner>, f: impl FnOnce(Option<T>) + Send + 'static) {
        let shared = self.shared.take().expect("future already consumed");
        let mut state = shared.state.lock().unwrap();
        match std::mem::replace(&mut *state, State::Done) {
            State::Pending => {
                *state = State::Continuation {
                    runner: Some(runner),
                    f: Box::new(f),
                };
            }
            State::Resolved(value) => {
                drop(state);
                runner.post_task(Box::new(move || f(value)));
            }
            State::Continuation { .. } | State::Done => unreachable!(),
        }
    }

    /// Blocks until the value arrives and returns it, or `None` if the
    /// promise resolved null.
    ///
    /// This always deadlocks if the current thread is the one expected to
    /// produce the value. Prefer [`then_on`](Future::then_on) where
    /// possible; some operations must nevertheless be waited for in place.
    pub fn take(mut self) -> Option<T> {
        assert_blocking_allowed();
        let shared = self.shared.take().expect("future already consumed");
        let mut state = shared.state.lock().unwrap();
        loop {
            if matches!(*state, State::Resolved(_)) {
                match std::mem::replace(&mut *state, State::Done) {
                    State::Resolved(value) => return value,
                    _ => unreachable!(),
                }
            }
            state = shared.cv.wait(state).unwrap();
        }
    }

    /// Returns whether the value has arrived yet.
    pub fn is_resolved(&self) -> bool {
        let shared = self.shared.as_ref().expect("future already consumed");
        matches!(*shared.state.lock().unwrap(), State::Resolved(_))
    }

    /// Discards this future. The eventual value is dropped unseen.
    pub fn discard(self) {
        self.then(|_| {});
    }
}

impl<T> Drop for Future<T> {
    fn drop(&mut self) {
        debug_assert!(
            self.shared.is_none(),
            "future dropped without then/take/discard"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use crate::task::TaskThread;

    #[test]
    fn resolve_then_attach_fires_inline() {
        let (p, f) = promise::<u32>();
        p.resolve(7);
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        f.then(move |v| {
            assert_eq!(v, Some(7));
            fired2.store(true, Ordering::SeqCst);
        });
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn attach_then_resolve_fires_on_producer() {
        let (p, f) = promise::<String>();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        f.then(move |v| {
            assert_eq!(v.as_deref(), Some("hello"));
            fired2.store(true, Ordering::SeqCst);
        });
        assert!(!fired.load(Ordering::SeqCst));
        p.resolve("hello".to_string());
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn take_blocks_until_resolution() {
        let (p, f) = promise::<u64>();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            p.resolve(42);
        });
        assert_eq!(f.take(), Some(42));
        producer.join().unwrap();
    }

    #[test]
    fn resolve_null_is_seen_as_none() {
        let (p, f) = promise::<u32>();
        p.resolve_null();
        assert_eq!(f.take(), None);
    }

    #[test]
    fn dropped_promise_resolves_null() {
        let (p, f) = promise::<u32>();
        drop(p);
        assert_eq!(f.take(), None);
    }

    #[test]
    fn continuation_runs_on_the_given_runner() {
        let (p, f) = promise::<u32>();
        let (tx, rx) = std::sync::mpsc::channel();
        let mut runner_thread = TaskThread::new("promise-runner");
        let runner: Arc<dyn TaskRunner> = Arc::new(TaskThread::new("promise-target"));
        // Resolve from a task thread; continuation must still land on the
        // target runner, not the producing thread.
        let f_runner = runner.clone();
        f.then_on(f_runner, move |v| {
            tx.send((v, crate::task::current_kind())).unwrap();
        });
        runner_thread.post_task(Box::new(move || p.resolve(9)));
        let (v, kind) = rx.recv().unwrap();
        assert_eq!(v, Some(9));
        assert_eq!(kind, crate::task::ThreadKind::Task);
        runner_thread.join();
    }

    #[test]
    fn ready_future_is_resolved() {
        let f = Future::ready(1u8);
        assert!(f.is_resolved());
        assert_eq!(f.take(), Some(1));
    }

    #[test]
    fn discard_consumes_without_effect() {
        let (p, f) = promise::<u32>();
        f.discard();
        p.resolve(3);
    }
}
