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

//! Multi-listener resolution, embedded in the resolvable object itself.

use std::sync::{Arc, Mutex};

use crate::sync::OneShotEvent;
use crate::task::{assert_blocking_allowed, TaskRunner};

type ListenerFn<T> = Box<dyn FnOnce(T, bool) + Send>;

struct Listener<T> {
    runner: Option<Arc<dyn TaskRunner>>,
    f: ListenerFn<T>,
}

struct Inner<T> {
    resolved: bool,
    errored: bool,
    listeners: Vec<Listener<T>>,
}

/// Multi-listener resolution state, mixed into an object that is its own
/// future.
///
/// Any number of listeners may attach before or after resolution; each
/// fires exactly once, in registration order. Listeners receive an owner
/// handle and an ok flag (`!errored`). The owner handle is supplied by the
/// embedding object at attach and resolve time, never captured in the
/// listener list, so a promisable can hold listeners without creating a
/// reference cycle back to itself.
pub struct Promisable<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone + Send + 'static> Promisable<T> {
    /// Creates an unresolved promisable.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                resolved: false,
                errored: false,
                listeners: Vec::new(),
            }),
        }
    }

    /// Creates an already-resolved promisable.
    pub fn new_resolved(errored: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                resolved: true,
                errored,
                listeners: Vec::new(),
            }),
        }
    }

    /// Attaches a listener fired on the resolving thread, or immediately if
    /// already resolved.
    pub fn then(&self, owner: &T, f: impl FnOnce(T, bool) + Send + 'static) {
        let mut inner = self.inner.lock().unwrap();
        if inner.resolved {
            let ok = !inner.errored;
            drop(inner);
            f(owner.clone(), ok);
        } else {
            inner.listeners.push(Listener {
                runner: None,
                f: Box::new(f),
            });
        }
    }

    /// Attaches a listener fired as a task posted to `runner`.
    pub fn then_on(
        &self,
        owner: &T,
        runner: Arc<dyn TaskRunner>,
        f: impl FnOnce(T, bool) + Send + 'static,
    ) {
        let mut inner = self.inner.lock().unwrap();
        if inner.resolved {
            let ok = !inner.errored;
            drop(inner);
            let owner = owner.clone();
            runner.post_task(Box::new(move || f(owner, ok)));
        } else {
            inner.listeners.push(Listener {
                runner: Some(runner),
                f: Box::new(f),
            });
        }
    }

    /// Resolves, firing every queued listener outside the lock in
    /// registration order.
    pub fn resolve(&self, owner: &T, error: bool) {
        let listeners = {
            let mut inner = self.inner.lock().unwrap();
            debug_assert!(!inner.resolved, "promisable resolved twice");
            inner.resolved = true;
            inner.errored = error;
            std::mem::take(&mut inner.listeners)
        };
        let ok = !error;
        for listener in listeners {
            match listener.runner {
                Some(runner) => {
                    let owner = owner.clone();
                    let f = listener.f;
                    runner.post_task(Box::new(move || f(owner, ok)));
                }
                None => (listener.f)(owner.clone(), ok),
            }
        }
    }

    /// Blocks the caller until resolution.
    pub fn wait(&self) {
        assert_blocking_allowed();
        let ev = {
            let mut inner = self.inner.lock().unwrap();
            if inner.resolved {
                return;
            }
            let ev = Arc::new(OneShotEvent::new());
            let signal = ev.clone();
            inner.listeners.push(Listener {
                runner: None,
                f: Box::new(move |_, _| signal.signal()),
            });
            ev
        };
        ev.wait();
    }

    /// Whether resolution has happened.
    pub fn is_resolved(&self) -> bool {
        self.inner.lock().unwrap().resolved
    }

    /// Whether resolution carried the error flag.
    pub fn errored(&self) -> bool {
        self.inner.lock().unwrap().errored
    }
}

impl<T: Clone + Send + 'static> Default for Promisable<T> {
    fn default() -> Self {
        Self::new()
    }
}
