// Copyright 2024 The Hearth Authors
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

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use hearth_logger as log;

use crate::time::{SystemDuration, SystemTime};
use crate::waitlist::{Awaitable, Waitlist};

/// Platform services of the event loop.
pub trait Env {
    /// Returns the time since boot.
    fn now(&mut self) -> SystemTime;

    /// Blocks until an interrupt or OS event arrives, or until `deadline`.
    fn wait_for_event(&mut self, deadline: Option<SystemTime>);
}

/// The cooperative event loop.
///
/// One iteration advances the clock and drains due sleeps, calls the
/// registered driver handlers, polls every woken task, and then blocks in
/// [`Env::wait_for_event`]. Cloning the handle is cheap; tasks keep a clone
/// to reach [`Runtime::sleep`] and [`Runtime::spawn`].
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<Inner>,
}

struct Inner {
    env: RefCell<Box<dyn Env>>,
    tasks: RefCell<Vec<Option<TaskSlot>>>,
    free: RefCell<Vec<usize>>,
    ready: Rc<RefCell<VecDeque<usize>>>,
    handlers: RefCell<Vec<Option<Box<dyn FnMut() -> bool>>>>,
    timers: Waitlist<SystemTime>,
    now: Cell<SystemTime>,
}

struct TaskSlot {
    future: Option<Pin<Box<dyn Future<Output = ()>>>>,
    waker: Waker,
    state: Rc<TaskState>,
}

struct TaskState {
    done: Cell<bool>,
    finished: Waitlist<()>,
}

impl Runtime {
    /// Creates a runtime on the given platform.
    pub fn new(env: impl Env + 'static) -> Self {
        let mut env = Box::new(env);
        let now = env.now();
        Runtime {
            inner: Rc::new(Inner {
                env: RefCell::new(env),
                tasks: RefCell::new(Vec::new()),
                free: RefCell::new(Vec::new()),
                ready: Rc::new(RefCell::new(VecDeque::new())),
                handlers: RefCell::new(Vec::new()),
                timers: Waitlist::new(),
                now: Cell::new(now),
            }),
        }
    }

    /// Returns the time of the current loop iteration.
    pub fn now(&self) -> SystemTime {
        self.inner.now.get()
    }

    /// Spawns a task and runs it up to its first suspension point.
    ///
    /// The returned handle cancels the task when dropped; call
    /// [`Task::detach`] to let it run to completion instead.
    pub fn spawn(&self, future: impl Future<Output = ()> + 'static) -> Task {
        let state = Rc::new(TaskState { done: Cell::new(false), finished: Waitlist::new() });
        let id = {
            let mut tasks = self.inner.tasks.borrow_mut();
            let id = match self.inner.free.borrow_mut().pop() {
                Some(id) => id,
                None => {
                    tasks.push(None);
                    tasks.len() - 1
                }
            };
            let entry = Rc::new(WakeEntry { ready: self.inner.ready.clone(), task: id });
            tasks[id] = Some(TaskSlot {
                future: Some(Box::pin(future)),
                waker: make_waker(entry),
                state: state.clone(),
            });
            id
        };
        log::trace!("spawning task {}", id);
        self.poll_task(id);
        Task { runtime: self.clone(), id, state, join_key: None, detached: false }
    }

    /// Sleeps for a duration from the current iteration's time.
    pub fn sleep(&self, duration: SystemDuration) -> Awaitable<'_, SystemTime> {
        self.sleep_until(self.now() + duration)
    }

    /// Sleeps until a point in time.
    pub fn sleep_until(&self, time: SystemTime) -> Awaitable<'_, SystemTime> {
        self.inner.timers.wait_with(time)
    }

    /// Registers a driver handler called once per loop iteration. The
    /// handler is removed when it returns `false`.
    pub fn add_handler(&self, handler: impl FnMut() -> bool + 'static) {
        self.inner.handlers.borrow_mut().push(Some(Box::new(handler)));
    }

    /// Runs one loop iteration.
    pub fn run_once(&self) {
        let now = self.inner.env.borrow_mut().now();
        self.inner.now.set(now);
        self.inner.timers.resume_all_if(|&time| time <= now);
        self.run_handlers();
        self.drain_ready();
        let deadline = self.inner.timers.fold_values(None, |next: Option<SystemTime>, &time| {
            match next {
                Some(next) if next <= time => Some(next),
                _ => Some(time),
            }
        });
        self.inner.env.borrow_mut().wait_for_event(deadline);
    }

    /// Runs the event loop forever.
    pub fn run(&self) -> ! {
        loop {
            self.run_once();
        }
    }

    /// Runs the event loop until the task completes.
    pub fn run_until(&self, task: &Task) {
        while task.is_alive() {
            self.run_once();
        }
    }

    fn run_handlers(&self) {
        // iterate over a snapshot so handlers can remove themselves or add
        // new handlers for the next iteration
        let count = self.inner.handlers.borrow().len();
        for i in 0..count {
            let handler = self.inner.handlers.borrow_mut()[i].take();
            let Some(mut handler) = handler else { continue };
            if handler() {
                self.inner.handlers.borrow_mut()[i] = Some(handler);
            }
        }
        self.inner.handlers.borrow_mut().retain(Option::is_some);
    }

    fn drain_ready(&self) {
        loop {
            let id = self.inner.ready.borrow_mut().pop_front();
            match id {
                Some(id) => self.poll_task(id),
                None => break,
            }
        }
    }

    fn poll_task(&self, id: usize) {
        let (mut future, waker, state) = {
            let mut tasks = self.inner.tasks.borrow_mut();
            match tasks[id].as_mut().and_then(|slot| slot.future.take()) {
                Some(future) => {
                    let slot = tasks[id].as_ref().unwrap();
                    (future, slot.waker.clone(), slot.state.clone())
                }
                // completed, cancelled, or a stale wake of a reused slot
                None => return,
            }
        };
        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => self.finish(id),
            Poll::Pending => {
                let mut tasks = self.inner.tasks.borrow_mut();
                match tasks[id].as_mut() {
                    // guard against the task cancelling itself while polled
                    // and the slot being reused by a fresh spawn
                    Some(slot) if Rc::ptr_eq(&slot.state, &state) => slot.future = Some(future),
                    _ => drop(future),
                }
            }
        }
    }

    fn cancel_task(&self, id: usize) {
        let future = {
            let mut tasks = self.inner.tasks.borrow_mut();
            tasks[id].as_mut().and_then(|slot| slot.future.take())
        };
        // run the frame's destructors outside the borrow: they unlink any
        // still-armed awaitables
        drop(future);
        log::trace!("cancelled task {}", id);
        self.finish(id);
    }

    fn finish(&self, id: usize) {
        let state = {
            let mut tasks = self.inner.tasks.borrow_mut();
            match tasks[id].take() {
                Some(slot) => slot.state,
                None => return,
            }
        };
        self.inner.free.borrow_mut().push(id);
        if !state.done.replace(true) {
            state.finished.resume_all();
        }
    }
}

/// Handle of a spawned task.
///
/// Awaiting the handle suspends until the task completes. Dropping it
/// cancels the task, running the destructors of everything in scope.
#[must_use = "dropping a task handle cancels the task; detach it to keep it running"]
pub struct Task {
    runtime: Runtime,
    id: usize,
    state: Rc<TaskState>,
    join_key: Option<usize>,
    detached: bool,
}

impl Task {
    /// Returns whether the task has not completed yet.
    pub fn is_alive(&self) -> bool {
        !self.state.done.get()
    }

    /// Cancels the task if it is still alive.
    pub fn cancel(&mut self) {
        if self.is_alive() {
            self.runtime.cancel_task(self.id);
        }
    }

    /// Consumes the handle, letting the task run to completion.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if let Some(key) = self.join_key.take() {
            self.state.finished.release(key);
        }
        if !self.detached {
            self.cancel();
        }
    }
}

impl Future for Task {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.state.done.get() {
            if let Some(key) = this.join_key.take() {
                this.state.finished.release(key);
            }
            return Poll::Ready(());
        }
        let key = match this.join_key {
            Some(key) => key,
            None => *this.join_key.insert(this.state.finished.link(())),
        };
        this.state.finished.set_waker(key, cx.waker());
        Poll::Pending
    }
}

struct WakeEntry {
    ready: Rc<RefCell<VecDeque<usize>>>,
    task: usize,
}

const VTABLE: RawWakerVTable = RawWakerVTable::new(clone_raw, wake_raw, wake_by_ref_raw, drop_raw);

fn make_waker(entry: Rc<WakeEntry>) -> Waker {
    let raw = RawWaker::new(Rc::into_raw(entry) as *const (), &VTABLE);
    // SAFETY: the vtable functions uphold the RawWaker contract over an Rc;
    // the runtime is single-threaded, so wakers never cross threads.
    unsafe { Waker::from_raw(raw) }
}

fn clone_raw(ptr: *const ()) -> RawWaker {
    // SAFETY: ptr came from Rc::into_raw in make_waker
    unsafe { Rc::increment_strong_count(ptr as *const WakeEntry) };
    RawWaker::new(ptr, &VTABLE)
}

fn wake_raw(ptr: *const ()) {
    // SAFETY: consumes the reference owned by this waker
    let entry = unsafe { Rc::from_raw(ptr as *const WakeEntry) };
    entry.ready.borrow_mut().push_back(entry.task);
}

fn wake_by_ref_raw(ptr: *const ()) {
    // SAFETY: borrows the reference owned by this waker
    let entry = unsafe { &*(ptr as *const WakeEntry) };
    entry.ready.borrow_mut().push_back(entry.task);
}

fn drop_raw(ptr: *const ()) {
    // SAFETY: consumes the reference owned by this waker
    drop(unsafe { Rc::from_raw(ptr as *const WakeEntry) });
}

/// Wall-clock environment for host builds and the emulator.
#[cfg(any(test, feature = "std"))]
pub struct HostEnv {
    start: std::time::Instant,
}

#[cfg(any(test, feature = "std"))]
impl HostEnv {
    pub fn new() -> Self {
        HostEnv { start: std::time::Instant::now() }
    }
}

#[cfg(any(test, feature = "std"))]
impl Default for HostEnv {
    fn default() -> Self {
        HostEnv::new()
    }
}

#[cfg(any(test, feature = "std"))]
impl Env for HostEnv {
    fn now(&mut self) -> SystemTime {
        SystemTime::from_ticks(self.start.elapsed().as_millis() as u32)
    }

    fn wait_for_event(&mut self, deadline: Option<SystemTime>) {
        let millis = match deadline {
            Some(deadline) => {
                let diff = (deadline - self.now()).as_millis();
                if diff <= 0 {
                    return;
                }
                diff as u64
            }
            None => 1,
        };
        std::thread::sleep(std::time::Duration::from_millis(millis));
    }
}

/// Deterministic environment whose clock jumps to the next deadline, for
/// tests.
#[cfg(any(test, feature = "std"))]
pub struct ManualEnv {
    ticks: Rc<Cell<u32>>,
}

/// Handle to advance a [`ManualEnv`] clock from outside the loop.
#[cfg(any(test, feature = "std"))]
#[derive(Clone)]
pub struct ManualClock {
    ticks: Rc<Cell<u32>>,
}

#[cfg(any(test, feature = "std"))]
impl ManualEnv {
    pub fn new() -> (ManualEnv, ManualClock) {
        let ticks = Rc::new(Cell::new(0));
        (ManualEnv { ticks: ticks.clone() }, ManualClock { ticks })
    }
}

#[cfg(any(test, feature = "std"))]
impl ManualClock {
    pub fn now(&self) -> SystemTime {
        SystemTime::from_ticks(self.ticks.get())
    }

    pub fn advance(&self, duration: SystemDuration) {
        self.ticks.set((self.now() + duration).ticks());
    }
}

#[cfg(any(test, feature = "std"))]
impl Env for ManualEnv {
    fn now(&mut self) -> SystemTime {
        SystemTime::from_ticks(self.ticks.get())
    }

    fn wait_for_event(&mut self, deadline: Option<SystemTime>) {
        if let Some(deadline) = deadline {
            let now = SystemTime::from_ticks(self.ticks.get());
            if deadline > now {
                self.ticks.set(deadline.ticks());
            }
        }
    }
}
