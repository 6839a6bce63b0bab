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

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use hearth_runtime::{
    Barrier, Event, Interrupt, ManualClock, ManualEnv, Runtime, Semaphore, Serial,
    SystemDuration, select2,
};

fn runtime() -> (Runtime, ManualClock) {
    let (env, clock) = ManualEnv::new();
    (Runtime::new(env), clock)
}

#[test]
fn tasks_start_eagerly() {
    let (rt, _) = runtime();
    let reached = Rc::new(Cell::new(false));
    let barrier = Rc::new(Barrier::<()>::new());
    let task = {
        let (reached, barrier) = (reached.clone(), barrier.clone());
        rt.spawn(async move {
            reached.set(true);
            barrier.wait().await;
        })
    };
    // the body ran to its first suspension inside spawn
    assert!(reached.get());
    assert!(task.is_alive());
    barrier.resume_all();
    rt.run_until(&task);
}

#[test]
fn waiters_resume_in_fifo_order() {
    let (rt, _) = runtime();
    let barrier = Rc::new(Barrier::<()>::new());
    let order = Rc::new(RefCell::new(Vec::new()));
    let mut tasks = Vec::new();
    for name in ["a", "b"] {
        let (barrier, order) = (barrier.clone(), order.clone());
        tasks.push(rt.spawn(async move {
            barrier.wait().await;
            order.borrow_mut().push(name);
        }));
    }
    assert!(barrier.resume_first());
    rt.run_once();
    assert_eq!(*order.borrow(), ["a"]);
    assert!(barrier.resume_first());
    rt.run_once();
    assert_eq!(*order.borrow(), ["a", "b"]);
    assert!(!barrier.resume_first());
}

#[test]
fn rearmed_waiter_misses_the_current_sweep() {
    let (rt, _) = runtime();
    let barrier = Rc::new(Barrier::<()>::new());
    let rounds = Rc::new(Cell::new(0));
    let task = {
        let (barrier, rounds) = (barrier.clone(), rounds.clone());
        rt.spawn(async move {
            loop {
                barrier.wait().await;
                rounds.set(rounds.get() + 1);
            }
        })
    };
    barrier.resume_all();
    rt.run_once();
    rt.run_once();
    // one resume, one round: the re-armed waiter sits at the tail
    assert_eq!(rounds.get(), 1);
    barrier.resume_all();
    rt.run_once();
    assert_eq!(rounds.get(), 2);
    drop(task);
}

#[test]
fn select_signal_beats_timeout() {
    let (rt, clock) = runtime();
    let event = Rc::new(Event::new());
    let winner = Rc::new(Cell::new(0));
    let select_task = {
        let (rt2, event, winner) = (rt.clone(), event.clone(), winner.clone());
        rt.spawn(async move {
            let selected = select2(event.wait(), rt2.sleep(SystemDuration::from_millis(10))).await;
            winner.set(selected.index());
        })
    };
    let signal_task = {
        let (rt2, event) = (rt.clone(), event.clone());
        rt.spawn(async move {
            rt2.sleep(SystemDuration::from_millis(5)).await;
            event.set();
        })
    };
    rt.run_until(&select_task);
    assert_eq!(winner.get(), 1);
    // the losing sleep was cancelled: the clock never advanced to 10ms
    assert_eq!(clock.now().ticks(), 5);
    rt.run_once();
    assert_eq!(clock.now().ticks(), 5);
    signal_task.detach();
}

#[test]
fn select_timeout_fires() {
    let (rt, clock) = runtime();
    let event = Rc::new(Event::new());
    let winner = Rc::new(Cell::new(0));
    let task = {
        let (rt2, event, winner) = (rt.clone(), event.clone(), winner.clone());
        rt.spawn(async move {
            let selected = select2(event.wait(), rt2.sleep(SystemDuration::from_millis(10))).await;
            winner.set(selected.index());
        })
    };
    rt.run_until(&task);
    assert_eq!(winner.get(), 2);
    assert_eq!(clock.now().ticks(), 10);
}

#[test]
fn sleeps_fire_in_deadline_order() {
    let (rt, clock) = runtime();
    let order = Rc::new(RefCell::new(Vec::new()));
    let mut tasks = Vec::new();
    for millis in [10, 5, 20] {
        let (rt2, order) = (rt.clone(), order.clone());
        tasks.push(rt.spawn(async move {
            rt2.sleep(SystemDuration::from_millis(millis)).await;
            order.borrow_mut().push(millis);
        }));
    }
    for task in &tasks {
        rt.run_until(task);
    }
    assert_eq!(*order.borrow(), [5, 10, 20]);
    assert_eq!(clock.now().ticks(), 20);
}

#[test]
fn cancelling_a_task_unlinks_its_waiters() {
    let (rt, _) = runtime();
    let event = Rc::new(Event::new());
    let mut task = {
        let event = event.clone();
        rt.spawn(async move {
            event.wait().await;
            unreachable!("cancelled before the event fires");
        })
    };
    assert!(task.is_alive());
    task.cancel();
    assert!(!task.is_alive());
    // the frame's destructors removed the waiter, so nobody is resumed
    event.set();
    rt.run_once();
}

#[test]
fn join_and_completion() {
    let (rt, _) = runtime();
    let barrier = Rc::new(Barrier::<()>::new());
    let first = {
        let barrier = barrier.clone();
        rt.spawn(async move {
            barrier.wait().await;
        })
    };
    let done = Rc::new(Cell::new(false));
    let second = {
        let done = done.clone();
        rt.spawn(async move {
            first.await;
            done.set(true);
        })
    };
    rt.run_once();
    assert!(!done.get());
    barrier.resume_all();
    rt.run_until(&second);
    assert!(done.get());
}

#[test]
fn semaphore_hands_tokens_in_order() {
    let (rt, _) = runtime();
    let semaphore = Rc::new(Semaphore::new(1));
    let order = Rc::new(RefCell::new(Vec::new()));
    let mut tasks = Vec::new();
    for name in ["a", "b", "c"] {
        let (semaphore, order) = (semaphore.clone(), order.clone());
        tasks.push(rt.spawn(async move {
            semaphore.wait().await;
            order.borrow_mut().push(name);
        }));
    }
    // "a" took the initial token eagerly; the rest queue up
    assert_eq!(*order.borrow(), ["a"]);
    semaphore.post();
    rt.run_once();
    assert_eq!(*order.borrow(), ["a", "b"]);
    semaphore.post();
    rt.run_once();
    assert_eq!(*order.borrow(), ["a", "b", "c"]);
}

/// In-memory serial device following the driver contract: the "interrupt"
/// side only pushes state and raises a soft interrupt; the loop handler
/// drains it and resumes the receive waitlist in task context.
mod loopback {
    use hearth_error::Error;
    use hearth_runtime::{Runtime, Waitlist};

    use super::*;

    const RX_PENDING: u32 = 1 << 0;

    pub struct Loopback {
        shared: Rc<Shared>,
    }

    struct Shared {
        irq: Interrupt,
        frames: RefCell<VecDeque<Vec<u8>>>,
        rx: Waitlist<()>,
    }

    impl Loopback {
        pub fn new(rt: &Runtime) -> Self {
            let shared = Rc::new(Shared {
                irq: Interrupt::new(),
                frames: RefCell::new(VecDeque::new()),
                rx: Waitlist::new(),
            });
            let handler = shared.clone();
            rt.add_handler(move || {
                if handler.irq.drain() & RX_PENDING != 0 {
                    handler.rx.resume_all();
                }
                true
            });
            Loopback { shared }
        }

        /// What the receive interrupt routine would do.
        pub fn inject(&self, frame: &[u8]) {
            self.shared.frames.borrow_mut().push_back(frame.to_vec());
            self.shared.irq.raise(RX_PENDING);
        }

        pub fn handle(&self) -> Loopback {
            Loopback { shared: self.shared.clone() }
        }
    }

    impl Serial for Loopback {
        async fn receive(&self, data: &mut [u8]) -> Result<usize, Error> {
            loop {
                let frame = self.shared.frames.borrow_mut().pop_front();
                match frame {
                    Some(frame) => {
                        let length = frame.len().min(data.len());
                        data[..length].copy_from_slice(&frame[..length]);
                        return Ok(length);
                    }
                    None => self.shared.rx.wait().await,
                }
            }
        }

        async fn send(&self, data: &[u8]) -> Result<(), Error> {
            self.inject(data);
            Ok(())
        }
    }
}

#[test]
fn interrupts_flow_through_handler_to_task() {
    let (rt, _) = runtime();
    let serial = loopback::Loopback::new(&rt);
    let received = Rc::new(RefCell::new(Vec::new()));
    let task = {
        let (serial, received) = (serial.handle(), received.clone());
        rt.spawn(async move {
            let mut data = [0; 16];
            let length = serial.receive(&mut data).await.unwrap();
            received.borrow_mut().extend_from_slice(&data[..length]);
        })
    };
    rt.run_once();
    assert!(received.borrow().is_empty());
    serial.inject(&[1, 2, 3]);
    rt.run_until(&task);
    assert_eq!(*received.borrow(), [1, 2, 3]);
}
