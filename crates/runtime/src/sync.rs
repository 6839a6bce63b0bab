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

use core::cell::Cell;

use crate::waitlist::{Awaitable, Waitlist};

/// Manual reset event.
///
/// Once set, waits complete immediately until the event is cleared again.
pub struct Event {
    waitlist: Waitlist,
    state: Cell<bool>,
}

impl Event {
    /// Creates an event in cleared state.
    pub const fn new() -> Self {
        Event { waitlist: Waitlist::new(), state: Cell::new(false) }
    }

    /// Sets the event, resuming all waiters and latching the state.
    pub fn set(&self) {
        self.state.set(true);
        self.waitlist.resume_all();
    }

    /// Clears the event.
    pub fn clear(&self) {
        self.state.set(false);
    }

    /// Returns whether the event is set.
    pub fn is_set(&self) -> bool {
        self.state.get()
    }

    /// Waits until the event is set.
    pub fn wait(&self) -> Awaitable<'_> {
        match self.state.get() {
            true => Awaitable::ready(),
            false => self.waitlist.wait(),
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Event::new()
    }
}

/// Rendezvous between data producers and consumers.
///
/// Unlike [`Event`] nothing latches: a resume while nobody waits is lost.
pub struct Barrier<T = ()> {
    waitlist: Waitlist<T>,
}

impl<T> Barrier<T> {
    /// Creates a barrier with no waiters.
    pub const fn new() -> Self {
        Barrier { waitlist: Waitlist::new() }
    }

    /// Waits until a producer resumes this waiter.
    pub fn wait(&self) -> Awaitable<'_, T>
    where T: Default {
        self.waitlist.wait()
    }

    /// Waits carrying a value for the producer's resume predicates.
    pub fn wait_with(&self, value: T) -> Awaitable<'_, T> {
        self.waitlist.wait_with(value)
    }

    /// Resumes the first waiter. Returns whether one was waiting.
    pub fn resume_first(&self) -> bool {
        self.waitlist.resume_first()
    }

    /// Resumes all current waiters.
    pub fn resume_all(&self) {
        self.waitlist.resume_all()
    }

    /// Resumes all current waiters whose value matches the predicate.
    pub fn resume_all_if(&self, predicate: impl FnMut(&T) -> bool) {
        self.waitlist.resume_all_if(predicate)
    }

    /// Returns whether nobody waits.
    pub fn is_empty(&self) -> bool {
        self.waitlist.is_empty()
    }
}

impl<T> Default for Barrier<T> {
    fn default() -> Self {
        Barrier::new()
    }
}

/// Counting semaphore.
pub struct Semaphore {
    waitlist: Waitlist,
    tokens: Cell<usize>,
}

impl Semaphore {
    /// Creates a semaphore with `n` tokens to hand out.
    pub const fn new(n: usize) -> Self {
        Semaphore { waitlist: Waitlist::new(), tokens: Cell::new(n) }
    }

    /// Posts a token, resuming the next waiter if any.
    pub fn post(&self) {
        if !self.waitlist.resume_first() {
            self.tokens.set(self.tokens.get() + 1);
        }
    }

    /// Waits for a token to become available.
    pub fn wait(&self) -> Awaitable<'_> {
        match self.tokens.get() {
            0 => self.waitlist.wait(),
            n => {
                self.tokens.set(n - 1);
                Awaitable::ready()
            }
        }
    }
}
