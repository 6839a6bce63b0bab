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

use alloc::vec::Vec;
use core::cell::RefCell;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

const NIL: usize = usize::MAX;

/// List of waiters belonging to one wake condition.
///
/// The list is a doubly-linked chain threaded through a slot arena, so all
/// link and unlink operations are O(1) and waiters are plain indices. Each
/// waiter may carry a value `T` that resume predicates inspect, e.g. a sleep
/// deadline.
///
/// Only task context touches a waitlist; the borrow panics if a resume
/// predicate tries to re-enter the list.
pub struct Waitlist<T = ()> {
    inner: RefCell<Inner<T>>,
}

struct Inner<T> {
    slots: Vec<Entry<T>>,
    free: usize,
    head: usize,
    tail: usize,
}

enum Entry<T> {
    Vacant(usize),
    Occupied(Node<T>),
}

struct Node<T> {
    prev: usize,
    next: usize,
    /// Unlinked waiters are ready.
    linked: bool,
    waker: Option<Waker>,
    value: T,
}

impl<T> Inner<T> {
    fn node(&self, key: usize) -> &Node<T> {
        match &self.slots[key] {
            Entry::Occupied(node) => node,
            Entry::Vacant(_) => unreachable!(),
        }
    }

    fn node_mut(&mut self, key: usize) -> &mut Node<T> {
        match &mut self.slots[key] {
            Entry::Occupied(node) => node,
            Entry::Vacant(_) => unreachable!(),
        }
    }

    /// Links a new waiter at the tail.
    fn alloc(&mut self, value: T) -> usize {
        let node = Node { prev: self.tail, next: NIL, linked: true, waker: None, value };
        let key = match self.free {
            NIL => {
                self.slots.push(Entry::Occupied(node));
                self.slots.len() - 1
            }
            key => {
                self.free = match self.slots[key] {
                    Entry::Vacant(next) => next,
                    Entry::Occupied(_) => unreachable!(),
                };
                self.slots[key] = Entry::Occupied(node);
                key
            }
        };
        match self.tail {
            NIL => self.head = key,
            tail => self.node_mut(tail).next = key,
        }
        self.tail = key;
        key
    }

    /// Takes a waiter out of the chain, marking it ready.
    fn unlink(&mut self, key: usize) {
        let node = self.node_mut(key);
        if !node.linked {
            return;
        }
        node.linked = false;
        let (prev, next) = (node.prev, node.next);
        node.prev = NIL;
        node.next = NIL;
        match prev {
            NIL => self.head = next,
            prev => self.node_mut(prev).next = next,
        }
        match next {
            NIL => self.tail = prev,
            next => self.node_mut(next).prev = prev,
        }
    }

    fn release(&mut self, key: usize) {
        self.unlink(key);
        self.slots[key] = Entry::Vacant(self.free);
        self.free = key;
    }
}

impl<T> Waitlist<T> {
    /// Creates an empty waitlist.
    pub const fn new() -> Self {
        Waitlist {
            inner: RefCell::new(Inner { slots: Vec::new(), free: NIL, head: NIL, tail: NIL }),
        }
    }

    /// Returns whether no waiter is linked.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().head == NIL
    }

    /// Links a new waiter carrying `value` at the tail.
    pub fn wait_with(&self, value: T) -> Awaitable<'_, T> {
        let key = self.inner.borrow_mut().alloc(value);
        Awaitable { list: Some(self), key }
    }

    /// Links a new waiter at the tail.
    pub fn wait(&self) -> Awaitable<'_, T>
    where T: Default {
        self.wait_with(T::default())
    }

    /// Resumes the first waiter. Returns whether one was waiting.
    pub fn resume_first(&self) -> bool {
        let waker = {
            let mut inner = self.inner.borrow_mut();
            let key = inner.head;
            if key == NIL {
                return false;
            }
            inner.unlink(key);
            inner.node_mut(key).waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Resumes the first waiter if its value matches the predicate. Returns
    /// whether the list was non-empty.
    pub fn resume_first_if(&self, predicate: impl FnOnce(&T) -> bool) -> bool {
        let waker = {
            let mut inner = self.inner.borrow_mut();
            let key = inner.head;
            if key == NIL {
                return false;
            }
            if !predicate(&inner.node(key).value) {
                return true;
            }
            inner.unlink(key);
            inner.node_mut(key).waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        true
    }

    /// Resumes every waiter that is linked when the call starts. Waiters
    /// re-arming during the sweep land at the tail and are not visited.
    pub fn resume_all(&self) {
        self.resume_all_if(|_| true)
    }

    /// Resumes every currently linked waiter whose value matches the
    /// predicate.
    pub fn resume_all_if(&self, mut predicate: impl FnMut(&T) -> bool) {
        let wakers = {
            let mut inner = self.inner.borrow_mut();
            let last = inner.tail;
            let mut wakers = Vec::new();
            if last != NIL {
                let mut current = inner.head;
                loop {
                    let next = inner.node(current).next;
                    if predicate(&inner.node(current).value) {
                        inner.unlink(current);
                        if let Some(waker) = inner.node_mut(current).waker.take() {
                            wakers.push(waker);
                        }
                    }
                    if current == last {
                        break;
                    }
                    current = next;
                }
            }
            wakers
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Resumes the first waiter whose value matches the predicate.
    pub fn resume_one(&self, mut predicate: impl FnMut(&T) -> bool) {
        let waker = {
            let mut inner = self.inner.borrow_mut();
            let last = inner.tail;
            if last == NIL {
                return;
            }
            let mut current = inner.head;
            loop {
                let next = inner.node(current).next;
                if predicate(&inner.node(current).value) {
                    inner.unlink(current);
                    break inner.node_mut(current).waker.take();
                }
                if current == last {
                    return;
                }
                current = next;
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Returns whether a linked waiter matches the predicate.
    pub fn contains(&self, mut predicate: impl FnMut(&T) -> bool) -> bool {
        let inner = self.inner.borrow();
        let mut current = inner.head;
        while current != NIL {
            if predicate(&inner.node(current).value) {
                return true;
            }
            current = inner.node(current).next;
        }
        false
    }

    /// Folds over the values of all linked waiters.
    pub fn fold_values<R>(&self, init: R, mut f: impl FnMut(R, &T) -> R) -> R {
        let inner = self.inner.borrow();
        let mut accum = init;
        let mut current = inner.head;
        while current != NIL {
            accum = f(accum, &inner.node(current).value);
            current = inner.node(current).next;
        }
        accum
    }

    /// Links a raw waiter at the tail. Used where an [`Awaitable`] cannot
    /// borrow the list, e.g. task join handles.
    pub(crate) fn link(&self, value: T) -> usize {
        self.inner.borrow_mut().alloc(value)
    }

    pub(crate) fn linked(&self, key: usize) -> bool {
        self.inner.borrow().node(key).linked
    }

    pub(crate) fn set_waker(&self, key: usize, waker: &Waker) {
        self.inner.borrow_mut().node_mut(key).waker = Some(waker.clone());
    }

    pub(crate) fn release(&self, key: usize) {
        self.inner.borrow_mut().release(key);
    }
}

impl<T> Default for Waitlist<T> {
    fn default() -> Self {
        Waitlist::new()
    }
}

/// A single waiter of a [`Waitlist`].
///
/// The waiter is linked on construction and unlinked by resumption or drop,
/// whichever comes first; awaiting it suspends until it is unlinked. Each
/// awaitable owns its list element, so moving the awaitable moves the list
/// membership and leaving the scope cancels the wait.
#[must_use = "an awaitable does nothing unless awaited"]
pub struct Awaitable<'a, T = ()> {
    list: Option<&'a Waitlist<T>>,
    key: usize,
}

impl<T> Awaitable<'_, T> {
    /// Creates an already-ready awaitable.
    pub const fn ready() -> Self {
        Awaitable { list: None, key: NIL }
    }

    /// Returns whether the waiter has been resumed (or never waited).
    pub fn is_ready(&self) -> bool {
        match self.list {
            None => true,
            Some(list) => !list.linked(self.key),
        }
    }

    /// Unlinks the waiter, making the awaitable ready without a resume.
    pub fn cancel(&mut self) {
        if let Some(list) = self.list.take() {
            list.release(self.key);
        }
    }
}

impl<T> Drop for Awaitable<'_, T> {
    fn drop(&mut self) {
        if let Some(list) = self.list {
            list.release(self.key);
        }
    }
}

impl<T> Future for Awaitable<'_, T> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match this.list {
            Some(list) if list.linked(this.key) => {
                list.set_waker(this.key, cx.waker());
                Poll::Pending
            }
            _ => Poll::Ready(()),
        }
    }
}
