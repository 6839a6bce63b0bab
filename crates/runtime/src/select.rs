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

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

/// Outcome of [`select2`].
#[derive(Debug, PartialEq, Eq)]
pub enum Selected2<A, B> {
    First(A),
    Second(B),
}

impl<A, B> Selected2<A, B> {
    /// Returns the 1-based index of the operation that completed.
    pub fn index(&self) -> usize {
        match self {
            Selected2::First(_) => 1,
            Selected2::Second(_) => 2,
        }
    }
}

/// Outcome of [`select3`].
#[derive(Debug, PartialEq, Eq)]
pub enum Selected3<A, B, C> {
    First(A),
    Second(B),
    Third(C),
}

impl<A, B, C> Selected3<A, B, C> {
    /// Returns the 1-based index of the operation that completed.
    pub fn index(&self) -> usize {
        match self {
            Selected3::First(_) => 1,
            Selected3::Second(_) => 2,
            Selected3::Third(_) => 3,
        }
    }
}

/// Waits on two operations until either completes, e.g.
///
/// ```ignore
/// match select2(serial.receive(&mut buf), rt.sleep(timeout)).await {
///     Selected2::First(len) => ...,
///     Selected2::Second(()) => ..., // timeout
/// }
/// ```
///
/// The first operation wins ties. The losing operation is cancelled when the
/// returned future goes out of scope at the end of the await expression.
pub fn select2<A: Future, B: Future>(a: A, b: B) -> Select2<A, B> {
    Select2 { a, b }
}

/// Waits on three operations until any completes. See [`select2`].
pub fn select3<A: Future, B: Future, C: Future>(a: A, b: B, c: C) -> Select3<A, B, C> {
    Select3 { a, b, c }
}

#[must_use = "select does nothing unless awaited"]
pub struct Select2<A, B> {
    a: A,
    b: B,
}

impl<A: Future, B: Future> Future for Select2<A, B> {
    type Output = Selected2<A::Output, B::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: the fields are pinned structurally and never moved out.
        let this = unsafe { self.get_unchecked_mut() };
        if let Poll::Ready(x) = unsafe { Pin::new_unchecked(&mut this.a) }.poll(cx) {
            return Poll::Ready(Selected2::First(x));
        }
        if let Poll::Ready(x) = unsafe { Pin::new_unchecked(&mut this.b) }.poll(cx) {
            return Poll::Ready(Selected2::Second(x));
        }
        Poll::Pending
    }
}

#[must_use = "select does nothing unless awaited"]
pub struct Select3<A, B, C> {
    a: A,
    b: B,
    c: C,
}

impl<A: Future, B: Future, C: Future> Future for Select3<A, B, C> {
    type Output = Selected3<A::Output, B::Output, C::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: the fields are pinned structurally and never moved out.
        let this = unsafe { self.get_unchecked_mut() };
        if let Poll::Ready(x) = unsafe { Pin::new_unchecked(&mut this.a) }.poll(cx) {
            return Poll::Ready(Selected3::First(x));
        }
        if let Poll::Ready(x) = unsafe { Pin::new_unchecked(&mut this.b) }.poll(cx) {
            return Poll::Ready(Selected3::Second(x));
        }
        if let Poll::Ready(x) = unsafe { Pin::new_unchecked(&mut this.c) }.poll(cx) {
            return Poll::Ready(Selected3::Third(x));
        }
        Poll::Pending
    }
}
