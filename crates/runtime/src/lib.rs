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

//! Single-threaded cooperative task runtime.
//!
//! Tasks are plain `async` functions driven by the [`Runtime`] event loop.
//! They suspend only at `.await` points, so no locks are needed between
//! task-code sections. Drivers park tasks on [`Waitlist`]s and interrupt
//! routines never touch those lists: they raise `hearth_sync::Interrupt`
//! bits which event-loop handlers drain in task context before resuming the
//! waiters.
//!
//! Resuming a waiter unlinks its list element first; a resumed task that
//! immediately waits again links a fresh element at the tail and is not
//! visited by the sweep that woke it.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

mod driver;
mod executor;
mod select;
mod sync;
mod time;
mod waitlist;

pub use driver::{Interrupt, Serial, SpiMaster};
#[cfg(any(test, feature = "std"))]
pub use executor::{HostEnv, ManualClock, ManualEnv};
pub use executor::{Env, Runtime, Task};
pub use select::{Select2, Select3, Selected2, Selected3, select2, select3};
pub use sync::{Barrier, Event, Semaphore};
pub use time::{SystemDuration, SystemTime};
pub use waitlist::{Awaitable, Waitlist};
