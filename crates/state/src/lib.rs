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

//! Persistent states such as security counters, kept on a small FRAM.
//!
//! Every state occupies a slot holding two copies of `payload ‖ counter`.
//! An update programs exactly one copy, so a torn write leaves the other
//! copy valid and restore picks the newer valid one. The sequence counter
//! is a 4-bit count stored redundantly in 8 bits (each logical bit as `01`
//! or `10`), which makes half-programmed counter bytes detectable.
//!
//! Mutations are synchronous on the in-RAM value; a flusher task makes them
//! durable shortly after, one slot at a time.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

mod fram;
mod state;

#[cfg(any(test, feature = "std"))]
pub use fram::MemFram;
pub use fram::Fram;
pub use state::{PersistentState, PersistentStateManager, StateValue};

use hearth_error::Error;

/// Result of state operations.
pub type StateResult<T> = Result<T, Error>;

/// Allocation granularity of the FRAM: each block carries one 6-byte slot
/// (payloads of 1 or 2 bytes) at offset 0 and one 10-byte slot (payloads of
/// 3 or 4 bytes) at offset 6.
pub const BLOCK_SIZE: usize = 16;
