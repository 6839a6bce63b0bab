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

//! Log-structured storage of multiple arrays of variable-size elements on
//! raw NOR flash.
//!
//! The flash area is split into two equal regions of which exactly one is
//! active. Mutations append 4-byte log headers (plus payload for writes) to
//! the active region; when the region is full, all live elements are copied
//! to the other region and the regions swap roles. A region is active iff
//! the `op` byte of its first header is programmed, and that byte is written
//! last during a region switch, so power loss at any point leaves one
//! coherent region.
//!
//! Each element is a pair of an immutable flash payload and a mutable RAM
//! companion allocated from a single arena. The in-RAM index (rebuilt from
//! the log on [`Store::init`]) maps every element to its region-relative
//! flash offset and its arena offset.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

mod flash;
mod store;

pub use flash::{Flash, FlashInfo};
#[cfg(any(test, feature = "std"))]
pub use flash::{FileFlash, MemFlash};
pub use store::{ArrayIndex, Elements, SizeFn, Store};

use hearth_error::Error;
#[cfg(test)]
use tempfile as _;

/// Result of storage operations.
pub type StoreResult<T> = Result<T, Error>;

/// Absolute cap on elements across all arrays.
pub const MAX_ELEMENT_COUNT: usize = 256;

/// Bytes available in the RAM arena.
pub const RAM_SIZE: usize = 16384;

/// Size of a log header in bytes.
pub(crate) const HEADER_SIZE: usize = 4;

/// Alignment of RAM companions within the arena.
pub(crate) const RAM_ALIGN: usize = 4;

/// Rounds a RAM companion size up to the arena alignment.
pub(crate) const fn ram_align(size: usize) -> usize {
    (size + RAM_ALIGN - 1) & !(RAM_ALIGN - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ram_align_rounds_up() {
        assert_eq!(ram_align(0), 0);
        assert_eq!(ram_align(1), 4);
        assert_eq!(ram_align(4), 4);
        assert_eq!(ram_align(5), 8);
    }
}

