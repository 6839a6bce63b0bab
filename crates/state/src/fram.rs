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

use hearth_error::Error;

use crate::StateResult;

/// Byte-addressable non-volatile memory. Writes need no erase and are
/// assumed to program in offset order, so power loss truncates a write.
pub trait Fram {
    /// Returns the device size in bytes.
    fn size(&self) -> usize;

    /// Reads `data.len()` bytes starting at `offset`.
    fn read(&self, offset: usize, data: &mut [u8]) -> StateResult<()>;

    /// Writes `data` starting at `offset`.
    fn write(&mut self, offset: usize, data: &[u8]) -> StateResult<()>;
}

/// RAM-backed FRAM for tests and the emulator.
///
/// Clones share the same backing bytes, so a clone kept outside the manager
/// observes what became durable and can tamper with it.
#[cfg(any(test, feature = "std"))]
#[derive(Clone)]
pub struct MemFram {
    shared: std::rc::Rc<Shared>,
}

#[cfg(any(test, feature = "std"))]
struct Shared {
    data: std::cell::RefCell<Vec<u8>>,
    writes: std::cell::RefCell<Vec<(usize, usize)>>,
}

#[cfg(any(test, feature = "std"))]
impl MemFram {
    /// Creates a zeroed device. Both counter copies of a zeroed slot are
    /// invalid, so every state restores to its default.
    pub fn new(size: usize) -> Self {
        MemFram {
            shared: std::rc::Rc::new(Shared {
                data: std::cell::RefCell::new(vec![0; size]),
                writes: std::cell::RefCell::new(Vec::new()),
            }),
        }
    }

    /// Returns a copy of the device content.
    pub fn snapshot(&self) -> Vec<u8> {
        self.shared.data.borrow().clone()
    }

    /// Overwrites one byte behind the driver's back, e.g. to simulate a
    /// torn write.
    pub fn poke(&self, offset: usize, byte: u8) {
        self.shared.data.borrow_mut()[offset] = byte;
    }

    /// Returns the `(offset, length)` journal of all writes so far.
    pub fn writes(&self) -> Vec<(usize, usize)> {
        self.shared.writes.borrow().clone()
    }
}

#[cfg(any(test, feature = "std"))]
impl Fram for MemFram {
    fn size(&self) -> usize {
        self.shared.data.borrow().len()
    }

    fn read(&self, offset: usize, data: &mut [u8]) -> StateResult<()> {
        let bytes = self.shared.data.borrow();
        Error::OutOfBounds.check(offset + data.len() <= bytes.len())?;
        data.copy_from_slice(&bytes[offset..offset + data.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> StateResult<()> {
        let mut bytes = self.shared.data.borrow_mut();
        Error::OutOfBounds.check(offset + data.len() <= bytes.len())?;
        bytes[offset..offset + data.len()].copy_from_slice(data);
        self.shared.writes.borrow_mut().push((offset, data.len()));
        Ok(())
    }
}
