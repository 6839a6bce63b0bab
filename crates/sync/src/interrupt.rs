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

use portable_atomic::{AtomicU32, Ordering};

/// A word of pending soft interrupts.
///
/// Interrupt routines raise bits; the driver's event-loop handler drains
/// them in task context and resumes waitlists. Interrupt routines never
/// touch waitlists themselves.
pub struct Interrupt(AtomicU32);

impl Interrupt {
    /// Creates a word with no interrupt pending.
    pub const fn new() -> Self {
        Interrupt(AtomicU32::new(0))
    }

    /// Raises pending bits. Safe to call from interrupt context.
    pub fn raise(&self, bits: u32) {
        self.0.fetch_or(bits, Ordering::Release);
    }

    /// Takes and clears all pending bits.
    pub fn drain(&self) -> u32 {
        self.0.swap(0, Ordering::Acquire)
    }

    /// Returns whether any of the given bits is pending, without clearing.
    pub fn pending(&self, bits: u32) -> bool {
        self.0.load(Ordering::Relaxed) & bits != 0
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Interrupt::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_drain() {
        let irq = Interrupt::new();
        irq.raise(1);
        irq.raise(4);
        assert!(irq.pending(5));
        assert_eq!(irq.drain(), 5);
        assert_eq!(irq.drain(), 0);
    }
}
