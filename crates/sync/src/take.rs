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

use crate::Mutex;

/// A static slot whose content is installed once and taken once.
///
/// Drivers use this to hand a peripheral singleton from init code to the
/// task that owns it.
pub struct TakeCell<T>(Mutex<Option<T>>);

impl<T> TakeCell<T> {
    /// Creates a new, possibly empty, slot.
    pub const fn new(init: Option<T>) -> Self {
        TakeCell(Mutex::new(init))
    }

    /// Takes the content of the slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot is locked or empty.
    #[track_caller]
    pub fn take(&self) -> T {
        self.0.lock().take().unwrap()
    }

    /// Replaces the content of the slot, returning the previous content.
    #[track_caller]
    pub fn replace(&self, value: T) -> Option<T> {
        self.0.lock().replace(value)
    }

    /// Fills an empty slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot is locked or already full.
    #[track_caller]
    pub fn put(&self, value: T) {
        assert!(self.replace(value).is_none())
    }

    /// Executes a closure on the content of the slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot is locked or empty.
    #[track_caller]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(self.0.lock().as_mut().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_take() {
        let cell = TakeCell::new(None);
        cell.put(3);
        assert_eq!(cell.with(|x| *x), 3);
        assert_eq!(cell.take(), 3);
    }
}
