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

/// Non-blocking non-reentrant mutex.
///
/// On a cooperative single-core system a lock can only be observed taken if
/// the holder forgot to release it before suspending, so locking an
/// already-locked mutex panics instead of spinning.
pub struct Mutex<T>(spin::Mutex<T>);

/// Provides access to the content of a locked mutex until dropped.
pub type MutexGuard<'a, T> = spin::MutexGuard<'a, T>;

impl<T> Mutex<T> {
    /// Creates a new mutex.
    pub const fn new(data: T) -> Self {
        Mutex(spin::Mutex::new(data))
    }

    /// Tries to lock the mutex.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        self.0.try_lock()
    }

    /// Locks the mutex.
    ///
    /// # Panics
    ///
    /// Panics if it is already locked.
    #[track_caller]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.try_lock().unwrap()
    }

    /// Consumes the mutex.
    pub fn into_inner(self) -> T {
        self.0.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_unlock() {
        static MUTEX: Mutex<u32> = Mutex::new(7);
        *MUTEX.lock() += 1;
        assert_eq!(*MUTEX.lock(), 8);
    }

    #[test]
    #[should_panic]
    fn reentrant_lock() {
        let mutex = Mutex::new(());
        let _guard = mutex.lock();
        mutex.lock();
    }
}
