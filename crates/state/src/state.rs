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

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::marker::PhantomData;

use hearth_logger as log;
use hearth_runtime::Barrier;

use crate::fram::Fram;
use crate::{BLOCK_SIZE, StateResult};

/// A value that fits a persistent state slot.
pub trait StateValue: Copy {
    /// Payload size in bytes, at most 4.
    const SIZE: usize;

    fn to_bytes(self) -> [u8; 4];
    fn from_bytes(bytes: [u8; 4]) -> Self;
    fn wrapping_increment(self) -> Self;
    fn wrapping_decrement(self) -> Self;
}

macro_rules! impl_state_value {
    ($($int:ty),*) => { $(
        impl StateValue for $int {
            const SIZE: usize = core::mem::size_of::<$int>();

            fn to_bytes(self) -> [u8; 4] {
                let mut bytes = [0; 4];
                bytes[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                bytes
            }

            fn from_bytes(bytes: [u8; 4]) -> Self {
                Self::from_le_bytes(bytes[..Self::SIZE].try_into().unwrap())
            }

            fn wrapping_increment(self) -> Self {
                self.wrapping_add(1)
            }

            fn wrapping_decrement(self) -> Self {
                self.wrapping_sub(1)
            }
        }
    )* };
}

impl_state_value!(u8, u16, u32, i8, i16, i32);

/// A sequence counter byte is valid iff every bit pair is `01` or `10`.
const fn counter_valid(counter: u8) -> bool {
    ((counter ^ (counter >> 1)) & 0x55) == 0x55
}

/// Advances the redundant encoding: `01 -> 10`, `10 -> 01` with carry into
/// the next bit pair. Wraps after 16 steps.
const fn counter_next(mut counter: u8) -> u8 {
    let mut bit: u8 = 1;
    while bit != 0 {
        counter = counter.wrapping_add(bit);
        if counter & bit != 0 {
            counter &= !(bit << 1);
        } else {
            break;
        }
        bit <<= 2;
    }
    counter
}

/// Counter value representing zero updates; both copies untouched.
const COUNTER_INIT: u8 = 0x55;

struct SlotRecord {
    /// FRAM offset of copy 0.
    offset: usize,
    /// Payload size in bytes.
    size: usize,
    counter: u8,
    value: [u8; 4],
    dirty: bool,
}

struct Shared<F: Fram> {
    fram: RefCell<F>,
    /// One bit per slot; the lower half of the table covers the 6-byte
    /// slots, the upper half the 10-byte slots.
    bitmap: RefCell<Vec<u32>>,
    slots: RefCell<Vec<SlotRecord>>,
    dirty: RefCell<VecDeque<usize>>,
    signal: Barrier,
}

/// Manager for persistent states such as security counters.
///
/// States restore synchronously; updates are made durable by the
/// [`PersistentStateManager::flusher`] task.
pub struct PersistentStateManager<F: Fram> {
    shared: Rc<Shared<F>>,
}

impl<F: Fram> Clone for PersistentStateManager<F> {
    fn clone(&self) -> Self {
        PersistentStateManager { shared: self.shared.clone() }
    }
}

impl<F: Fram> PersistentStateManager<F> {
    /// Creates a manager over the whole FRAM.
    pub fn new(fram: F) -> Self {
        let size = fram.size();
        assert!(size >= 16 * BLOCK_SIZE && size % (16 * BLOCK_SIZE) == 0);
        PersistentStateManager {
            shared: Rc::new(Shared {
                fram: RefCell::new(fram),
                bitmap: RefCell::new(vec![0; size / 8 / 32]),
                slots: RefCell::new(Vec::new()),
                dirty: RefCell::new(VecDeque::new()),
                signal: Barrier::new(),
            }),
        }
    }

    /// Allocates a fresh state. Only call this after all existing states
    /// have been restored, so their slots are marked in the bitmap.
    ///
    /// # Panics
    ///
    /// Panics when no slot is free.
    pub fn allocate<T: StateValue>(&self, default: T) -> PersistentState<T, F> {
        debug_assert!(T::SIZE >= 1 && T::SIZE <= 4);
        let offset = self.allocate_offset(T::SIZE);
        self.insert(offset, T::SIZE, COUNTER_INIT, default.to_bytes())
    }

    /// Restores a state from its known slot offset.
    ///
    /// If neither copy holds a valid counter, e.g. on first boot, the state
    /// starts from `default`; otherwise the newer valid copy wins.
    pub fn restore<T: StateValue>(
        &self, offset: usize, default: T,
    ) -> StateResult<PersistentState<T, F>> {
        debug_assert!(T::SIZE >= 1 && T::SIZE <= 4);
        let size = T::SIZE;
        self.mark(offset);

        let mut value = default.to_bytes();
        let mut counter = COUNTER_INIT;
        {
            let fram = self.shared.fram.borrow();
            let mut byte = [0];
            fram.read(offset + size, &mut byte)?;
            let c0 = byte[0];
            fram.read(offset + 2 * size + 1, &mut byte)?;
            let c1 = byte[0];
            let newer_is_copy1 = match (counter_valid(c0), counter_valid(c1)) {
                (false, false) => None,
                (true, false) => Some(false),
                (false, true) => Some(true),
                (true, true) => Some((c0.wrapping_sub(c1) as i8) < 0),
            };
            if let Some(copy1) = newer_is_copy1 {
                let from = if copy1 { offset + size + 1 } else { offset };
                let mut buffer = [0; 5];
                fram.read(from, &mut buffer[..size + 1])?;
                value[..size].copy_from_slice(&buffer[..size]);
                counter = buffer[size];
            }
        }
        Ok(self.insert(offset, size, counter, value))
    }

    /// Runs forever, making dirty states durable as they are signalled.
    /// Spawn this on the runtime.
    pub fn flusher(&self) -> impl Future<Output = ()> + 'static
    where F: 'static {
        let shared = self.shared.clone();
        async move {
            loop {
                if shared.dirty.borrow().is_empty() {
                    shared.signal.wait().await;
                }
                if let Err(error) = drain(&shared) {
                    log::warn!("state flush failed: {}", error);
                    // hold the dirty slot until something new happens
                    shared.signal.wait().await;
                }
            }
        }
    }

    /// Synchronously persists all dirty states.
    pub fn flush(&self) -> StateResult<()> {
        drain(&self.shared)
    }

    fn insert<T: StateValue>(
        &self, offset: usize, size: usize, counter: u8, value: [u8; 4],
    ) -> PersistentState<T, F> {
        let mut slots = self.shared.slots.borrow_mut();
        slots.push(SlotRecord { offset, size, counter, value, dirty: false });
        PersistentState { shared: self.shared.clone(), slot: slots.len() - 1, value: PhantomData }
    }

    /// Marks the slot containing `offset` as occupied.
    fn mark(&self, offset: usize) {
        let block = offset / BLOCK_SIZE;
        let bit = 1 << (block & 31);
        let mut index = block / 32;
        if offset % BLOCK_SIZE > 0 {
            index += self.shared.bitmap.borrow().len() / 2;
        }
        self.shared.bitmap.borrow_mut()[index] |= bit;
    }

    fn allocate_offset(&self, size: usize) -> usize {
        let mut bitmap = self.shared.bitmap.borrow_mut();
        let half = bitmap.len() / 2;
        // small payloads fit the 6-byte slots of the lower half; they may
        // spill into 10-byte slots once those run out
        let start = if size <= 2 { 0 } else { half };
        for index in start..bitmap.len() {
            if bitmap[index] == u32::MAX {
                continue;
            }
            for shift in 0..32 {
                let bit = 1 << shift;
                if bitmap[index] & bit == 0 {
                    bitmap[index] |= bit;
                    return match index < half {
                        true => (index * 32 + shift) * BLOCK_SIZE,
                        false => ((index - half) * 32 + shift) * BLOCK_SIZE + 6,
                    };
                }
            }
        }
        panic!("out of persistent state slots");
    }
}

/// Writes every dirty slot, one copy per update.
fn drain<F: Fram>(shared: &Shared<F>) -> StateResult<()> {
    loop {
        let slot = shared.dirty.borrow_mut().pop_front();
        let Some(slot) = slot else { return Ok(()) };
        let (offset, size, counter, value) = {
            let slots = shared.slots.borrow();
            let record = &slots[slot];
            (record.offset, record.size, record.counter, record.value)
        };
        let next = counter_next(counter);
        // even counters commit copy 0, odd ones copy 1
        let target = match next & 1 {
            0 => offset,
            _ => offset + size + 1,
        };
        let mut buffer = [0; 5];
        buffer[..size].copy_from_slice(&value[..size]);
        buffer[size] = next;
        if let Err(error) = shared.fram.borrow_mut().write(target, &buffer[..size + 1]) {
            shared.dirty.borrow_mut().push_front(slot);
            return Err(error);
        }
        let mut slots = shared.slots.borrow_mut();
        slots[slot].counter = next;
        slots[slot].dirty = false;
    }
}

/// A persistent value with implicit durability.
///
/// Reads and writes touch only RAM; every mutation queues the slot for the
/// flusher. The handle can move freely, taking its pending dirtiness along.
/// There is no way to free a slot.
pub struct PersistentState<T: StateValue, F: Fram> {
    shared: Rc<Shared<F>>,
    slot: usize,
    value: PhantomData<T>,
}

impl<T: StateValue, F: Fram> PersistentState<T, F> {
    /// Returns the current value.
    pub fn get(&self) -> T {
        T::from_bytes(self.shared.slots.borrow()[self.slot].value)
    }

    /// Sets the value and schedules persistence.
    pub fn set(&self, value: T) {
        self.shared.slots.borrow_mut()[self.slot].value = value.to_bytes();
        self.mark_dirty();
    }

    /// Increments and returns the new value.
    pub fn increment(&self) -> T {
        let value = self.get().wrapping_increment();
        self.set(value);
        value
    }

    /// Increments and returns the previous value.
    pub fn post_increment(&self) -> T {
        let value = self.get();
        self.set(value.wrapping_increment());
        value
    }

    /// Decrements and returns the new value.
    pub fn decrement(&self) -> T {
        let value = self.get().wrapping_decrement();
        self.set(value);
        value
    }

    /// Decrements and returns the previous value.
    pub fn post_decrement(&self) -> T {
        let value = self.get();
        self.set(value.wrapping_decrement());
        value
    }

    /// Returns the FRAM offset of the slot, e.g. to store in configuration.
    pub fn offset(&self) -> usize {
        self.shared.slots.borrow()[self.slot].offset
    }

    fn mark_dirty(&self) {
        {
            let mut slots = self.shared.slots.borrow_mut();
            if slots[self.slot].dirty {
                return;
            }
            slots[self.slot].dirty = true;
        }
        self.shared.dirty.borrow_mut().push_back(self.slot);
        self.shared.signal.resume_first();
    }
}
