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

use alloc::borrow::Cow;
use alloc::vec;
use alloc::vec::Vec;

use hearth_error::Error;
use hearth_logger as log;

use crate::{HEADER_SIZE, MAX_ELEMENT_COUNT, RAM_SIZE, StoreResult, ram_align};
use crate::flash::Flash;

const OP_OVERWRITE: u8 = 0x00;
const OP_ERASE: u8 = 0x01;
const OP_MOVE: u8 = 0x02;
const OP_INVALID: u8 = 0xff;

/// Computes the size of an element from its leading bytes.
///
/// For the flash size the slice starts at the element and may extend beyond
/// it; for the RAM size the slice is exactly the flash payload.
pub type SizeFn = fn(&[u8]) -> usize;

/// Handle of a registered array.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ArrayIndex(u8);

struct ArrayData {
    /// First slot of this array in the element tables.
    start: usize,
    count: usize,
    flash_size: SizeFn,
    ram_size: SizeFn,
}

#[derive(Copy, Clone, Default)]
struct Slot {
    /// Payload offset relative to the active region base.
    offset: u32,
    flash_size: u32,
    ram_size: u32,
}

/// Log-structured multi-array store on a [`Flash`] device.
///
/// Arrays are registered before [`Store::init`] and never destroyed. All
/// mutations are durable when the call returns; power loss at any point
/// rolls back to the last complete log entry.
pub struct Store<F: Flash> {
    flash: F,
    page_start: usize,
    /// Pages per region (half the managed range).
    region_pages: usize,
    page_size: usize,
    align: usize,
    word: usize,

    arrays: Vec<ArrayData>,
    /// One entry per element, in array registration order.
    slots: Vec<Slot>,
    /// Arena offset per element plus the high-water sentinel.
    ram_offsets: Vec<u32>,
    ram: Vec<u8>,

    /// Device offset of the active region.
    region_base: usize,
    /// Device offset of the next log append.
    cursor: usize,
    /// Accumulated exact flash payload bytes.
    flash_total: usize,
    initialized: bool,
}

impl<F: Flash> Store<F> {
    /// Creates a store over `page_count` pages starting at `page_start`.
    ///
    /// The range is split into two equal regions; `page_count` must be even.
    pub fn new(flash: F, page_start: usize, page_count: usize) -> Self {
        let info = flash.info();
        assert!(page_count >= 2 && page_count % 2 == 0);
        assert!(page_start + page_count <= info.page_count);
        assert!(info.word_size.is_power_of_two());
        let align = info.word_size.max(4);
        assert!(info.page_size % align == 0);
        Store {
            flash,
            page_start,
            region_pages: page_count / 2,
            page_size: info.page_size,
            align,
            word: info.word_size,
            arrays: Vec::new(),
            slots: Vec::new(),
            ram_offsets: Vec::new(),
            ram: Vec::new(),
            region_base: 0,
            cursor: 0,
            flash_total: 0,
            initialized: false,
        }
    }

    /// Registers an array. Must be called before [`Store::init`].
    pub fn register(&mut self, flash_size: SizeFn, ram_size: SizeFn) -> ArrayIndex {
        assert!(!self.initialized);
        assert!(self.arrays.len() < usize::from(u8::MAX));
        let index = self.arrays.len() as u8;
        self.arrays.push(ArrayData { start: 0, count: 0, flash_size, ram_size });
        ArrayIndex(index)
    }

    /// Detects the active region, replays its log, and allocates the RAM
    /// arena.
    pub fn init(&mut self) -> StoreResult<()> {
        assert!(!self.initialized);
        self.slots.reserve_exact(MAX_ELEMENT_COUNT);
        self.ram_offsets.reserve_exact(MAX_ELEMENT_COUNT + 1);

        // The first region is active iff the op byte of its first header is
        // programmed.
        let first = self.region_offset(0);
        let head = self.flash.read(first, HEADER_SIZE)?;
        let active = usize::from(head[3] == OP_INVALID);
        self.region_base = self.region_offset(active);

        // The other region must be erased, e.g. after power loss during a
        // region switch.
        for page in self.region_page_range(1 - active) {
            if !self.flash.is_erased(page)? {
                self.flash.erase_page(page)?;
            }
        }

        self.replay()?;

        // Allocate RAM companions sequentially and the end sentinel.
        let mut offset = 0usize;
        self.flash_total = 0;
        for slot in &self.slots {
            self.ram_offsets.push(offset as u32);
            offset += ram_align(slot.ram_size as usize);
            self.flash_total += slot.flash_size as usize;
        }
        self.ram_offsets.push(offset as u32);
        Error::RamFull.check(offset <= RAM_SIZE)?;
        self.ram = vec![0; RAM_SIZE];

        self.initialized = true;
        Ok(())
    }

    /// Returns the number of elements of an array.
    pub fn count(&self, array: ArrayIndex) -> usize {
        self.arrays[usize::from(array.0)].count
    }

    /// Returns the total number of elements across all arrays.
    pub fn element_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the flash payload of an element.
    pub fn read(&self, array: ArrayIndex, index: usize) -> StoreResult<Cow<'_, [u8]>> {
        let slot = self.slots[self.global(array, index)];
        self.flash.read(self.region_base + slot.offset as usize, slot.flash_size as usize)
    }

    /// Returns the RAM companion of an element.
    pub fn ram(&self, array: ArrayIndex, index: usize) -> &[u8] {
        let g = self.global(array, index);
        let offset = self.ram_offsets[g] as usize;
        &self.ram[offset..offset + self.slots[g].ram_size as usize]
    }

    /// Returns the mutable RAM companion of an element.
    pub fn ram_mut(&mut self, array: ArrayIndex, index: usize) -> &mut [u8] {
        let g = self.global(array, index);
        let offset = self.ram_offsets[g] as usize;
        &mut self.ram[offset..offset + self.slots[g].ram_size as usize]
    }

    /// Iterates over the elements of an array.
    pub fn iter(&self, array: ArrayIndex) -> Elements<'_, F> {
        Elements { store: self, array, index: 0 }
    }

    /// Returns whether an additional element with this payload would fit.
    pub fn has_space(&self, array: ArrayIndex, flash_payload: &[u8]) -> bool {
        let data = &self.arrays[usize::from(array.0)];
        let ram_size = (data.ram_size)(flash_payload);
        self.check_capacity(flash_payload.len() as isize, ram_align(ram_size) as isize, true)
            .is_ok()
    }

    /// Overwrites or appends an element.
    ///
    /// `index` must be at most the element count; writing at the count
    /// appends. Without `ram_payload` the companion keeps its old bytes and
    /// only newly covered bytes are zeroed. On error nothing changed.
    pub fn write(
        &mut self, array: ArrayIndex, index: usize, flash_payload: &[u8],
        ram_payload: Option<&[u8]>,
    ) -> StoreResult<()> {
        assert!(self.initialized);
        let a = usize::from(array.0);
        let count = self.arrays[a].count;
        assert!(index <= count);
        let append = index == count;

        let new_fs = flash_payload.len();
        debug_assert_eq!((self.arrays[a].flash_size)(flash_payload), new_fs);
        let new_rs = (self.arrays[a].ram_size)(flash_payload);
        let g = self.arrays[a].start + index;
        let (old_fs, old_rs) = match append {
            true => (0, 0),
            false => (self.slots[g].flash_size as usize, self.slots[g].ram_size as usize),
        };
        let flash_change = new_fs as isize - old_fs as isize;
        let ram_change = ram_align(new_rs) as isize - ram_align(old_rs) as isize;
        self.check_capacity(flash_change, ram_change, append)?;
        if append {
            // the index and value header fields are single bytes
            Error::SlotsFull.check(count < usize::from(u8::MAX))?;
        }

        if append {
            self.insert_slot(a, index);
        }
        self.flash_total = (self.flash_total as isize + flash_change) as usize;
        self.slots[g].flash_size = new_fs as u32;
        self.slots[g].ram_size = new_rs as u32;

        let header_size = self.flash_align(HEADER_SIZE);
        let payload_size = self.flash_align(new_fs);
        if self.cursor + header_size + payload_size <= self.region_end() {
            self.program(self.cursor, &[array.0, index as u8, 1, OP_OVERWRITE])?;
            self.cursor += header_size;
            self.slots[g].offset = (self.cursor - self.region_base) as u32;
            self.program(self.cursor, flash_payload)?;
            self.cursor += payload_size;
        } else {
            self.switch_regions(Some((g, flash_payload)))?;
        }

        self.ram_insert(g + 1, ram_change);
        let offset = self.ram_offsets[g] as usize;
        match ram_payload {
            Some(ram_payload) => {
                debug_assert_eq!(ram_payload.len(), new_rs);
                self.ram[offset..offset + new_rs].copy_from_slice(ram_payload);
            }
            None => {
                for byte in &mut self.ram[offset + old_rs.min(new_rs)..offset + new_rs] {
                    *byte = 0;
                }
            }
        }
        Ok(())
    }

    /// Erases an element, shifting the rest of the array down.
    pub fn erase(&mut self, array: ArrayIndex, index: usize) -> StoreResult<()> {
        assert!(self.initialized);
        let a = usize::from(array.0);
        assert!(index < self.arrays[a].count);
        let g = self.arrays[a].start + index;

        let aligned_ram = (self.ram_offsets[g + 1] - self.ram_offsets[g]) as usize;
        let content_begin = self.ram_offsets[g + 1] as usize;
        let content_end = self.ram_high();
        self.flash_total -= self.slots[g].flash_size as usize;
        self.remove_slot(a, index);

        let header_size = self.flash_align(HEADER_SIZE);
        if self.cursor + header_size <= self.region_end() {
            self.program(self.cursor, &[array.0, index as u8, 1, OP_ERASE])?;
            self.cursor += header_size;
        } else {
            self.switch_regions(None)?;
        }

        // reclaim the companion bytes
        self.ram.copy_within(content_begin..content_end, content_begin - aligned_ram);
        Ok(())
    }

    /// Moves an element to a new index, shifting the elements in between.
    pub fn move_to(
        &mut self, array: ArrayIndex, index: usize, new_index: usize,
    ) -> StoreResult<()> {
        assert!(self.initialized);
        let a = usize::from(array.0);
        assert!(index < self.arrays[a].count);
        assert!(new_index < self.arrays[a].count);
        if index == new_index {
            return Ok(());
        }
        let start = self.arrays[a].start;
        let (from, to) = (start + index, start + new_index);
        let aligned_ram = (self.ram_offsets[from + 1] - self.ram_offsets[from]) as usize;

        let (lo, hi) = (from.min(to), from.max(to));
        let span_start = self.ram_offsets[lo] as usize;
        let span_end = self.ram_offsets[hi + 1] as usize;
        let span = &mut self.ram[span_start..span_end];
        match from < to {
            true => span.rotate_left(aligned_ram),
            false => span.rotate_right(aligned_ram),
        }
        let slot = self.slots.remove(from);
        self.slots.insert(to, slot);
        for g in lo..hi {
            self.ram_offsets[g + 1] =
                self.ram_offsets[g] + ram_align(self.slots[g].ram_size as usize) as u32;
        }

        let header_size = self.flash_align(HEADER_SIZE);
        if self.cursor + header_size <= self.region_end() {
            self.program(self.cursor, &[array.0, index as u8, new_index as u8, OP_MOVE])?;
            self.cursor += header_size;
        } else {
            self.switch_regions(None)?;
        }
        Ok(())
    }

    /// Consumes the store and returns the flash device.
    pub fn into_flash(self) -> F {
        self.flash
    }

    fn global(&self, array: ArrayIndex, index: usize) -> usize {
        let data = &self.arrays[usize::from(array.0)];
        assert!(index < data.count);
        data.start + index
    }

    fn region_offset(&self, region: usize) -> usize {
        (self.page_start + region * self.region_pages) * self.page_size
    }

    fn region_page_range(&self, region: usize) -> core::ops::Range<usize> {
        let first = self.page_start + region * self.region_pages;
        first..first + self.region_pages
    }

    fn region_end(&self) -> usize {
        self.region_base + self.region_pages * self.page_size
    }

    fn flash_align(&self, size: usize) -> usize {
        (size + self.align - 1) & !(self.align - 1)
    }

    fn ram_high(&self) -> usize {
        *self.ram_offsets.last().unwrap_or(&0) as usize
    }

    /// The one capacity rule shared by `has_space` and all mutations: the
    /// accumulated payloads plus one header per element must fit within two
    /// thirds of a region, leaving headroom for the log tail, and the
    /// companions must fit the arena.
    fn check_capacity(
        &self, flash_change: isize, ram_change: isize, append: bool,
    ) -> StoreResult<()> {
        let count = self.slots.len() + usize::from(append);
        Error::SlotsFull.check(count <= MAX_ELEMENT_COUNT)?;
        let flash_total = self.flash_total as isize + flash_change;
        let budget = (self.region_pages * (self.page_size * 2 / 3)) as isize;
        Error::FlashFull.check(flash_total + (count * HEADER_SIZE) as isize <= budget)?;
        let ram_total = self.ram_high() as isize + ram_change;
        Error::RamFull.check(ram_total <= RAM_SIZE as isize)?;
        Ok(())
    }

    /// Programs data, padding the tail with erased bytes up to the word
    /// granularity.
    fn program(&mut self, offset: usize, data: &[u8]) -> StoreResult<()> {
        debug_assert_eq!(offset % self.word, 0);
        if data.len() % self.word == 0 {
            return self.flash.write(offset, data);
        }
        let mut padded = vec![0xff; data.len().div_ceil(self.word) * self.word];
        padded[..data.len()].copy_from_slice(data);
        self.flash.write(offset, &padded)
    }

    /// Inserts an empty slot at local `index` of array `a` and shifts the
    /// element tables of the following arrays up.
    fn insert_slot(&mut self, a: usize, index: usize) {
        let g = self.arrays[a].start + index;
        self.slots.insert(g, Slot::default());
        let offset = self.ram_offsets[g];
        self.ram_offsets.insert(g, offset);
        self.arrays[a].count += 1;
        for data in &mut self.arrays[a + 1..] {
            data.start += 1;
        }
    }

    /// Removes the slot at local `index` of array `a` and shifts the element
    /// tables of the following arrays down.
    fn remove_slot(&mut self, a: usize, index: usize) {
        let g = self.arrays[a].start + index;
        self.slots.remove(g);
        let aligned = self.ram_offsets[g + 1] - self.ram_offsets[g];
        self.ram_offsets.remove(g);
        for offset in &mut self.ram_offsets[g..] {
            *offset -= aligned;
        }
        self.arrays[a].count -= 1;
        for data in &mut self.arrays[a + 1..] {
            data.start -= 1;
        }
    }

    /// Shifts the arena contents and offsets from slot `from` onwards by
    /// `change` bytes.
    fn ram_insert(&mut self, from: usize, change: isize) {
        if change == 0 {
            return;
        }
        let begin = self.ram_offsets[from] as usize;
        let high = self.ram_high();
        let target = (begin as isize + change) as usize;
        self.ram.copy_within(begin..high, target);
        for offset in &mut self.ram_offsets[from..] {
            *offset = (*offset as isize + change) as u32;
        }
    }

    /// Replays the log of the active region and rebuilds the element tables.
    fn replay(&mut self) -> StoreResult<()> {
        let size = self.region_pages * self.page_size;
        let data = self.flash.read(self.region_base, size)?.into_owned();
        let header_size = self.flash_align(HEADER_SIZE);
        let mut it = 0;
        while it + HEADER_SIZE <= size {
            let entry = it;
            let [array, index, value, op] = data[it..it + HEADER_SIZE].try_into().unwrap();
            if op == OP_INVALID {
                break;
            }
            let (a, index, value) = (usize::from(array), usize::from(index), usize::from(value));
            if a >= self.arrays.len() {
                log::warn!("log: unknown array {}, discarding tail", array);
                break;
            }
            it += header_size;
            match op {
                OP_OVERWRITE => {
                    if index > self.arrays[a].count
                        || self.slots.len() + (index + value).saturating_sub(self.arrays[a].count)
                            > MAX_ELEMENT_COUNT
                    {
                        log::warn!("log: bad overwrite, discarding tail");
                        it = entry;
                        break;
                    }
                    // walk the payload run before touching the tables so a
                    // truncated entry is dropped as a whole
                    let mut parsed = Vec::with_capacity(value);
                    for _ in 0..value {
                        if it >= size {
                            break;
                        }
                        let flash_size = (self.arrays[a].flash_size)(&data[it..]);
                        if it + flash_size > size {
                            break;
                        }
                        let ram_size = (self.arrays[a].ram_size)(&data[it..it + flash_size]);
                        parsed.push(Slot {
                            offset: it as u32,
                            flash_size: flash_size as u32,
                            ram_size: ram_size as u32,
                        });
                        it += self.flash_align(flash_size);
                    }
                    if parsed.len() != value {
                        log::warn!("log: truncated payload, discarding tail");
                        it = entry;
                        break;
                    }
                    while self.arrays[a].count < index + value {
                        let at = self.arrays[a].count;
                        let g = self.arrays[a].start + at;
                        self.slots.insert(g, Slot::default());
                        self.arrays[a].count += 1;
                        for following in &mut self.arrays[a + 1..] {
                            following.start += 1;
                        }
                    }
                    for (k, slot) in parsed.into_iter().enumerate() {
                        self.slots[self.arrays[a].start + index + k] = slot;
                    }
                }
                OP_ERASE => {
                    if index + value > self.arrays[a].count {
                        log::warn!("log: bad erase, discarding tail");
                        it = entry;
                        break;
                    }
                    for _ in 0..value {
                        let g = self.arrays[a].start + index;
                        self.slots.remove(g);
                        self.arrays[a].count -= 1;
                        for following in &mut self.arrays[a + 1..] {
                            following.start -= 1;
                        }
                    }
                }
                OP_MOVE => {
                    let new_index = value;
                    if index >= self.arrays[a].count || new_index >= self.arrays[a].count {
                        log::warn!("log: bad move, discarding tail");
                        it = entry;
                        break;
                    }
                    let start = self.arrays[a].start;
                    let slot = self.slots.remove(start + index);
                    self.slots.insert(start + new_index, slot);
                }
                _ => {
                    log::warn!("log: unknown op {}, discarding tail", op);
                    it = entry;
                    break;
                }
            }
        }
        self.cursor = self.region_base + it;
        Ok(())
    }

    /// Copies all live elements into the other region and swaps the region
    /// roles. The first header is written last: programming its op byte is
    /// what makes the new region active.
    fn switch_regions(&mut self, pending: Option<(usize, &[u8])>) -> StoreResult<()> {
        let old_base = self.region_base;
        let size = self.region_pages * self.page_size;
        let old_data = self.flash.read(old_base, size)?.into_owned();
        let old_region = usize::from(old_base != self.region_offset(0));
        let new_region = 1 - old_region;
        self.region_base = self.region_offset(new_region);

        let header_size = self.flash_align(HEADER_SIZE);
        let mut cursor = self.region_base;
        let mut flash_total = 0;
        for a in 0..self.arrays.len() {
            if a != 0 {
                let count = self.arrays[a].count as u8;
                self.program(cursor, &[a as u8, 0, count, OP_OVERWRITE])?;
            }
            cursor += header_size;
            for g in self.arrays[a].start..self.arrays[a].start + self.arrays[a].count {
                let flash_size = self.slots[g].flash_size as usize;
                let payload = match pending {
                    Some((slot, payload)) if slot == g => payload,
                    _ => {
                        let offset = self.slots[g].offset as usize;
                        &old_data[offset..offset + flash_size]
                    }
                };
                debug_assert_eq!(payload.len(), flash_size);
                self.program(cursor, payload)?;
                self.slots[g].offset = (cursor - self.region_base) as u32;
                cursor += self.flash_align(flash_size);
                flash_total += flash_size;
            }
        }

        // commit the new region
        let count = self.arrays.first().map_or(0, |data| data.count as u8);
        let base = self.region_base;
        self.program(base, &[0, 0, count, OP_OVERWRITE])?;

        for page in self.region_page_range(old_region) {
            self.flash.erase_page(page)?;
        }

        self.cursor = cursor;
        self.flash_total = flash_total;
        debug_assert!(self.cursor <= self.region_end());
        Ok(())
    }
}

/// Iterator over the `(flash, ram)` element pairs of one array.
pub struct Elements<'a, F: Flash> {
    store: &'a Store<F>,
    array: ArrayIndex,
    index: usize,
}

impl<'a, F: Flash> Iterator for Elements<'a, F> {
    type Item = StoreResult<(Cow<'a, [u8]>, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.store.count(self.array) {
            return None;
        }
        let index = self.index;
        self.index += 1;
        let ram = self.store.ram(self.array, index);
        Some(self.store.read(self.array, index).map(|flash| (flash, ram)))
    }
}
