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

use hearth_error::Error;

use crate::StoreResult;

/// Geometry of a flash device.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlashInfo {
    /// Number of erasable pages.
    pub page_count: usize,

    /// Size of an erasable page in bytes.
    pub page_size: usize,

    /// Programming granularity in bytes. Write offsets and lengths are
    /// multiples of this. Always a power of two.
    pub word_size: usize,
}

impl FlashInfo {
    /// Returns the device size in bytes.
    pub fn size(&self) -> usize {
        self.page_count * self.page_size
    }
}

/// Raw NOR flash.
///
/// Erased bytes read back as `0xff` and programming can only clear bits.
/// Reads are byte-granular; writes obey the word granularity.
pub trait Flash {
    /// Returns the device geometry.
    fn info(&self) -> FlashInfo;

    /// Reads `length` bytes starting at `offset`.
    ///
    /// Memory-mapped devices return a borrow, bus-attached devices a copy.
    fn read(&self, offset: usize, length: usize) -> StoreResult<Cow<'_, [u8]>>;

    /// Programs `data` at `offset`. Both must be word-aligned.
    fn write(&mut self, offset: usize, data: &[u8]) -> StoreResult<()>;

    /// Erases a page back to all `0xff`.
    fn erase_page(&mut self, page: usize) -> StoreResult<()>;

    /// Returns whether a page is fully erased.
    fn is_erased(&self, page: usize) -> StoreResult<bool> {
        let info = self.info();
        let data = self.read(page * info.page_size, info.page_size)?;
        Ok(data.iter().all(|&x| x == 0xff))
    }
}

impl<F: Flash> Flash for &mut F {
    fn info(&self) -> FlashInfo {
        (**self).info()
    }

    fn read(&self, offset: usize, length: usize) -> StoreResult<Cow<'_, [u8]>> {
        (**self).read(offset, length)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> StoreResult<()> {
        (**self).write(offset, data)
    }

    fn erase_page(&mut self, page: usize) -> StoreResult<()> {
        (**self).erase_page(page)
    }
}

/// RAM-backed flash with NOR programming semantics, for tests and the
/// emulator.
#[cfg(any(test, feature = "std"))]
pub struct MemFlash {
    data: Vec<u8>,
    info: FlashInfo,
}

#[cfg(any(test, feature = "std"))]
impl MemFlash {
    /// Creates an erased device.
    pub fn new(page_count: usize, page_size: usize, word_size: usize) -> Self {
        assert!(word_size.is_power_of_two() && word_size <= page_size);
        let info = FlashInfo { page_count, page_size, word_size };
        MemFlash { data: vec![0xff; info.size()], info }
    }

    /// Creates a device from an existing image, e.g. a boot-time snapshot.
    pub fn from_image(data: Vec<u8>, page_size: usize, word_size: usize) -> Self {
        assert_eq!(data.len() % page_size, 0);
        let info = FlashInfo { page_count: data.len() / page_size, page_size, word_size };
        MemFlash { data, info }
    }

    /// Returns the raw image.
    pub fn image(&self) -> &[u8] {
        &self.data
    }

    /// Replaces the tail starting at `offset` with erased bytes, simulating
    /// power loss before those writes hit the device.
    pub fn cut(&mut self, offset: usize) {
        for byte in &mut self.data[offset..] {
            *byte = 0xff;
        }
    }
}

#[cfg(any(test, feature = "std"))]
impl Flash for MemFlash {
    fn info(&self) -> FlashInfo {
        self.info
    }

    fn read(&self, offset: usize, length: usize) -> StoreResult<Cow<'_, [u8]>> {
        Error::OutOfBounds.check(offset + length <= self.data.len())?;
        Ok(Cow::Borrowed(&self.data[offset..offset + length]))
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> StoreResult<()> {
        Error::BadAlign.check(offset % self.info.word_size == 0)?;
        Error::BadAlign.check(data.len() % self.info.word_size == 0)?;
        Error::OutOfBounds.check(offset + data.len() <= self.data.len())?;
        for (old, &new) in self.data[offset..].iter_mut().zip(data) {
            // programming can only clear bits
            assert_eq!(new & !*old, 0, "programming a 0 bit back to 1");
            *old &= new;
        }
        Ok(())
    }

    fn erase_page(&mut self, page: usize) -> StoreResult<()> {
        Error::OutOfBounds.check(page < self.info.page_count)?;
        let start = page * self.info.page_size;
        for byte in &mut self.data[start..start + self.info.page_size] {
            *byte = 0xff;
        }
        Ok(())
    }
}

/// Flash image persisted to a host file, the storage backend of the
/// emulator.
#[cfg(any(test, feature = "std"))]
pub struct FileFlash {
    mem: MemFlash,
    path: std::path::PathBuf,
}

#[cfg(any(test, feature = "std"))]
impl FileFlash {
    /// Opens or creates the image at `path`.
    pub fn open(
        path: impl Into<std::path::PathBuf>, page_count: usize, page_size: usize,
        word_size: usize,
    ) -> StoreResult<Self> {
        let path = path.into();
        let mem = match std::fs::read(&path) {
            Ok(data) if data.len() == page_count * page_size => {
                MemFlash::from_image(data, page_size, word_size)
            }
            _ => MemFlash::new(page_count, page_size, word_size),
        };
        let flash = FileFlash { mem, path };
        flash.sync()?;
        Ok(flash)
    }

    fn sync(&self) -> StoreResult<()> {
        std::fs::write(&self.path, self.mem.image()).map_err(|_| Error::Device)
    }
}

#[cfg(any(test, feature = "std"))]
impl Flash for FileFlash {
    fn info(&self) -> FlashInfo {
        self.mem.info()
    }

    fn read(&self, offset: usize, length: usize) -> StoreResult<Cow<'_, [u8]>> {
        self.mem.read(offset, length)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> StoreResult<()> {
        self.mem.write(offset, data)?;
        self.sync()
    }

    fn erase_page(&mut self, page: usize) -> StoreResult<()> {
        self.mem.erase_page(page)?;
        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_clears_bits() {
        let mut flash = MemFlash::new(2, 64, 4);
        flash.write(0, &[0xf0, 0x0f, 0xff, 0x00]).unwrap();
        assert_eq!(flash.read(0, 4).unwrap().as_ref(), [0xf0, 0x0f, 0xff, 0x00]);
        flash.write(0, &[0x30, 0x0f, 0xff, 0x00]).unwrap();
        assert_eq!(flash.read(0, 4).unwrap().as_ref(), [0x30, 0x0f, 0xff, 0x00]);
        flash.erase_page(0).unwrap();
        assert!(flash.is_erased(0).unwrap());
        assert!(flash.is_erased(1).unwrap());
    }

    #[test]
    #[should_panic]
    fn program_cannot_set_bits() {
        let mut flash = MemFlash::new(2, 64, 4);
        flash.write(0, &[0x00, 0x00, 0x00, 0x00]).unwrap();
        let _ = flash.write(0, &[0x01, 0x00, 0x00, 0x00]);
    }
}
