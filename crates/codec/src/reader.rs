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

use aead::AeadInPlace;
use hearth_error::Error;

use crate::crypt::{Aes128Ccm, MIC_LENGTH, Nonce};

/// Bounded reader over a received frame.
///
/// Reads past the end return zero and poison the reader; check
/// [`MessageReader::is_valid`] once after parsing instead of checking every
/// field.
pub struct MessageReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> MessageReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        MessageReader { data, position: 0 }
    }

    /// Reads one byte.
    pub fn u8(&mut self) -> u8 {
        self.take(1).map_or(0, |bytes| bytes[0])
    }

    /// Returns the next byte without consuming it.
    pub fn peek_u8(&self) -> u8 {
        match self.is_valid() {
            true => *self.data[self.position..].first().unwrap_or(&0),
            false => 0,
        }
    }

    /// Consumes the next byte if it equals `expected`.
    pub fn test_u8(&mut self, expected: u8) -> bool {
        let matches = self.is_valid() && self.data[self.position..].first() == Some(&expected);
        if matches {
            self.position += 1;
        }
        matches
    }

    /// Reads a little-endian 16-bit value.
    pub fn u16l(&mut self) -> u16 {
        self.take(2).map_or(0, |bytes| u16::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Reads a big-endian 16-bit value.
    pub fn u16b(&mut self) -> u16 {
        self.take(2).map_or(0, |bytes| u16::from_be_bytes(bytes.try_into().unwrap()))
    }

    /// Reads a little-endian 32-bit value.
    pub fn u32l(&mut self) -> u32 {
        self.take(4).map_or(0, |bytes| u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Reads a big-endian 32-bit value.
    pub fn u32b(&mut self) -> u32 {
        self.take(4).map_or(0, |bytes| u32::from_be_bytes(bytes.try_into().unwrap()))
    }

    /// Reads a little-endian 64-bit value.
    pub fn u64l(&mut self) -> u64 {
        self.take(8).map_or(0, |bytes| u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Reads a big-endian 64-bit value.
    pub fn u64b(&mut self) -> u64 {
        self.take(8).map_or(0, |bytes| u64::from_be_bytes(bytes.try_into().unwrap()))
    }

    /// Reads `count` bytes.
    pub fn bytes(&mut self, count: usize) -> &'a [u8] {
        self.take(count).unwrap_or(&[])
    }

    /// Reads everything up to the end.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.position.min(self.data.len())..];
        self.position = self.data.len();
        rest
    }

    /// Skips `count` bytes.
    pub fn skip(&mut self, count: usize) {
        let _ = self.take(count);
    }

    /// Returns the remaining number of bytes.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Returns whether no read ran past the end.
    pub fn is_valid(&self) -> bool {
        self.position <= self.data.len()
    }

    fn take(&mut self, count: usize) -> Option<&'a [u8]> {
        if self.position + count > self.data.len() {
            // poison: stays invalid for is_valid
            self.position = self.data.len() + 1;
            return None;
        }
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Some(bytes)
    }
}

/// Reader for frames whose tail is encrypted in place.
///
/// Parse the clear part, mark where the authenticated header and the
/// encrypted payload start, [`DecryptReader::decrypt`], then keep parsing
/// the now-clear payload.
pub struct DecryptReader<'a> {
    data: &'a mut [u8],
    position: usize,
    end: usize,
    header: usize,
    message: usize,
}

impl<'a> DecryptReader<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        let end = data.len();
        DecryptReader { data, position: 0, end, header: 0, message: 0 }
    }

    /// Marks the current position as the start of the authenticated header.
    pub fn set_header(&mut self) {
        self.header = self.position;
    }

    /// Marks the current position as the start of the encrypted payload.
    pub fn set_message(&mut self) {
        self.message = self.position;
    }

    /// Marks the payload start at `offset` bytes before the end.
    pub fn set_message_from_end(&mut self, offset: usize) {
        self.message = self.end - offset;
    }

    /// Decrypts the payload in place and cuts off the message integrity
    /// code. Call after the header has been read and the marks are set.
    pub fn decrypt(&mut self, nonce: &Nonce, cipher: &Aes128Ccm) -> Result<(), Error> {
        debug_assert!(self.header <= self.message && self.message <= self.end);
        Error::OutOfBounds.check(self.end - self.message >= MIC_LENGTH)?;
        let mic_start = self.end - MIC_LENGTH;

        // split so the header and payload views never alias
        let (head, tail) = self.data.split_at_mut(self.message);
        let aad = &head[self.header..];
        let (payload, mic) = tail.split_at_mut(mic_start - self.message);
        let tag = aead::Tag::<Aes128Ccm>::from_slice(&mic[..MIC_LENGTH]);
        cipher
            .decrypt_in_place_detached(&nonce.0.into(), aad, payload, tag)
            .map_err(|_| Error::BadMic)?;
        self.end = mic_start;
        Ok(())
    }

    /// Reads one byte.
    pub fn u8(&mut self) -> u8 {
        self.take(1).map_or(0, |at| self.data[at])
    }

    /// Reads a little-endian 16-bit value.
    pub fn u16l(&mut self) -> u16 {
        self.take(2).map_or(0, |at| u16::from_le_bytes(self.data[at..at + 2].try_into().unwrap()))
    }

    /// Reads a big-endian 16-bit value.
    pub fn u16b(&mut self) -> u16 {
        self.take(2).map_or(0, |at| u16::from_be_bytes(self.data[at..at + 2].try_into().unwrap()))
    }

    /// Reads a little-endian 32-bit value.
    pub fn u32l(&mut self) -> u32 {
        self.take(4).map_or(0, |at| u32::from_le_bytes(self.data[at..at + 4].try_into().unwrap()))
    }

    /// Reads a little-endian 64-bit value.
    pub fn u64l(&mut self) -> u64 {
        self.take(8).map_or(0, |at| u64::from_le_bytes(self.data[at..at + 8].try_into().unwrap()))
    }

    /// Reads `count` bytes.
    pub fn bytes(&mut self, count: usize) -> &[u8] {
        match self.take(count) {
            Some(at) => &self.data[at..at + count],
            None => &[],
        }
    }

    /// Skips `count` bytes.
    pub fn skip(&mut self, count: usize) {
        let _ = self.take(count);
    }

    /// Returns the number of bytes before the end (excluding any already
    /// removed message integrity code).
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.position)
    }

    /// Returns whether no read ran past the end.
    pub fn is_valid(&self) -> bool {
        self.position <= self.end
    }

    fn take(&mut self, count: usize) -> Option<usize> {
        if self.position + count > self.end {
            self.position = self.end + 1;
            return None;
        }
        let at = self.position;
        self.position += count;
        Some(at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_both_endiannesses() {
        let mut reader = MessageReader::new(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
        assert_eq!(reader.u8(), 0x01);
        assert_eq!(reader.u16l(), 0x0302);
        assert_eq!(reader.u16b(), 0x0405);
        assert_eq!(reader.remaining(), 2);
        assert_eq!(reader.bytes(2), [0x06, 0x07]);
        assert!(reader.is_valid());
    }

    #[test]
    fn overrun_poisons_the_reader() {
        let mut reader = MessageReader::new(&[0x01, 0x02]);
        assert_eq!(reader.u32l(), 0);
        assert!(!reader.is_valid());
        // further reads keep returning zero
        assert_eq!(reader.u8(), 0);
        assert_eq!(reader.peek_u8(), 0);
        assert!(!reader.test_u8(0x01));
        assert!(!reader.is_valid());
    }

    #[test]
    fn test_u8_consumes_only_on_match() {
        let mut reader = MessageReader::new(&[0x10, 0x20]);
        assert!(!reader.test_u8(0x20));
        assert!(reader.test_u8(0x10));
        assert_eq!(reader.u8(), 0x20);
        assert!(reader.is_valid());
    }
}
