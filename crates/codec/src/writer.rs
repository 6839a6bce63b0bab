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

/// Bounded writer over an outgoing frame buffer.
///
/// Writes that would overflow the buffer are dropped; this is a frame
/// sizing bug and asserts in debug builds.
pub struct MessageWriter<'a> {
    data: &'a mut [u8],
    position: usize,
}

impl<'a> MessageWriter<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        MessageWriter { data, position: 0 }
    }

    /// Writes one byte.
    pub fn u8(&mut self, value: u8) {
        self.put(&[value]);
    }

    /// Writes a little-endian 16-bit value.
    pub fn u16l(&mut self, value: u16) {
        self.put(&value.to_le_bytes());
    }

    /// Writes a big-endian 16-bit value.
    pub fn u16b(&mut self, value: u16) {
        self.put(&value.to_be_bytes());
    }

    /// Writes a little-endian 32-bit value.
    pub fn u32l(&mut self, value: u32) {
        self.put(&value.to_le_bytes());
    }

    /// Writes a big-endian 32-bit value.
    pub fn u32b(&mut self, value: u32) {
        self.put(&value.to_be_bytes());
    }

    /// Writes a little-endian 64-bit value.
    pub fn u64l(&mut self, value: u64) {
        self.put(&value.to_le_bytes());
    }

    /// Writes a big-endian 64-bit value.
    pub fn u64b(&mut self, value: u64) {
        self.put(&value.to_be_bytes());
    }

    /// Writes raw bytes.
    pub fn bytes(&mut self, data: &[u8]) {
        self.put(data);
    }

    /// Skips `count` bytes without modifying them.
    pub fn skip(&mut self, count: usize) {
        debug_assert!(self.position + count <= self.data.len());
        self.position = (self.position + count).min(self.data.len());
    }

    /// Returns the number of bytes written so far.
    pub fn position(&self) -> usize {
        self.position
    }

    fn put(&mut self, bytes: &[u8]) {
        let end = self.position + bytes.len();
        debug_assert!(end <= self.data.len(), "frame buffer overflow");
        if end > self.data.len() {
            return;
        }
        self.data[self.position..end].copy_from_slice(bytes);
        self.position = end;
    }
}

/// Writer for frames whose tail is encrypted in place.
///
/// Write the clear part, mark the authenticated header and payload starts,
/// write the payload, then [`EncryptWriter::encrypt`] to scramble the
/// payload and append the message integrity code.
pub struct EncryptWriter<'a> {
    writer: MessageWriter<'a>,
    header: usize,
    message: usize,
}

impl<'a> EncryptWriter<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        EncryptWriter { writer: MessageWriter::new(data), header: 0, message: 0 }
    }

    /// Marks the current position as the start of the authenticated header.
    pub fn set_header(&mut self) {
        self.header = self.writer.position;
    }

    /// Marks the current position as the start of the encrypted payload.
    pub fn set_message(&mut self) {
        self.message = self.writer.position;
    }

    /// Encrypts the payload in place and appends the message integrity
    /// code. Call after the payload has been written.
    pub fn encrypt(&mut self, nonce: &Nonce, cipher: &Aes128Ccm) -> Result<(), Error> {
        debug_assert!(self.header <= self.message && self.message <= self.writer.position);
        let end = self.writer.position;
        Error::OutOfBounds.check(end + MIC_LENGTH <= self.writer.data.len())?;

        // split so the header and payload views never alias
        let (head, tail) = self.writer.data.split_at_mut(self.message);
        let aad = &head[self.header..];
        let (payload, rest) = tail.split_at_mut(end - self.message);
        let tag = cipher
            .encrypt_in_place_detached(&nonce.0.into(), aad, payload)
            .map_err(|_| Error::Device)?;
        rest[..MIC_LENGTH].copy_from_slice(&tag);
        self.writer.position = end + MIC_LENGTH;
        Ok(())
    }

    /// Returns the finished frame length.
    pub fn position(&self) -> usize {
        self.writer.position
    }
}

impl<'a> core::ops::Deref for EncryptWriter<'a> {
    type Target = MessageWriter<'a>;

    fn deref(&self) -> &MessageWriter<'a> {
        &self.writer
    }
}

impl<'a> core::ops::DerefMut for EncryptWriter<'a> {
    fn deref_mut(&mut self) -> &mut MessageWriter<'a> {
        &mut self.writer
    }
}
