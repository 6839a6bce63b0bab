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

//! Storage, state, and codec errors.

#![no_std]

use num_enum::{IntoPrimitive, TryFromPrimitive, TryFromPrimitiveError};

/// Errors of the node substrate.
///
/// Errors are a single byte so that results fit in a register and can be
/// forwarded over the bus protocol unchanged. Operations that fail with
/// `FlashFull`, `RamFull`, or `SlotsFull` guarantee that no observable state
/// changed.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
#[repr(u8)]
pub enum Error {
    /// The active flash region cannot hold the payload within its headroom.
    FlashFull = 0,

    /// The RAM arena cannot hold the companion element.
    RamFull = 1,

    /// All element slots are in use.
    SlotsFull = 2,

    /// The on-flash log ended in a malformed header.
    CorruptLog = 3,

    /// An offset or length lies outside the device.
    OutOfBounds = 4,

    /// An address or length violates the programming granularity.
    BadAlign = 5,

    /// The device rejected or failed the operation.
    Device = 6,

    /// A message failed authentication.
    BadMic = 7,
}

impl Error {
    /// Ensures a condition is true, otherwise returns the error.
    pub fn check(self, cond: bool) -> Result<(), Self> {
        match cond {
            true => Ok(()),
            false => Err(self),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl core::error::Error for Error {}

/// Decodes a raw error byte, e.g. from a bus status field.
pub fn decode(code: u8) -> Result<Error, u8> {
    Error::try_from_primitive(code).map_err(|TryFromPrimitiveError { number }| number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_ok() {
        assert_eq!(decode(0), Ok(Error::FlashFull));
        assert_eq!(decode(6), Ok(Error::Device));
        assert_eq!(decode(0xa5), Err(0xa5));
    }

    #[test]
    fn check_ok() {
        assert_eq!(Error::RamFull.check(true), Ok(()));
        assert_eq!(Error::RamFull.check(false), Err(Error::RamFull));
    }
}
